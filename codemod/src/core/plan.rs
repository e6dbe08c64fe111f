//! Command templates and their expansion into concrete argument vectors.
//!
//! Templates are ordered tokens that may contain placeholder markers.
//! Expansion is plain textual substitution applied to every token; markers
//! without a binding are left verbatim.

use std::sync::LazyLock;

use regex::Regex;

pub const VERSION_MARKER: &str = "${version}";
pub const MODULES_MARKER: &str = "${nodeModules}";
pub const REPO_DIR_MARKER: &str = "${repoDir}";
pub const PARSER_MARKER: &str = "${parser}";

/// The repo-path marker always resolves to the stage root, which is the cwd.
pub const REPO_DIR: &str = ".";

/// Version used when none is requested.
pub const LATEST: &str = "latest";

/// Ordered command tokens, possibly containing markers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandTemplate {
    tokens: Vec<String>,
}

impl CommandTemplate {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Substitute `bindings` into every token.
    ///
    /// An empty template yields an empty argv, which callers treat as a no-op stage.
    pub fn plan(&self, bindings: &Bindings) -> Vec<String> {
        self.tokens
            .iter()
            .map(|token| bindings.substitute(token))
            .collect()
    }
}

/// Run-time values substituted into templates. `None` leaves the marker verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings {
    pub version: Option<String>,
    pub modules_dir: Option<String>,
    pub repo_dir: Option<String>,
    pub parser: Option<String>,
}

impl Bindings {
    /// Bindings covering only the version marker.
    pub fn version_only(version: &ToolVersion) -> Self {
        Self {
            version: Some(version.resolved().to_string()),
            ..Self::default()
        }
    }

    pub fn substitute(&self, token: &str) -> String {
        let mut out = token.to_string();
        let pairs = [
            (VERSION_MARKER, &self.version),
            (MODULES_MARKER, &self.modules_dir),
            (REPO_DIR_MARKER, &self.repo_dir),
            (PARSER_MARKER, &self.parser),
        ];
        for (marker, value) in pairs {
            if let Some(value) = value
                && out.contains(marker)
            {
                out = out.replace(marker, value);
            }
        }
        out
    }
}

/// A requested tool version. `None` means "latest".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolVersion(Option<String>);

impl ToolVersion {
    pub fn new(version: Option<String>) -> Self {
        Self(version.filter(|v| !v.trim().is_empty()))
    }

    pub fn latest() -> Self {
        Self(None)
    }

    pub fn requested(&self) -> Option<&str> {
        self.0.as_deref()
    }

    /// Value substituted for the version marker.
    pub fn resolved(&self) -> &str {
        self.0.as_deref().unwrap_or(LATEST)
    }

    /// Major component of a dotted numeric version (`16`, `16.2`, `16.2.1`).
    pub fn major(&self) -> Option<u32> {
        static NUMERIC_RE: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r"^(\d+)(?:\.\d+){0,2}$").unwrap());
        let caps = NUMERIC_RE.captures(self.0.as_deref()?.trim())?;
        caps.get(1)?.as_str().parse().ok()
    }

    /// Below-threshold, non-numeric and absent versions run under the legacy shim.
    pub fn below(&self, threshold: u32) -> bool {
        self.major().is_none_or(|major| major < threshold)
    }
}

impl From<Option<&str>> for ToolVersion {
    fn from(value: Option<&str>) -> Self {
        Self::new(value.map(str::to_string))
    }
}

/// Prepend `shim` to `argv` when requested.
pub fn with_shim(mut argv: Vec<String>, shim: Option<&str>) -> Vec<String> {
    if let Some(shim) = shim {
        argv.insert(0, shim.to_string());
    }
    argv
}
