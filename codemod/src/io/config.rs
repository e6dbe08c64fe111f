//! Pipeline configuration stored in `codemod.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::plan::{CommandTemplate, ToolVersion};
use crate::core::recipe::{DEFAULT_LEGACY_THRESHOLD, Recipe};

pub const DEFAULT_CONFIG_FILE: &str = "codemod.toml";

/// Codemod pipeline configuration (TOML).
///
/// Missing fields default to values that work for a stock Angular project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CodemodConfig {
    /// Parent of every stage's working directory. Defaults to a directory under
    /// the system temp dir.
    pub scratch_root: Option<PathBuf>,

    /// File that must exist at the stage root before the primary command runs.
    pub marker_file: String,

    /// Wall-clock bound for each external command, in seconds.
    pub command_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes per stream.
    pub output_limit_bytes: usize,

    /// Also compare content digests when timestamps did not advance.
    pub content_hash_fallback: bool,

    pub node: NodeConfig,

    pub npm: NpmConfig,

    pub stages: Vec<StageDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NodeConfig {
    /// Heap bound passed through `NODE_OPTIONS`.
    pub heap_mb: u32,
    /// Token prepended to every command for below-threshold tool versions.
    pub legacy_shim: String,
    /// Major tool version from which the shim is no longer used.
    pub legacy_threshold: u32,
    /// Native-build helpers installed before the tool itself.
    pub native_build_packages: Vec<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            heap_mb: 2048,
            legacy_shim: "nvm-exec".to_string(),
            legacy_threshold: DEFAULT_LEGACY_THRESHOLD,
            native_build_packages: vec!["node-gyp@10".to_string(), "nan@2".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NpmConfig {
    /// Registry written into the stage-local `.npmrc` for the run.
    pub registry: Option<String>,
    /// Extra `.npmrc` lines, written verbatim.
    pub extra_lines: Vec<String>,
}

/// One `[[stages]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "recipe", rename_all = "kebab-case")]
pub enum StageDef {
    NgUpdate {
        version: Option<String>,
    },
    AngularCli {
        version: Option<String>,
    },
    Custom {
        version: Option<String>,
        command: Vec<String>,
        package: String,
    },
}

impl StageDef {
    pub fn to_recipe(&self) -> Recipe {
        match self {
            StageDef::NgUpdate { version } => Recipe::NgUpdate {
                version: ToolVersion::new(version.clone()),
            },
            StageDef::AngularCli { version } => Recipe::AngularCli {
                version: ToolVersion::new(version.clone()),
            },
            StageDef::Custom {
                version,
                command,
                package,
            } => Recipe::Custom {
                version: ToolVersion::new(version.clone()),
                command: CommandTemplate::new(command.iter().cloned()),
                package: package.clone(),
            },
        }
    }
}

impl Default for CodemodConfig {
    fn default() -> Self {
        Self {
            scratch_root: None,
            marker_file: "angular.json".to_string(),
            command_timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
            content_hash_fallback: false,
            node: NodeConfig::default(),
            npm: NpmConfig::default(),
            stages: Vec::new(),
        }
    }
}

impl CodemodConfig {
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_secs == 0 {
            return Err(anyhow!("command_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.marker_file.trim().is_empty() || self.marker_file.contains(['/', '\\']) {
            return Err(anyhow!("marker_file must be a plain file name"));
        }
        if self.node.heap_mb == 0 {
            return Err(anyhow!("node.heap_mb must be > 0"));
        }
        if self.node.legacy_shim.trim().is_empty() {
            return Err(anyhow!("node.legacy_shim must not be empty"));
        }
        for (index, stage) in self.stages.iter().enumerate() {
            if let StageDef::Custom { package, .. } = stage
                && package.trim().is_empty()
            {
                return Err(anyhow!("stages[{index}].package must not be empty"));
            }
        }
        Ok(())
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("codemod-scratch"))
    }

    pub fn recipes(&self) -> Vec<Recipe> {
        self.stages.iter().map(StageDef::to_recipe).collect()
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `CodemodConfig::default()`.
pub fn load_config(path: &Path) -> Result<CodemodConfig> {
    if !path.exists() {
        let cfg = CodemodConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CodemodConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &CodemodConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
