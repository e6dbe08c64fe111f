//! In-memory source entries exchanged with the caller.
//!
//! Entry kinds are resolved once at ingestion. Downstream code asks the kind
//! for capabilities (`is_materializable`, `rendered_text`) instead of
//! re-inspecting entries ad hoc.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

/// Stable identity of a source entry, preserved across replacements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Character encodings supported for rendering and reading back entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    /// ISO-8859-1: every byte maps to the code point of the same value.
    Latin1,
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

impl Charset {
    pub fn name(self) -> &'static str {
        match self {
            Charset::Utf8 => "UTF-8",
            Charset::Latin1 => "ISO-8859-1",
        }
    }

    /// Encode `text`. Characters outside Latin-1 are replaced with `?`.
    pub fn encode(self, text: &str, bom: bool) -> Vec<u8> {
        match self {
            Charset::Utf8 => {
                let mut bytes = Vec::with_capacity(text.len() + UTF8_BOM.len());
                if bom {
                    bytes.extend_from_slice(UTF8_BOM);
                }
                bytes.extend_from_slice(text.as_bytes());
                bytes
            }
            Charset::Latin1 => text
                .chars()
                .map(|ch| u8::try_from(u32::from(ch)).unwrap_or(b'?'))
                .collect(),
        }
    }

    /// Decode `bytes`, replacing malformed sequences and stripping a UTF-8 BOM.
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => {
                let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
                String::from_utf8_lossy(body).into_owned()
            }
            Charset::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}

/// Opaque caller metadata carried through replacements untouched.
pub type Markers = BTreeMap<String, String>;

/// The closed set of entry kinds a caller may hand over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// Plain text content.
    PlainText { text: String },
    /// A parsed document, already printed to text by the caller's printer.
    Document { language: String, text: String },
    /// Binary placeholder; the content is not held in memory.
    Binary,
    /// A file the caller failed to parse.
    ParseError { message: String, text: String },
    /// Reserved internal compilation unit, never handed to external tools.
    CompilationUnit { text: String },
}

impl EntryKind {
    /// Whether the entry is written into the first stage's working directory.
    pub fn is_materializable(&self) -> bool {
        matches!(self, EntryKind::PlainText { .. } | EntryKind::Document { .. })
    }

    /// Printed text for materializable kinds.
    pub fn rendered_text(&self) -> Option<&str> {
        match self {
            EntryKind::PlainText { text } | EntryKind::Document { text, .. } => Some(text),
            EntryKind::Binary | EntryKind::ParseError { .. } | EntryKind::CompilationUnit { .. } => {
                None
            }
        }
    }
}

/// One file of the caller's source collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub id: EntryId,
    /// Path relative to the project root.
    pub path: PathBuf,
    pub charset: Option<Charset>,
    pub charset_bom_marked: bool,
    pub markers: Markers,
    pub kind: EntryKind,
}

impl SourceEntry {
    pub fn plain_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        Self::with_kind(path, EntryKind::PlainText { text: text.into() })
    }

    pub fn with_kind(path: impl Into<PathBuf>, kind: EntryKind) -> Self {
        Self {
            id: EntryId::new(),
            path: path.into(),
            charset: None,
            charset_bom_marked: false,
            markers: Markers::new(),
            kind,
        }
    }

    /// Lowercase extension of the file name, if it has one.
    ///
    /// Dotfiles such as `.npmrc` have no extension.
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.path)
    }

    /// The declared charset, or UTF-8.
    pub fn effective_charset(&self) -> Charset {
        self.charset.unwrap_or(Charset::Utf8)
    }

    /// Render to bytes with the declared charset; `None` for non-materializable kinds.
    pub fn render(&self) -> Option<Vec<u8>> {
        let text = self.kind.rendered_text()?;
        Some(
            self.effective_charset()
                .encode(text, self.charset_bom_marked),
        )
    }

    /// Text content regardless of kind, when any is held.
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            EntryKind::PlainText { text }
            | EntryKind::Document { text, .. }
            | EntryKind::ParseError { text, .. }
            | EntryKind::CompilationUnit { text } => Some(text),
            EntryKind::Binary => None,
        }
    }
}

/// Whether `path` is relative and never climbs above the directory it is joined to.
pub fn is_contained(path: &Path) -> bool {
    !path.as_os_str().is_empty()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}

pub(crate) fn file_extension(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }
    Some(name[dot + 1..].to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_is_lowercased_and_ignores_dotfiles() {
        assert_eq!(
            SourceEntry::plain_text("src/App.TSX", "").extension().as_deref(),
            Some("tsx")
        );
        assert_eq!(SourceEntry::plain_text(".npmrc", "").extension(), None);
        assert_eq!(SourceEntry::plain_text("Makefile", "").extension(), None);
        assert_eq!(
            SourceEntry::plain_text("a/b.spec.ts", "").extension().as_deref(),
            Some("ts")
        );
    }

    #[test]
    fn contained_paths_stay_relative() {
        assert!(is_contained(Path::new("src/app.ts")));
        assert!(is_contained(Path::new("./angular.json")));
        assert!(!is_contained(Path::new("../outside.txt")));
        assert!(!is_contained(Path::new("src/../../outside.txt")));
        assert!(!is_contained(Path::new("/etc/passwd")));
        assert!(!is_contained(Path::new("")));
    }

    #[test]
    fn only_text_and_documents_are_materializable() {
        assert!(EntryKind::PlainText { text: String::new() }.is_materializable());
        assert!(
            EntryKind::Document {
                language: "ts".into(),
                text: String::new()
            }
            .is_materializable()
        );
        assert!(!EntryKind::Binary.is_materializable());
        assert!(
            !EntryKind::ParseError {
                message: "bad".into(),
                text: String::new()
            }
            .is_materializable()
        );
        assert!(!EntryKind::CompilationUnit { text: String::new() }.is_materializable());
    }

    #[test]
    fn utf8_bom_is_written_and_stripped() {
        let bytes = Charset::Utf8.encode("hi", true);
        assert_eq!(bytes, b"\xEF\xBB\xBFhi");
        assert_eq!(Charset::Utf8.decode(&bytes), "hi");
    }

    #[test]
    fn latin1_maps_bytes_to_code_points() {
        let bytes = Charset::Latin1.encode("caf\u{e9}\u{2603}", false);
        assert_eq!(bytes, vec![b'c', b'a', b'f', 0xE9, b'?']);
        assert_eq!(Charset::Latin1.decode(&[0xE9]), "\u{e9}");
    }
}
