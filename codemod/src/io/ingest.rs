//! Reading a project directory into source entries and writing results back.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

use crate::core::types::{Charset, EntryKind, SourceEntry, file_extension, is_contained};

const SKIP_DIRS: &[&str] = &[".git", "node_modules"];

/// Extensions ingested as printed documents rather than plain text.
const DOCUMENT_LANGUAGES: &[(&str, &str)] = &[
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("mts", "typescript"),
    ("cts", "typescript"),
    ("js", "javascript"),
    ("jsx", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("json", "json"),
    ("html", "html"),
    ("css", "css"),
    ("scss", "scss"),
    ("less", "less"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
];

fn document_language(path: &Path) -> Option<&'static str> {
    let ext = file_extension(path)?;
    DOCUMENT_LANGUAGES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, language)| *language)
}

/// Classify raw file bytes into an entry at `relative`.
pub fn entry_from_bytes(relative: PathBuf, bytes: &[u8]) -> SourceEntry {
    let bom = bytes.starts_with(b"\xEF\xBB\xBF");
    let text = match std::str::from_utf8(bytes) {
        Ok(text) if !bytes.contains(&0) => text,
        _ => return SourceEntry::with_kind(relative, EntryKind::Binary),
    };
    let text = Charset::Utf8.decode(text.as_bytes());
    let kind = match document_language(&relative) {
        Some(language) => EntryKind::Document {
            language: language.to_string(),
            text,
        },
        None => EntryKind::PlainText { text },
    };
    let mut entry = SourceEntry::with_kind(relative, kind);
    entry.charset = Some(Charset::Utf8);
    entry.charset_bom_marked = bom;
    entry
}

/// Walk `root` and produce one entry per regular file, in path order.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn ingest_project(root: &Path) -> Result<Vec<Arc<SourceEntry>>> {
    let mut entries = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            !(entry.file_type().is_dir()
                && entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| SKIP_DIRS.contains(&name)))
        });
    for item in walker {
        let item = item.with_context(|| format!("walk {}", root.display()))?;
        if !item.file_type().is_file() {
            continue;
        }
        let relative = item
            .path()
            .strip_prefix(root)
            .with_context(|| format!("relativize {}", item.path().display()))?
            .to_path_buf();
        let bytes =
            fs::read(item.path()).with_context(|| format!("read {}", item.path().display()))?;
        entries.push(Arc::new(entry_from_bytes(relative, &bytes)));
    }
    info!(entries = entries.len(), "project ingested");
    Ok(entries)
}

/// Write every replaced entry back under `root`.
///
/// Entries are matched by position; an entry that is the same `Arc` as its
/// input is left alone. Returns the relative paths written.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn write_back(
    root: &Path,
    original: &[Arc<SourceEntry>],
    updated: &[Arc<SourceEntry>],
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for (before, after) in original.iter().zip(updated) {
        if Arc::ptr_eq(before, after) {
            continue;
        }
        let Some(bytes) = after.render() else {
            continue;
        };
        if !is_contained(&after.path) {
            bail!("refusing to write {} outside {}", after.path.display(), root.display());
        }
        let path = root.join(&after.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        debug!(path = %after.path.display(), "entry written back");
        written.push(after.path.clone());
    }
    Ok(written)
}
