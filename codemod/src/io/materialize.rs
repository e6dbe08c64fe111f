//! Moving source entries between memory and a stage's working directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::core::types::{EntryKind, SourceEntry, is_contained};
use crate::error::{StageError, StageResult};
use crate::io::snapshot::{FileSnapshotStore, ModifiedSet};

/// Where `entry` lives inside `stage_dir`.
///
/// Absolute paths and paths climbing out through `..` are rejected.
pub fn resolved_path(stage_dir: &Path, entry: &SourceEntry) -> StageResult<PathBuf> {
    if !is_contained(&entry.path) {
        return Err(StageError::io(
            "resolve entry path",
            &entry.path,
            std::io::Error::new(ErrorKind::InvalidInput, "entry path escapes the stage directory"),
        ));
    }
    Ok(stage_dir.join(&entry.path))
}

/// Render `entry` into `stage_dir` and snapshot the written file.
///
/// Returns `None` without touching the disk for kinds that are not materializable.
pub fn write_source(
    entry: &SourceEntry,
    stage_dir: &Path,
    snapshots: &mut FileSnapshotStore,
) -> StageResult<Option<PathBuf>> {
    let Some(bytes) = entry.render() else {
        debug!(path = %entry.path.display(), "skipping non-materializable entry");
        return Ok(None);
    };
    let path = resolved_path(stage_dir, entry)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| StageError::io("create directory", parent, err))?;
    }
    fs::write(&path, bytes).map_err(|err| StageError::io("write source", &path, err))?;
    snapshots.record(&path)?;
    Ok(Some(path))
}

/// Replace `entry` with the post-run file content when its path was modified.
///
/// Unmodified entries, including ones whose path never resolved inside the
/// stage directory, are returned as the same `Arc`.
pub fn materialize(
    entry: &Arc<SourceEntry>,
    modified: &ModifiedSet,
    stage_dir: &Path,
) -> StageResult<Arc<SourceEntry>> {
    let Ok(path) = resolved_path(stage_dir, entry) else {
        return Ok(Arc::clone(entry));
    };
    if !modified.contains(&path) {
        return Ok(Arc::clone(entry));
    }
    let bytes = fs::read(&path).map_err(|source| StageError::ResultRead {
        path: path.clone(),
        source,
    })?;
    let text = entry.effective_charset().decode(&bytes);
    debug!(path = %entry.path.display(), bytes = bytes.len(), "materialized modified entry");
    Ok(Arc::new(SourceEntry {
        id: entry.id,
        path: entry.path.clone(),
        charset: entry.charset,
        charset_bom_marked: entry.charset_bom_marked,
        markers: entry.markers.clone(),
        kind: EntryKind::PlainText { text },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Charset;

    #[test]
    fn writes_rendered_bytes_and_snapshots() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut store = FileSnapshotStore::new(false);
        let entry = SourceEntry::plain_text("src/app/app.ts", "export const a = 1;\n");

        let path = write_source(&entry, temp.path(), &mut store)
            .expect("write")
            .expect("materialized");

        assert_eq!(path, temp.path().join("src/app/app.ts"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "export const a = 1;\n");
        assert!(store.contains(&path));
    }

    #[test]
    fn skips_binary_and_error_entries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut store = FileSnapshotStore::new(false);
        let binary = SourceEntry::with_kind("favicon.ico", EntryKind::Binary);
        let broken = SourceEntry::with_kind(
            "broken.ts",
            EntryKind::ParseError {
                message: "unexpected token".into(),
                text: "let =".into(),
            },
        );

        assert!(write_source(&binary, temp.path(), &mut store).expect("write").is_none());
        assert!(write_source(&broken, temp.path(), &mut store).expect("write").is_none());
        assert!(store.is_empty());
        assert!(!temp.path().join("broken.ts").exists());
    }

    #[test]
    fn rejects_entries_outside_the_stage_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        let stage = temp.path().join("stage");
        fs::create_dir_all(&stage).expect("mkdir");
        let mut store = FileSnapshotStore::new(false);

        for path in ["../outside.txt", "/tmp/outside.txt", "src/../../outside.txt"] {
            let entry = SourceEntry::plain_text(path, "x");
            let err = write_source(&entry, &stage, &mut store).unwrap_err();
            assert!(matches!(err, StageError::Io { .. }), "{path}");
        }
        assert!(!temp.path().join("outside.txt").exists());
        assert!(store.is_empty());
    }

    #[test]
    fn unmodified_entries_keep_identity() {
        let temp = tempfile::tempdir().expect("tempdir");
        let entry = Arc::new(SourceEntry::plain_text("a.ts", "a"));
        let out = materialize(&entry, &ModifiedSet::default(), temp.path()).expect("materialize");
        assert!(Arc::ptr_eq(&entry, &out));
    }

    #[test]
    fn modified_entries_carry_identity_and_new_content() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut entry = SourceEntry::with_kind(
            "legacy.txt",
            EntryKind::Document {
                language: "text".into(),
                text: "old".into(),
            },
        );
        entry.charset = Some(Charset::Latin1);
        entry.markers.insert("origin".into(), "scan".into());
        let entry = Arc::new(entry);
        let path = temp.path().join("legacy.txt");
        fs::write(&path, [b'n', 0xE9, b'w']).expect("write");

        let modified: ModifiedSet = [path].into_iter().collect();
        let out = materialize(&entry, &modified, temp.path()).expect("materialize");

        assert!(!Arc::ptr_eq(&entry, &out));
        assert_eq!(out.id, entry.id);
        assert_eq!(out.path, entry.path);
        assert_eq!(out.markers, entry.markers);
        assert_eq!(out.charset, Some(Charset::Latin1));
        assert_eq!(
            out.kind,
            EntryKind::PlainText {
                text: "n\u{e9}w".into()
            }
        );
    }

    #[test]
    fn deleted_modified_file_is_a_read_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let entry = Arc::new(SourceEntry::plain_text("gone.ts", "x"));
        let modified: ModifiedSet = [temp.path().join("gone.ts")].into_iter().collect();
        let err = materialize(&entry, &modified, temp.path()).unwrap_err();
        assert!(matches!(err, StageError::ResultRead { .. }));
    }
}
