//! Modification-time snapshots and change detection.
//!
//! Detection is snapshot-relative: only recorded paths are compared. Files an
//! external command creates from scratch are not part of the modified set;
//! [`find_untracked`] lists them separately for reporting.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::{StageError, StageResult};

/// What was observed for a path when it was written or copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStamp {
    /// Modification time in milliseconds since the Unix epoch.
    pub modified_ms: u128,
    /// Hex SHA-256 of the content, recorded only with the content-hash fallback.
    pub digest: Option<String>,
}

/// Absolute path -> stamp observed when the file entered the working directory.
#[derive(Debug, Clone, Default)]
pub struct FileSnapshotStore {
    entries: BTreeMap<PathBuf, FileStamp>,
    hash_contents: bool,
}

impl FileSnapshotStore {
    pub fn new(hash_contents: bool) -> Self {
        Self {
            entries: BTreeMap::new(),
            hash_contents,
        }
    }

    /// Stat `path` (and hash it, when enabled) and record the result.
    pub fn record(&mut self, path: &Path) -> StageResult<()> {
        let modified_ms = modified_millis(path)
            .map_err(|err| StageError::io("stat snapshot file", path, err))?;
        let digest = if self.hash_contents {
            Some(digest_file(path).map_err(|err| StageError::io("hash snapshot file", path, err))?)
        } else {
            None
        };
        trace!(path = %path.display(), modified_ms, "snapshot recorded");
        self.entries.insert(
            path.to_path_buf(),
            FileStamp {
                modified_ms,
                digest,
            },
        );
        Ok(())
    }

    pub fn get(&self, path: &Path) -> Option<&FileStamp> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Path, &FileStamp)> {
        self.entries.iter().map(|(path, stamp)| (path.as_path(), stamp))
    }

    /// Compare every recorded path against the filesystem.
    ///
    /// A path is modified when it no longer exists or its modification time is
    /// strictly later than recorded. With a recorded digest, a changed digest
    /// at an unchanged time also counts.
    pub fn detect(&self) -> StageResult<ModifiedSet> {
        let mut modified = ModifiedSet::default();
        for (path, stamp) in &self.entries {
            let current = match modified_millis(path) {
                Ok(ms) => ms,
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!(path = %path.display(), "tracked file deleted");
                    modified.insert(path.clone());
                    continue;
                }
                Err(err) => return Err(StageError::io("stat tracked file", path, err)),
            };
            if current > stamp.modified_ms {
                modified.insert(path.clone());
                continue;
            }
            if let Some(expected) = &stamp.digest {
                let actual = digest_file(path)
                    .map_err(|err| StageError::io("hash tracked file", path, err))?;
                if &actual != expected {
                    debug!(path = %path.display(), "content changed within timestamp tick");
                    modified.insert(path.clone());
                }
            }
        }
        debug!(
            tracked = self.entries.len(),
            modified = modified.len(),
            "change detection finished"
        );
        Ok(modified)
    }
}

/// Absolute paths found modified or deleted after a stage ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModifiedSet {
    paths: BTreeSet<PathBuf>,
}

impl ModifiedSet {
    pub fn insert(&mut self, path: PathBuf) {
        self.paths.insert(path);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter().map(PathBuf::as_path)
    }
}

impl FromIterator<PathBuf> for ModifiedSet {
    fn from_iter<I: IntoIterator<Item = PathBuf>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

/// Files under `root` with no snapshot entry, skipping directories named in `skip`.
pub fn find_untracked(
    root: &Path,
    store: &FileSnapshotStore,
    skip: &[&str],
) -> StageResult<Vec<PathBuf>> {
    let mut untracked = Vec::new();
    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !(entry.file_type().is_dir()
                    && entry
                        .file_name()
                        .to_str()
                        .is_some_and(|name| skip.contains(&name)))
        });
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if is_not_found(&err) => continue,
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                return Err(StageError::io("walk stage directory", path, err.into()));
            }
        };
        if entry.file_type().is_file() && !store.contains(entry.path()) {
            untracked.push(entry.into_path());
        }
    }
    Ok(untracked)
}

pub(crate) fn is_not_found(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|io| io.kind() == ErrorKind::NotFound)
}

pub(crate) fn modified_millis(path: &Path) -> std::io::Result<u128> {
    let modified = fs::metadata(path)?.modified()?;
    let since_epoch = modified
        .duration_since(UNIX_EPOCH)
        .map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err))?;
    Ok(since_epoch.as_millis())
}

fn digest_file(path: &Path) -> std::io::Result<String> {
    let bytes = fs::read(path)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{FileTime, set_file_mtime};

    fn bump_mtime(path: &Path, secs: i64) {
        let meta = fs::metadata(path).expect("metadata");
        let current = FileTime::from_last_modification_time(&meta);
        let later = FileTime::from_unix_time(current.unix_seconds() + secs, current.nanoseconds());
        set_file_mtime(path, later).expect("set mtime");
    }

    #[test]
    fn reports_exactly_newer_and_deleted_paths() {
        let temp = tempfile::tempdir().expect("tempdir");
        let a = temp.path().join("a.ts");
        let b = temp.path().join("b.ts");
        let c = temp.path().join("c.ts");
        for path in [&a, &b, &c] {
            fs::write(path, "x").expect("write");
        }
        let mut store = FileSnapshotStore::new(false);
        for path in [&a, &b, &c] {
            store.record(path).expect("record");
        }

        fs::write(&a, "changed").expect("rewrite");
        bump_mtime(&a, 5);
        fs::remove_file(&b).expect("remove");

        let modified = store.detect().expect("detect");
        let paths: Vec<&Path> = modified.iter().collect();
        assert_eq!(paths, vec![a.as_path(), b.as_path()]);
        assert!(!modified.contains(&c));
    }

    #[test]
    fn older_timestamps_are_not_modifications() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("old.txt");
        fs::write(&path, "x").expect("write");
        let mut store = FileSnapshotStore::new(false);
        store.record(&path).expect("record");
        bump_mtime(&path, -60);
        assert!(store.detect().expect("detect").is_empty());
    }

    #[test]
    fn digest_catches_same_tick_rewrites() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("same.txt");
        fs::write(&path, "before").expect("write");
        let original = FileTime::from_last_modification_time(&fs::metadata(&path).expect("meta"));

        let mut plain = FileSnapshotStore::new(false);
        let mut hashed = FileSnapshotStore::new(true);
        plain.record(&path).expect("record");
        hashed.record(&path).expect("record");

        fs::write(&path, "after!").expect("rewrite");
        set_file_mtime(&path, original).expect("restore mtime");

        assert!(plain.detect().expect("detect").is_empty());
        assert!(hashed.detect().expect("detect").contains(&path));
    }

    #[test]
    fn untracked_files_skip_named_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(root.join("node_modules/pkg")).expect("mkdir");
        fs::create_dir_all(root.join("src")).expect("mkdir");
        fs::write(root.join("node_modules/pkg/index.js"), "").expect("write");
        fs::write(root.join("src/tracked.ts"), "").expect("write");
        fs::write(root.join("src/new.ts"), "").expect("write");

        let mut store = FileSnapshotStore::new(false);
        store.record(&root.join("src/tracked.ts")).expect("record");

        let untracked = find_untracked(root, &store, &["node_modules"]).expect("walk");
        assert_eq!(untracked, vec![root.join("src/new.ts")]);
    }
}
