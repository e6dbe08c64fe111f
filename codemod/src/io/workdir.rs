//! Named working directories under a scratch root.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{StageError, StageResult};

/// Return `parent/name`, creating it if needed, with symlinks resolved.
///
/// Idempotent: an existing directory is reused. The parent must already exist.
pub fn allocate(parent: &Path, name: &str) -> StageResult<PathBuf> {
    if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(StageError::allocation(
            parent.join(name),
            "name must be a single path component",
        ));
    }
    if !parent.is_dir() {
        return Err(StageError::allocation(
            parent,
            "scratch root is not an existing directory",
        ));
    }

    let target = parent.join(name);
    match fs::create_dir(&target) {
        Ok(()) => debug!(path = %target.display(), "created working directory"),
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            if !target.is_dir() {
                return Err(StageError::allocation(&target, "exists but is not a directory"));
            }
            debug!(path = %target.display(), "reusing working directory");
        }
        Err(err) => {
            return Err(StageError::DirectoryAllocation {
                path: target,
                reason: "create directory".into(),
                source: Some(err),
            });
        }
    }

    fs::canonicalize(&target).map_err(|err| StageError::DirectoryAllocation {
        path: target,
        reason: "resolve directory".into(),
        source: Some(err),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let first = allocate(temp.path(), "repo").expect("allocate");
        fs::write(first.join("keep.txt"), "x").expect("write");
        let second = allocate(temp.path(), "repo").expect("allocate again");
        assert_eq!(first, second);
        assert!(second.join("keep.txt").exists());
        assert!(first.is_absolute());
    }

    #[test]
    fn missing_parent_is_an_allocation_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = allocate(&temp.path().join("missing"), "repo").unwrap_err();
        assert!(matches!(err, StageError::DirectoryAllocation { .. }));
    }

    #[test]
    fn existing_file_is_an_allocation_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("repo"), "not a dir").expect("write");
        let err = allocate(temp.path(), "repo").unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn rejects_nested_names() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(allocate(temp.path(), "a/b").is_err());
        assert!(allocate(temp.path(), "..").is_err());
    }
}
