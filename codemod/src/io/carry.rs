//! Copy a previous stage's working tree into the current stage.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, instrument};
use walkdir::WalkDir;

use crate::error::{StageError, StageResult};
use crate::io::snapshot::{FileSnapshotStore, is_not_found};

/// Copy every directory and file under `previous` into `current`, recording a
/// fresh snapshot for each copied file.
///
/// Files that disappear between the walk and the copy are skipped. Existing
/// files in `current` are overwritten.
#[instrument(skip_all, fields(previous = %previous.display(), current = %current.display()))]
pub fn copy_from_previous(
    previous: &Path,
    current: &Path,
    snapshots: &mut FileSnapshotStore,
) -> StageResult<usize> {
    let mut copied = 0usize;
    for entry in WalkDir::new(previous).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if is_not_found(&err) => continue,
            Err(err) => {
                let path = err.path().unwrap_or(previous).to_path_buf();
                return Err(StageError::io("walk previous stage", path, err.into()));
            }
        };
        let relative = entry
            .path()
            .strip_prefix(previous)
            .map_err(|_| {
                StageError::io(
                    "relativize",
                    entry.path(),
                    std::io::Error::new(ErrorKind::InvalidInput, "path escapes previous stage"),
                )
            })?;
        let target = current.join(relative);

        if entry.file_type().is_dir() {
            if relative.as_os_str().is_empty() {
                continue;
            }
            match fs::create_dir(&target) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::AlreadyExists && target.is_dir() => {}
                Err(err) => return Err(StageError::io("create directory", &target, err)),
            }
            continue;
        }

        if entry.path_is_symlink() {
            link_entry(entry.path(), &target)
                .map_err(|err| StageError::io("recreate link", &target, err))?;
            continue;
        }

        if !copy_file(entry.path(), &target)
            .map_err(|err| StageError::io("copy file", &target, err))?
        {
            debug!(path = %entry.path().display(), "file vanished before copy");
            continue;
        }
        snapshots.record(&target)?;
        copied += 1;
    }
    debug!(copied, "carried forward previous stage");
    Ok(copied)
}

/// Copy `source` to `target`. Returns `false` when `source` no longer exists.
fn copy_file(source: &Path, target: &Path) -> std::io::Result<bool> {
    match fs::copy(source, target) {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound && !source.exists() => Ok(false),
        Err(err) => Err(err),
    }
}

/// Recreate the link at `source` as `target`, replacing whatever is there.
/// The link is copied as a link; its destination is never followed.
fn link_entry(source: &Path, target: &Path) -> std::io::Result<()> {
    let destination = fs::read_link(source)?;
    match fs::symlink_metadata(target) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(target)?,
        Ok(_) => fs::remove_file(target)?,
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    create_link(&destination, source, target)
}

#[cfg(unix)]
fn create_link(destination: &Path, _source: &Path, target: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(destination, target)
}

#[cfg(not(unix))]
fn create_link(_destination: &Path, source: &Path, target: &Path) -> std::io::Result<()> {
    if source.is_dir() {
        fs::create_dir_all(target)
    } else {
        fs::copy(source, target).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::snapshot::modified_millis;

    #[test]
    fn copies_tree_and_snapshots_every_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let previous = temp.path().join("prev");
        let current = temp.path().join("curr");
        fs::create_dir_all(previous.join("src/app")).expect("mkdir");
        fs::create_dir_all(previous.join("empty")).expect("mkdir");
        fs::create_dir_all(&current).expect("mkdir");
        fs::write(previous.join("angular.json"), "{}").expect("write");
        fs::write(previous.join("src/app/app.ts"), "export {}").expect("write");

        let mut store = FileSnapshotStore::new(false);
        let copied = copy_from_previous(&previous, &current, &mut store).expect("copy");

        assert_eq!(copied, 2);
        assert!(current.join("empty").is_dir());
        assert_eq!(
            fs::read_to_string(current.join("src/app/app.ts")).expect("read"),
            "export {}"
        );
        assert_eq!(store.len(), 2);
        assert!(store.contains(&current.join("angular.json")));
        assert!(store.contains(&current.join("src/app/app.ts")));
        assert!(!store.contains(&previous.join("angular.json")));

        for path in [current.join("angular.json"), current.join("src/app/app.ts")] {
            let copied_at = modified_millis(&path).expect("mtime");
            assert_eq!(store.get(&path).expect("stamp").modified_ms, copied_at);
        }
    }

    #[test]
    fn missing_source_is_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let copied = copy_file(&temp.path().join("gone.ts"), &temp.path().join("out.ts"))
            .expect("copy");
        assert!(!copied);
        assert!(!temp.path().join("out.ts").exists());
    }

    #[cfg(unix)]
    #[test]
    fn directory_links_are_recreated_not_followed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let previous = temp.path().join("prev");
        let current = temp.path().join("curr");
        fs::create_dir_all(previous.join("packages/lib")).expect("mkdir");
        fs::create_dir_all(previous.join("node_modules")).expect("mkdir");
        fs::create_dir_all(&current).expect("mkdir");
        fs::write(previous.join("packages/lib/index.js"), "module.exports = 1;").expect("write");
        std::os::unix::fs::symlink("../packages/lib", previous.join("node_modules/lib"))
            .expect("symlink");

        let mut store = FileSnapshotStore::new(false);
        let copied = copy_from_previous(&previous, &current, &mut store).expect("copy");

        assert_eq!(copied, 1);
        let link = current.join("node_modules/lib");
        assert!(fs::symlink_metadata(&link).expect("meta").file_type().is_symlink());
        assert_eq!(fs::read_link(&link).expect("read link"), Path::new("../packages/lib"));
        assert_eq!(
            fs::read_to_string(link.join("index.js")).expect("read through link"),
            "module.exports = 1;"
        );
        assert!(!store.contains(&link));
    }

    #[test]
    fn overwrites_existing_files_in_target() {
        let temp = tempfile::tempdir().expect("tempdir");
        let previous = temp.path().join("prev");
        let current = temp.path().join("curr");
        fs::create_dir_all(&previous).expect("mkdir");
        fs::create_dir_all(&current).expect("mkdir");
        fs::write(previous.join("a.txt"), "new").expect("write");
        fs::write(current.join("a.txt"), "stale").expect("write");

        let mut store = FileSnapshotStore::new(false);
        copy_from_previous(&previous, &current, &mut store).expect("copy");
        assert_eq!(fs::read_to_string(current.join("a.txt")).expect("read"), "new");
    }
}
