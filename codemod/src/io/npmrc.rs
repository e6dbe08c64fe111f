//! Stage-local npm registry configuration, restored when the run ends.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use filetime::{FileTime, set_file_mtime};
use tracing::{debug, warn};

pub const NPMRC_FILE: &str = ".npmrc";

/// Holds the stage's `.npmrc` in its run configuration until dropped.
///
/// Dropping writes back whatever was there before, including its modification
/// time, or removes the file if nothing was there. Restore failures are
/// logged, never raised.
#[derive(Debug)]
pub struct NpmrcGuard {
    path: PathBuf,
    original: Option<(Vec<u8>, FileTime)>,
    mutated: bool,
}

impl NpmrcGuard {
    /// Append `lines` to `<dir>/.npmrc` for the duration of the guard.
    ///
    /// With no lines the file is left alone.
    pub fn acquire(dir: &Path, lines: &[String]) -> std::io::Result<Self> {
        let path = dir.join(NPMRC_FILE);
        let original = match fs::read(&path) {
            Ok(bytes) => {
                let meta = fs::metadata(&path)?;
                Some((bytes, FileTime::from_last_modification_time(&meta)))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => return Err(err),
        };

        let mut guard = Self {
            path,
            original,
            mutated: false,
        };
        if lines.is_empty() {
            return Ok(guard);
        }

        let mut contents = guard
            .original
            .as_ref()
            .map(|(bytes, _)| bytes.clone())
            .unwrap_or_default();
        if !contents.is_empty() && !contents.ends_with(b"\n") {
            contents.push(b'\n');
        }
        for line in lines {
            contents.extend_from_slice(line.as_bytes());
            contents.push(b'\n');
        }
        guard.mutated = true;
        fs::write(&guard.path, contents)?;
        debug!(path = %guard.path.display(), lines = lines.len(), "npm registry config applied");
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn restore(&self) -> std::io::Result<()> {
        match &self.original {
            Some((bytes, mtime)) => {
                fs::write(&self.path, bytes)?;
                set_file_mtime(&self.path, *mtime)
            }
            None => match fs::remove_file(&self.path) {
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                other => other,
            },
        }
    }
}

impl Drop for NpmrcGuard {
    fn drop(&mut self) {
        if !self.mutated {
            return;
        }
        match self.restore() {
            Ok(()) => debug!(path = %self.path.display(), "npm registry config restored"),
            Err(err) => warn!(path = %self.path.display(), err = %err, "failed to restore npm registry config"),
        }
    }
}

/// `.npmrc` lines for an optional registry plus extra verbatim lines.
pub fn npmrc_lines(registry: Option<&str>, extra: &[String]) -> Vec<String> {
    registry
        .map(|url| format!("registry={url}"))
        .into_iter()
        .chain(extra.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restores_previous_content_on_drop() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(NPMRC_FILE);
        fs::write(&path, "save-exact=true").expect("write");

        {
            let guard = NpmrcGuard::acquire(temp.path(), &npmrc_lines(Some("https://r.example"), &[]))
                .expect("acquire");
            let during = fs::read_to_string(guard.path()).expect("read");
            assert_eq!(during, "save-exact=true\nregistry=https://r.example\n");
        }

        assert_eq!(fs::read_to_string(&path).expect("read"), "save-exact=true");
    }

    #[test]
    fn restores_modification_time() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(NPMRC_FILE);
        fs::write(&path, "a=b\n").expect("write");
        let earlier = FileTime::from_unix_time(1_600_000_000, 0);
        set_file_mtime(&path, earlier).expect("set mtime");

        drop(NpmrcGuard::acquire(temp.path(), &["c=d".to_string()]).expect("acquire"));

        let meta = fs::metadata(&path).expect("meta");
        assert_eq!(FileTime::from_last_modification_time(&meta), earlier);
    }

    #[test]
    fn removes_file_it_created() {
        let temp = tempfile::tempdir().expect("tempdir");
        {
            let _guard = NpmrcGuard::acquire(temp.path(), &["strict-ssl=false".to_string()])
                .expect("acquire");
            assert!(temp.path().join(NPMRC_FILE).exists());
        }
        assert!(!temp.path().join(NPMRC_FILE).exists());
    }

    #[test]
    fn leaves_file_alone_without_lines() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(NPMRC_FILE);
        fs::write(&path, "a=b\n").expect("write");
        drop(NpmrcGuard::acquire(temp.path(), &[]).expect("acquire"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "a=b\n");
    }
}
