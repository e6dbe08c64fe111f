//! Test helpers: a scripted executor and Angular project fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result, bail};
use filetime::{FileTime, set_file_mtime};
use tempfile::TempDir;

use crate::core::types::{EntryKind, SourceEntry};
use crate::io::config::{CodemodConfig, StageDef};
use crate::io::executor::{ExecRequest, Executor};

/// Scripted outcome for one executor call.
#[derive(Debug, Clone)]
pub enum ScriptedExec {
    Succeed,
    Fail(String),
    /// Write `contents` to `path` (relative to the workdir) and push its mtime forward.
    Write { path: PathBuf, contents: String },
    /// Remove `path` (relative to the workdir).
    Delete { path: PathBuf },
}

/// Executor that records every request and plays back scripted outcomes.
///
/// Calls beyond the script succeed without side effects.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    script: RefCell<VecDeque<ScriptedExec>>,
    requests: RefCell<Vec<ExecRequest>>,
}

impl ScriptedExecutor {
    pub fn new(script: impl IntoIterator<Item = ScriptedExec>) -> Self {
        Self {
            script: RefCell::new(script.into_iter().collect()),
            requests: RefCell::new(Vec::new()),
        }
    }

    /// Succeed for the three install steps, then apply `primary`.
    pub fn with_primary(primary: ScriptedExec) -> Self {
        Self::new([
            ScriptedExec::Succeed,
            ScriptedExec::Succeed,
            ScriptedExec::Succeed,
            primary,
        ])
    }

    pub fn requests(&self) -> Vec<ExecRequest> {
        self.requests.borrow().clone()
    }

    pub fn labels(&self) -> Vec<String> {
        self.requests
            .borrow()
            .iter()
            .map(|request| request.label.clone())
            .collect()
    }
}

impl Executor for ScriptedExecutor {
    fn exec(&self, request: &ExecRequest) -> Result<PathBuf> {
        self.requests.borrow_mut().push(request.clone());
        let next = self
            .script
            .borrow_mut()
            .pop_front()
            .unwrap_or(ScriptedExec::Succeed);

        match next {
            ScriptedExec::Succeed => {}
            ScriptedExec::Fail(message) => bail!("{}: {}", request.label, message),
            ScriptedExec::Write { path, contents } => {
                let target = request.workdir.join(path);
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .with_context(|| format!("create {}", parent.display()))?;
                }
                fs::write(&target, contents)
                    .with_context(|| format!("write {}", target.display()))?;
                bump_mtime(&target)?;
            }
            ScriptedExec::Delete { path } => {
                let target = request.workdir.join(path);
                fs::remove_file(&target).with_context(|| format!("remove {}", target.display()))?;
            }
        }

        if let Some(parent) = request.log_path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&request.log_path, request.argv.join(" "))
            .with_context(|| format!("write {}", request.log_path.display()))?;
        Ok(request.log_path.clone())
    }
}

/// Move `path`'s mtime well past anything recorded during the test.
pub fn bump_mtime(path: &Path) -> Result<()> {
    let later = SystemTime::now() + Duration::from_secs(5);
    set_file_mtime(path, FileTime::from_system_time(later))
        .with_context(|| format!("set mtime {}", path.display()))
}

/// Temporary directory holding a project directory and a scratch root.
#[derive(Debug)]
pub struct Sandbox {
    temp: TempDir,
}

impl Sandbox {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create sandbox")?;
        fs::create_dir_all(temp.path().join("project")).context("create project dir")?;
        fs::create_dir_all(temp.path().join("scratch")).context("create scratch dir")?;
        Ok(Self { temp })
    }

    pub fn project(&self) -> PathBuf {
        self.temp.path().join("project")
    }

    pub fn scratch(&self) -> PathBuf {
        self.temp.path().join("scratch")
    }

    pub fn config(&self, stages: Vec<StageDef>) -> CodemodConfig {
        config_with_stages(&self.scratch(), stages)
    }

    /// Write `entries` into the project directory as they would appear on disk.
    pub fn write_project(&self, entries: &[Arc<SourceEntry>]) -> Result<()> {
        for entry in entries {
            let Some(bytes) = entry.render() else {
                continue;
            };
            let path = self.project().join(&entry.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
            }
            fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
        }
        Ok(())
    }
}

/// Config with one stage per definition and scratch under `scratch_root`.
pub fn config_with_stages(scratch_root: &Path, stages: Vec<StageDef>) -> CodemodConfig {
    CodemodConfig {
        scratch_root: Some(scratch_root.to_path_buf()),
        stages,
        ..CodemodConfig::default()
    }
}

pub fn text(path: &str, contents: &str) -> Arc<SourceEntry> {
    Arc::new(SourceEntry::plain_text(path, contents))
}

pub fn document(path: &str, language: &str, contents: &str) -> Arc<SourceEntry> {
    Arc::new(SourceEntry::with_kind(
        path,
        EntryKind::Document {
            language: language.to_string(),
            text: contents.to_string(),
        },
    ))
}

/// A minimal Angular workspace: marker file, manifest, sources and a binary asset.
pub fn angular_project() -> Vec<Arc<SourceEntry>> {
    vec![
        text("angular.json", "{\n  \"version\": 1,\n  \"projects\": {}\n}\n"),
        document(
            "package.json",
            "json",
            "{\n  \"dependencies\": { \"@angular/core\": \"^15.0.0\" }\n}\n",
        ),
        document("src/app.ts", "typescript", "export class App {}\n"),
        document("src/app.component.tsx", "typescript", "export const view = null;\n"),
        document("src/index.html", "html", "<app-root></app-root>\n"),
        Arc::new(SourceEntry::with_kind("src/favicon.ico", EntryKind::Binary)),
    ]
}
