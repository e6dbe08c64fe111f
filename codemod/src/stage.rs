//! Orchestration for a single pipeline stage.
//!
//! A stage owns one working directory. The first stage of a pipeline writes
//! the caller's entries into it; later stages copy the previous stage's tree
//! instead. After the external tool runs, entries whose files changed are
//! replaced with the new content and everything else passes through.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::core::histogram::ExtensionHistogram;
use crate::core::recipe::Recipe;
use crate::core::types::SourceEntry;
use crate::error::StageResult;
use crate::io::carry::copy_from_previous;
use crate::io::config::CodemodConfig;
use crate::io::executor::Executor;
use crate::io::materialize::{materialize, resolved_path, write_source};
use crate::io::snapshot::{FileSnapshotStore, ModifiedSet, find_untracked};
use crate::io::workdir::allocate;
use crate::orchestrator::{Orchestrator, StageRun};

pub const REPO_DIR_NAME: &str = "repo";
pub const MODULES_DIR_NAME: &str = "recipe-run-modules";
pub const LOGS_DIR_NAME: &str = "logs";

/// Directories never reported as externally created files.
const UNTRACKED_SKIP: &[&str] = &["node_modules", ".git"];

/// State threaded from one stage to the next.
///
/// Only the previous stage's directory and the first stage's position cross
/// stage boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineContext {
    run_dir: PathBuf,
    previous_dir: Option<PathBuf>,
    first_stage: Option<usize>,
}

impl PipelineContext {
    /// `run_dir` is the scratch directory holding every stage of this run.
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_dir: run_dir.into(),
            previous_dir: None,
            first_stage: None,
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn previous_dir(&self) -> Option<&Path> {
        self.previous_dir.as_deref()
    }

    pub fn first_stage(&self) -> Option<usize> {
        self.first_stage
    }

    fn is_first(&self, position: usize) -> bool {
        self.first_stage == Some(position)
    }
}

/// Mutable per-stage state: working directory, snapshots, modified set and
/// extension counts.
#[derive(Debug)]
pub struct Accumulator {
    directory: PathBuf,
    snapshots: FileSnapshotStore,
    modified: ModifiedSet,
    histogram: ExtensionHistogram,
}

impl Accumulator {
    pub fn new(directory: PathBuf, hash_contents: bool) -> Self {
        Self {
            directory,
            snapshots: FileSnapshotStore::new(hash_contents),
            modified: ModifiedSet::default(),
            histogram: ExtensionHistogram::new(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn snapshots(&self) -> &FileSnapshotStore {
        &self.snapshots
    }

    pub fn modified(&self) -> &ModifiedSet {
        &self.modified
    }

    pub fn histogram(&self) -> &ExtensionHistogram {
        &self.histogram
    }

    pub fn parser(&self) -> &'static str {
        self.histogram.parser()
    }

    /// Count `entry` and, when `write` is set, materialize it into the directory.
    ///
    /// Every entry is counted; only materializable kinds are written.
    pub fn scan(&mut self, entry: &SourceEntry, write: bool) -> StageResult<()> {
        self.histogram.record(entry);
        if write {
            write_source(entry, &self.directory, &mut self.snapshots)?;
        }
        Ok(())
    }

    pub fn copy_from_previous(&mut self, previous: &Path) -> StageResult<usize> {
        copy_from_previous(previous, &self.directory, &mut self.snapshots)
    }

    pub fn detect_changes(&mut self) -> StageResult<()> {
        self.modified = self.snapshots.detect()?;
        Ok(())
    }

    pub fn was_modified(&self, entry: &SourceEntry) -> bool {
        resolved_path(&self.directory, entry).is_ok_and(|path| self.modified.contains(&path))
    }
}

/// What one stage did, for logs and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub position: usize,
    pub recipe: String,
    pub directory: PathBuf,
    pub parser: String,
    /// Output location of the primary command; `None` for a no-op stage.
    pub output: Option<PathBuf>,
    /// Modified or deleted tracked files, relative to the stage directory.
    pub modified: Vec<PathBuf>,
    /// Files the tools created that no entry tracks, relative to the stage directory.
    pub created: Vec<PathBuf>,
}

/// Entries after a stage plus its report.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub entries: Vec<Arc<SourceEntry>>,
    pub report: StageReport,
}

/// Run one stage at `position` of the pipeline.
#[instrument(skip_all, fields(position = position, recipe = recipe.slug()))]
pub fn run_stage<E: Executor>(
    ctx: &mut PipelineContext,
    position: usize,
    recipe: &Recipe,
    entries: &[Arc<SourceEntry>],
    config: &CodemodConfig,
    executor: &E,
) -> StageResult<StageOutcome> {
    let stage_scratch = allocate(ctx.run_dir(), &format!("stage-{position:02}"))?;
    let directory = allocate(&stage_scratch, REPO_DIR_NAME)?;
    if ctx.first_stage().is_none() {
        ctx.first_stage = Some(position);
    }
    let first = ctx.is_first(position);
    let mut acc = Accumulator::new(directory, config.content_hash_fallback);

    for entry in entries {
        acc.scan(entry, first)?;
    }
    if !first && let Some(previous) = ctx.previous_dir() {
        acc.copy_from_previous(previous)?;
    }
    info!(
        directory = %acc.directory().display(),
        tracked = acc.snapshots().len(),
        first,
        "stage working directory prepared"
    );

    let modules_dir = allocate(&stage_scratch, MODULES_DIR_NAME)?;
    let logs_dir = stage_scratch.join(LOGS_DIR_NAME);
    let primary = recipe.primary_command();
    let tool_package = recipe.tool_package();
    let parser = acc.parser();
    let run = StageRun {
        stage_dir: acc.directory(),
        modules_dir: &modules_dir,
        logs_dir: &logs_dir,
        primary: &primary,
        tool_package: &tool_package,
        use_legacy_shim: recipe.use_legacy_shim(config.node.legacy_threshold),
        parser,
    };
    let output = Orchestrator::new(executor, config).run(&run)?;

    let mut created = Vec::new();
    if output.is_some() {
        acc.detect_changes()?;
        created = find_untracked(acc.directory(), acc.snapshots(), UNTRACKED_SKIP)?;
    }
    ctx.previous_dir = Some(acc.directory().to_path_buf());

    let updated = entries
        .iter()
        .map(|entry| materialize(entry, acc.modified(), acc.directory()))
        .collect::<StageResult<Vec<_>>>()?;

    let report = StageReport {
        position,
        recipe: recipe.slug().to_string(),
        directory: acc.directory().to_path_buf(),
        parser: parser.to_string(),
        output,
        modified: relative_paths(acc.directory(), acc.modified().iter()),
        created: relative_paths(acc.directory(), created.iter().map(PathBuf::as_path)),
    };
    debug!(
        modified = report.modified.len(),
        created = report.created.len(),
        "stage finished"
    );
    Ok(StageOutcome {
        entries: updated,
        report,
    })
}

fn relative_paths<'a>(root: &Path, paths: impl Iterator<Item = &'a Path>) -> Vec<PathBuf> {
    paths
        .map(|path| path.strip_prefix(root).unwrap_or(path).to_path_buf())
        .collect()
}
