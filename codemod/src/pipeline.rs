//! Run every configured stage in order over one source collection.

use std::sync::Arc;

use tracing::{info, instrument};
use uuid::Uuid;

use crate::core::recipe::Recipe;
use crate::core::types::SourceEntry;
use crate::error::StageResult;
use crate::io::config::CodemodConfig;
use crate::io::executor::Executor;
use crate::io::workdir::allocate;
use crate::stage::{PipelineContext, StageReport, run_stage};

/// Final entries and one report per stage.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub entries: Vec<Arc<SourceEntry>>,
    pub reports: Vec<StageReport>,
}

impl PipelineOutcome {
    /// Entries that differ (by identity) from the input at the same index.
    pub fn changed<'a>(
        &'a self,
        original: &'a [Arc<SourceEntry>],
    ) -> impl Iterator<Item = &'a Arc<SourceEntry>> + 'a {
        self.entries
            .iter()
            .zip(original)
            .filter(|(after, before)| !Arc::ptr_eq(after, before))
            .map(|(after, _)| after)
    }
}

/// Run the stages from `config` in order.
///
/// The scratch root must already exist; each run gets a fresh directory under it.
pub fn run_pipeline<E: Executor>(
    config: &CodemodConfig,
    entries: Vec<Arc<SourceEntry>>,
    executor: &E,
) -> StageResult<PipelineOutcome> {
    run_recipes(config, &config.recipes(), entries, executor)
}

#[instrument(skip_all, fields(stages = recipes.len(), entries = entries.len()))]
pub fn run_recipes<E: Executor>(
    config: &CodemodConfig,
    recipes: &[Recipe],
    entries: Vec<Arc<SourceEntry>>,
    executor: &E,
) -> StageResult<PipelineOutcome> {
    let run_name = format!("run-{}", Uuid::new_v4().simple());
    let run_dir = allocate(&config.scratch_root(), &run_name)?;
    info!(run_dir = %run_dir.display(), "pipeline started");

    let mut ctx = PipelineContext::new(run_dir);
    let mut current = entries;
    let mut reports = Vec::with_capacity(recipes.len());
    for (index, recipe) in recipes.iter().enumerate() {
        let position = index + 1;
        let outcome = run_stage(&mut ctx, position, recipe, &current, config, executor)?;
        info!(
            position,
            recipe = recipe.slug(),
            modified = outcome.report.modified.len(),
            "stage completed"
        );
        current = outcome.entries;
        reports.push(outcome.report);
    }

    Ok(PipelineOutcome {
        entries: current,
        reports,
    })
}
