//! Bootstrap installs and the primary command for one stage.
//!
//! Every stage runs the same fixed sequence in its working directory:
//!
//! 1. install native-build helpers into the isolated module cache
//! 2. install the tool package into the same cache
//! 3. install the project's own dependencies in place
//! 4. run the primary command
//!
//! The first failure aborts the rest. The stage-local npm configuration is
//! restored whether or not the sequence succeeded.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::core::plan::{Bindings, CommandTemplate, REPO_DIR, with_shim};
use crate::error::{StageError, StageResult};
use crate::io::config::CodemodConfig;
use crate::io::executor::{ExecRequest, Executor};
use crate::io::npmrc::{NPMRC_FILE, NpmrcGuard, npmrc_lines};

pub const STEP_NATIVE_BUILD: &str = "native-build";
pub const STEP_TOOL_INSTALL: &str = "tool-install";
pub const STEP_PROJECT_INSTALL: &str = "project-install";
pub const STEP_PRIMARY: &str = "primary";

/// Inputs for one orchestrated run.
#[derive(Debug, Clone)]
pub struct StageRun<'a> {
    pub stage_dir: &'a Path,
    /// Isolated module cache shared by the install steps and the primary command.
    pub modules_dir: &'a Path,
    /// Directory receiving one output log per step.
    pub logs_dir: &'a Path,
    /// Primary command; markers other than the version are resolved here.
    pub primary: &'a CommandTemplate,
    pub tool_package: &'a str,
    pub use_legacy_shim: bool,
    pub parser: &'a str,
}

/// A fully planned external invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub label: &'static str,
    pub argv: Vec<String>,
}

/// Plan the four steps of a run. Returns nothing for an empty primary command.
pub fn plan_steps(run: &StageRun<'_>, config: &CodemodConfig) -> Vec<PlannedStep> {
    if run.primary.is_empty() {
        return Vec::new();
    }
    let modules = run.modules_dir.display().to_string();
    let userconfig = run.stage_dir.join(NPMRC_FILE).display().to_string();
    let prefixed_install = |packages: Vec<String>| -> Vec<String> {
        let mut argv: Vec<String> = [
            "npm",
            "install",
            "--userconfig",
            userconfig.as_str(),
            "--prefix",
            modules.as_str(),
            "--force",
            "--ignore-scripts",
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect();
        argv.extend(packages);
        argv
    };

    let bindings = Bindings {
        version: None,
        modules_dir: Some(modules.clone()),
        repo_dir: Some(REPO_DIR.to_string()),
        parser: Some(run.parser.to_string()),
    };
    let shim = run
        .use_legacy_shim
        .then_some(config.node.legacy_shim.as_str());

    [
        (
            STEP_NATIVE_BUILD,
            prefixed_install(config.node.native_build_packages.clone()),
        ),
        (
            STEP_TOOL_INSTALL,
            prefixed_install(vec![run.tool_package.to_string()]),
        ),
        (
            STEP_PROJECT_INSTALL,
            ["npm", "install", "--force", "--ignore-scripts"]
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        ),
        (STEP_PRIMARY, run.primary.plan(&bindings)),
    ]
    .into_iter()
    .map(|(label, argv)| PlannedStep {
        label,
        argv: with_shim(argv, shim),
    })
    .collect()
}

/// Environment applied to every step of a run.
pub fn stage_environment(modules_dir: &Path, heap_mb: u32) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("NG_DISABLE_VERSION_CHECK".to_string(), "1".to_string()),
        ("NG_CLI_ANALYTICS".to_string(), "false".to_string()),
        (
            "NODE_OPTIONS".to_string(),
            format!("--max-old-space-size={heap_mb}"),
        ),
        ("NODE_PATH".to_string(), modules_dir.display().to_string()),
        ("TERM".to_string(), "dumb".to_string()),
    ])
}

/// Runs the bootstrap sequence and primary command through an [`Executor`].
pub struct Orchestrator<'a, E: Executor> {
    executor: &'a E,
    config: &'a CodemodConfig,
}

impl<'a, E: Executor> Orchestrator<'a, E> {
    pub fn new(executor: &'a E, config: &'a CodemodConfig) -> Self {
        Self { executor, config }
    }

    /// Run every step and return the primary command's output location.
    ///
    /// `Ok(None)` means the stage had no primary command and nothing was spawned.
    #[instrument(skip_all, fields(stage_dir = %run.stage_dir.display(), shim = run.use_legacy_shim))]
    pub fn run(&self, run: &StageRun<'_>) -> StageResult<Option<PathBuf>> {
        let marker = run.stage_dir.join(&self.config.marker_file);
        if !marker.exists() {
            warn!(marker = %marker.display(), "project marker missing");
            return Err(StageError::MissingProjectMarker {
                marker: self.config.marker_file.clone(),
                dir: run.stage_dir.to_path_buf(),
            });
        }

        let steps = plan_steps(run, self.config);
        if steps.is_empty() {
            info!("empty primary command, nothing to run");
            return Ok(None);
        }

        let env = stage_environment(run.modules_dir, self.config.node.heap_mb);
        let lines = npmrc_lines(self.config.npm.registry.as_deref(), &self.config.npm.extra_lines);
        let _npmrc = NpmrcGuard::acquire(run.stage_dir, &lines)
            .map_err(|err| StageError::io("configure npm registry", run.stage_dir.join(NPMRC_FILE), err))?;

        let mut output = None;
        for step in steps {
            let request = ExecRequest {
                label: step.label.to_string(),
                argv: step.argv,
                workdir: run.stage_dir.to_path_buf(),
                env: env.clone(),
                log_path: run.logs_dir.join(format!("{}.log", step.label)),
                timeout: Duration::from_secs(self.config.command_timeout_secs),
                output_limit_bytes: self.config.output_limit_bytes,
            };
            debug!(step = step.label, "executing step");
            match self.executor.exec(&request) {
                Ok(out) => output = Some(out),
                Err(err) => {
                    warn!(step = step.label, err = %format!("{err:#}"), "step failed, aborting stage");
                    return Err(StageError::ExternalCommand {
                        argv: request.argv,
                        dir: request.workdir,
                        source: err.into(),
                    });
                }
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture<'a>(
        stage: &'a Path,
        modules: &'a Path,
        primary: &'a CommandTemplate,
        shim: bool,
    ) -> StageRun<'a> {
        StageRun {
            stage_dir: stage,
            modules_dir: modules,
            logs_dir: modules,
            primary,
            tool_package: "@angular/cli@16",
            use_legacy_shim: shim,
            parser: "ts",
        }
    }

    #[test]
    fn plans_bootstrap_then_primary() {
        let primary = CommandTemplate::new(["ng", "update", "--modules=${nodeModules}", "${repoDir}"]);
        let run = fixture(Path::new("/s/repo"), Path::new("/s/mods"), &primary, false);
        let steps = plan_steps(&run, &CodemodConfig::default());

        let labels: Vec<&str> = steps.iter().map(|s| s.label).collect();
        assert_eq!(
            labels,
            [STEP_NATIVE_BUILD, STEP_TOOL_INSTALL, STEP_PROJECT_INSTALL, STEP_PRIMARY]
        );
        assert_eq!(
            steps[0].argv,
            [
                "npm",
                "install",
                "--userconfig",
                "/s/repo/.npmrc",
                "--prefix",
                "/s/mods",
                "--force",
                "--ignore-scripts",
                "node-gyp@10",
                "nan@2"
            ]
        );
        assert_eq!(steps[1].argv.last().map(String::as_str), Some("@angular/cli@16"));
        assert_eq!(steps[2].argv, ["npm", "install", "--force", "--ignore-scripts"]);
        assert_eq!(steps[3].argv, ["ng", "update", "--modules=/s/mods", "."]);
    }

    #[test]
    fn shim_prefixes_every_step() {
        let primary = CommandTemplate::new(["ng", "update"]);
        let run = fixture(Path::new("/s/repo"), Path::new("/s/mods"), &primary, true);
        let steps = plan_steps(&run, &CodemodConfig::default());
        assert_eq!(steps.len(), 4);
        assert!(steps.iter().all(|s| s.argv[0] == "nvm-exec"));
    }

    #[test]
    fn empty_primary_plans_nothing() {
        let primary = CommandTemplate::default();
        let run = fixture(Path::new("/s/repo"), Path::new("/s/mods"), &primary, true);
        assert!(plan_steps(&run, &CodemodConfig::default()).is_empty());
    }

    #[test]
    fn environment_is_fixed() {
        let env = stage_environment(Path::new("/s/mods"), 2048);
        assert_eq!(env["NG_DISABLE_VERSION_CHECK"], "1");
        assert_eq!(env["NG_CLI_ANALYTICS"], "false");
        assert_eq!(env["NODE_OPTIONS"], "--max-old-space-size=2048");
        assert_eq!(env["NODE_PATH"], "/s/mods");
        assert_eq!(env["TERM"], "dumb");
    }
}
