//! Executor abstraction for external command invocation.
//!
//! The [`Executor`] trait decouples stage orchestration from actually spawning
//! processes. Tests use scripted executors that record requests and apply
//! file edits without spawning anything.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, info, instrument, warn};

use crate::io::process::run_command_with_timeout;

/// One external command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Step label, used for log file names and diagnostics.
    pub label: String,
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    /// Working directory for the process.
    pub workdir: PathBuf,
    /// Variables layered over the inherited host environment.
    pub env: BTreeMap<String, String>,
    /// Where captured stdout/stderr is written.
    pub log_path: PathBuf,
    /// Maximum time to wait before killing the process.
    pub timeout: Duration,
    /// Truncate captured output beyond this many bytes per stream.
    pub output_limit_bytes: usize,
}

/// Runs argv with an environment in a cwd.
///
/// Returns the location of the captured output and fails on non-zero exit.
pub trait Executor {
    fn exec(&self, request: &ExecRequest) -> Result<PathBuf>;
}

/// Executor that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

impl Executor for ProcessExecutor {
    #[instrument(skip_all, fields(label = %request.label, timeout_secs = request.timeout.as_secs()))]
    fn exec(&self, request: &ExecRequest) -> Result<PathBuf> {
        let (program, args) = request
            .argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command for step {}", request.label))?;
        info!(workdir = %request.workdir.display(), command = %request.argv.join(" "), "running command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&request.workdir)
            .envs(&request.env);

        let output = run_command_with_timeout(cmd, request.timeout, request.output_limit_bytes)
            .with_context(|| format!("run {}", program))?;

        write_command_log(&request.log_path, &output.render_log(&request.label))?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "command timed out");
            bail!("{} timed out after {:?}", program, request.timeout);
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), log = %request.log_path.display(), "command failed");
            bail!(
                "{} exited with status {:?} (log: {})",
                program,
                output.status.code(),
                request.log_path.display()
            );
        }

        debug!("command completed successfully");
        Ok(request.log_path.clone())
    }
}

fn write_command_log(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create command log dir {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write command log {}", path.display()))
}
