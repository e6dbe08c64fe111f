//! Fatal stage failures surfaced to callers.

use std::path::PathBuf;

use thiserror::Error;

use crate::exit_codes;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Every variant aborts the current stage; none is retried.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("cannot allocate working directory {}: {reason}", .path.display())]
    DirectoryAllocation {
        path: PathBuf,
        reason: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("{marker} file not found in the project directory: {}", .dir.display())]
    MissingProjectMarker { marker: String, dir: PathBuf },

    #[error("command `{}` failed in {}", .argv.join(" "), .dir.display())]
    ExternalCommand {
        argv: Vec<String>,
        dir: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("cannot read modified file {}", .path.display())]
    ResultRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{action} {}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StageError {
    /// CLI exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            StageError::MissingProjectMarker { .. } => exit_codes::MISSING_MARKER,
            StageError::ExternalCommand { .. } => exit_codes::COMMAND_FAILED,
            StageError::ResultRead { .. } => exit_codes::READ_FAILED,
            StageError::DirectoryAllocation { .. } | StageError::Io { .. } => exit_codes::INVALID,
        }
    }

    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StageError::Io {
            action,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn allocation(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StageError::DirectoryAllocation {
            path: path.into(),
            reason: reason.into(),
            source: None,
        }
    }
}

pub type StageResult<T> = std::result::Result<T, StageError>;
