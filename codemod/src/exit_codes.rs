//! Stable exit codes for codemod CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments or configuration, or any other failure.
pub const INVALID: i32 = 1;
/// A stage's working directory lacked the project marker file.
pub const MISSING_MARKER: i32 = 2;
/// An install step or the primary command failed.
pub const COMMAND_FAILED: i32 = 3;
/// A modified file could not be read back after the run.
pub const READ_FAILED: i32 = 4;
