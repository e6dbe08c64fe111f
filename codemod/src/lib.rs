//! Staged codemod orchestration.
//!
//! A pipeline runs one or more external codemod tools over a project held in
//! memory as source entries. Each stage materializes the project into its own
//! working directory, bootstraps the tool into an isolated module cache, runs
//! it, and folds the files it changed back into the entry collection.
//!
//! - **[`core`]**: Pure logic (entry kinds, command templates, recipes,
//!   parser selection). No I/O.
//! - **[`io`]**: Filesystem, configuration and process execution.
//!
//! [`orchestrator`], [`stage`] and [`pipeline`] coordinate the two.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod stage;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
