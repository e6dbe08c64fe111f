//! Side-effecting operations: filesystem, configuration and process execution.

pub mod carry;
pub mod config;
pub mod executor;
pub mod ingest;
pub mod materialize;
pub mod npmrc;
pub mod process;
pub mod snapshot;
pub mod workdir;
