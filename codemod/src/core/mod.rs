//! Deterministic, pure logic shared by the stage engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod histogram;
pub mod plan;
pub mod recipe;
pub mod types;
