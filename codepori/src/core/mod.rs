//! Deterministic, pure logic shared by the pipeline stages.
//!
//! Core modules must be free of I/O side effects. They operate on model text
//! and in-memory values and return deterministic outputs suitable for tests.

pub mod extract;
pub mod patch;
pub mod path;
pub mod plan;
pub mod text;
pub mod types;
