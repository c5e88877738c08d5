//! Multi-stage code generation pipeline driven by a remote text-generation backend.
//!
//! A run asks the backend for a project plan, generates every planned source and
//! test file, writes README and requirements metadata, then alternates test runs
//! with model-proposed patches until the tests pass or the loop cannot progress.
//!
//! - **[`core`]**: Pure, deterministic logic (JSON extraction, path sanitization,
//!   plan parsing, patch preconditions). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (HTTP backend, run log, filesystem,
//!   child processes). Isolated behind traits to enable scripted doubles in tests.
//!
//! Orchestration modules ([`pipeline`], [`debug_loop`], [`run`]) coordinate core
//! logic with I/O to implement the CLI commands.

pub mod core;
pub mod debug_loop;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod run;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
