//! Stable exit codes for `codepori` commands.

/// Tests passed within the iteration budget, or the command succeeded.
pub const OK: i32 = 0;
/// The pipeline completed but the generated tests never passed.
pub const TESTS_FAILED: i32 = 1;
/// A fatal error stopped the command (config, backend, extraction, I/O).
pub const FATAL: i32 = 2;
