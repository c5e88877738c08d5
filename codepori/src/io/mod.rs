//! Side-effecting adapters: filesystem, HTTP backend, child processes.

pub mod artifacts;
pub mod client;
pub mod config;
pub mod patch;
pub mod process;
pub mod prompt;
pub mod run_log;
pub mod test_runner;
