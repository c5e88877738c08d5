//! Adapters for the generated project's test command and dependency install.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use crate::io::config::{InstallConfig, TestsConfig};
use crate::io::process::run_command_with_timeout;

/// Result of one test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestRun {
    /// Exit code 0 (and no timeout).
    pub passed: bool,
    pub exit_code: Option<i32>,
    /// Combined stdout/stderr, appended verbatim to the run log.
    pub output: String,
}

/// Runs the generated project's tests in a working directory.
pub trait TestRunner {
    fn run(&self, workdir: &Path) -> Result<TestRun>;
}

/// Installs dependencies from a requirements file.
pub trait DependencyInstaller {
    /// Install from `requirements`, returning the captured output on success.
    fn install(&self, requirements: &Path, workdir: &Path) -> Result<String>;
}

impl<T: DependencyInstaller + ?Sized> DependencyInstaller for Box<T> {
    fn install(&self, requirements: &Path, workdir: &Path) -> Result<String> {
        (**self).install(requirements, workdir)
    }
}

/// Test runner that spawns the configured command.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandTestRunner {
    pub fn new(config: &TestsConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }
    }
}

impl TestRunner for CommandTestRunner {
    fn run(&self, workdir: &Path) -> Result<TestRun> {
        let cmd = build_command(&self.command, &[], workdir)?;
        info!(command = ?self.command, workdir = %workdir.display(), "running tests");
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run test command {:?}", self.command))?;
        debug!(exit_code = ?output.status.code(), timed_out = output.timed_out, "tests finished");
        Ok(TestRun {
            passed: output.succeeded(),
            exit_code: output.status.code(),
            output: output.combined_text(),
        })
    }
}

/// Installer that spawns the configured command with the requirements path appended.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandInstaller {
    pub fn new(config: &InstallConfig, output_limit_bytes: usize) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            output_limit_bytes,
        }
    }
}

impl DependencyInstaller for CommandInstaller {
    fn install(&self, requirements: &Path, workdir: &Path) -> Result<String> {
        let cmd = build_command(&self.command, &[requirements.to_path_buf()], workdir)?;
        let output = run_command_with_timeout(cmd, self.timeout, self.output_limit_bytes)
            .with_context(|| format!("run install command {:?}", self.command))?;
        let text = output.combined_text();
        if output.timed_out {
            return Err(anyhow!("install timed out after {:?}\n{text}", self.timeout));
        }
        if !output.status.success() {
            return Err(anyhow!(
                "install exited with status {:?}\n{text}",
                output.status.code()
            ));
        }
        Ok(text)
    }
}

/// Installer used when dependency installation is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipInstall;

impl DependencyInstaller for SkipInstall {
    fn install(&self, _requirements: &Path, _workdir: &Path) -> Result<String> {
        Ok("dependency install disabled".to_string())
    }
}

fn build_command(argv: &[String], extra: &[PathBuf], workdir: &Path) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("command must not be empty"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).args(extra).current_dir(workdir);
    Ok(cmd)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn tests_config(script: &str) -> TestsConfig {
        TestsConfig {
            command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            ..TestsConfig::default()
        }
    }

    #[test]
    fn zero_exit_is_a_pass() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = CommandTestRunner::new(&tests_config("echo 1 passed"));
        let run = runner.run(temp.path()).expect("run");
        assert!(run.passed);
        assert_eq!(run.exit_code, Some(0));
        assert_eq!(run.output.trim(), "1 passed");
    }

    #[test]
    fn nonzero_exit_is_a_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = CommandTestRunner::new(&tests_config("echo boom >&2; exit 1"));
        let run = runner.run(temp.path()).expect("run");
        assert!(!run.passed);
        assert_eq!(run.exit_code, Some(1));
        assert!(run.output.contains("boom"));
    }

    #[test]
    fn runs_inside_the_working_directory() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("marker.txt"), "here").expect("write");
        let runner = CommandTestRunner::new(&tests_config("cat marker.txt"));
        let run = runner.run(temp.path()).expect("run");
        assert_eq!(run.output, "here");
    }

    #[test]
    fn installer_appends_requirements_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let requirements = temp.path().join("requirements.txt");
        std::fs::write(&requirements, "requests==2.32.3\n").expect("write");
        let installer = CommandInstaller::new(
            &InstallConfig {
                enabled: true,
                command: vec!["cat".to_string()],
                timeout_secs: 10,
            },
            10_000,
        );
        let output = installer.install(&requirements, temp.path()).expect("install");
        assert_eq!(output, "requests==2.32.3\n");
    }

    #[test]
    fn installer_reports_failing_command() {
        let temp = tempfile::tempdir().expect("tempdir");
        let installer = CommandInstaller::new(
            &InstallConfig {
                enabled: true,
                command: vec!["false".to_string()],
                timeout_secs: 10,
            },
            10_000,
        );
        let err = installer
            .install(&temp.path().join("requirements.txt"), temp.path())
            .unwrap_err();
        assert!(err.to_string().contains("install exited"));
    }
}
