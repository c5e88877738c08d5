//! Bounded test/repair loop for the generated project.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{debug, info_span};

use crate::core::extract::extract_array;
use crate::core::patch::PatchPolicy;
use crate::io::artifacts::OutputPaths;
use crate::io::client::Generator;
use crate::io::patch::PatchApplier;
use crate::io::prompt::PromptBook;
use crate::io::run_log::RunLog;
use crate::io::test_runner::{DependencyInstaller, TestRunner};

/// Limits and policy for one loop invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugSettings {
    pub max_iters: u32,
    pub log_tail_lines: usize,
    pub patch_policy: PatchPolicy,
}

impl Default for DebugSettings {
    fn default() -> Self {
        Self {
            max_iters: 3,
            log_tail_lines: 400,
            patch_policy: PatchPolicy::default(),
        }
    }
}

/// Reason why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugStop {
    /// The test command exited 0.
    Passed { iteration: u32 },
    /// The debugger reply held no JSON list.
    Unusable { iteration: u32 },
    /// No patch entry was written.
    NoProgress { iteration: u32 },
    /// Every iteration ended with failing tests.
    Exhausted { max_iters: u32 },
}

impl DebugStop {
    pub fn passed(&self) -> bool {
        matches!(self, DebugStop::Passed { .. })
    }

    /// Short human-readable reason for the run log.
    pub fn describe(&self) -> String {
        match self {
            DebugStop::Passed { iteration } => format!("tests passed on iteration {iteration}"),
            DebugStop::Unusable { iteration } => {
                format!("debugger output unusable on iteration {iteration}")
            }
            DebugStop::NoProgress { iteration } => {
                format!("no patches applied on iteration {iteration}")
            }
            DebugStop::Exhausted { max_iters } => {
                format!("tests still failing after {max_iters} iteration(s)")
            }
        }
    }
}

/// Summary of a loop invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugOutcome {
    pub stop: DebugStop,
    pub test_runs: u32,
    /// Relative paths written by patches, in application order.
    pub patched: Vec<PathBuf>,
}

/// Collaborators for the repair loop.
pub struct DebugLoop<'a, G, R, I> {
    pub generator: &'a G,
    pub runner: &'a R,
    pub installer: &'a I,
    pub prompts: &'a PromptBook,
    pub paths: &'a OutputPaths,
    pub log: &'a RunLog,
    pub settings: DebugSettings,
}

impl<G: Generator, R: TestRunner, I: DependencyInstaller> DebugLoop<'_, G, R, I> {
    /// Run tests and apply debugger patches until tests pass or the loop cannot progress.
    ///
    /// Returns `Err` only for fatal conditions: the test command cannot run, the
    /// run log cannot be read, or both models fail to answer the debugger prompt.
    pub fn run(&self) -> Result<DebugOutcome> {
        let max_iters = self.settings.max_iters;
        let applier = PatchApplier::new(
            &self.paths.code_dir,
            self.settings.patch_policy,
            self.log,
        );
        let mut test_runs = 0u32;
        let mut patched = Vec::new();

        for iteration in 1..=max_iters {
            let _span = info_span!("debug_iteration", iteration).entered();
            self.log
                .info(format!("Debug iteration {iteration}/{max_iters}"));
            self.install_requirements();

            self.log.info("Running tests...");
            let run = self
                .runner
                .run(&self.paths.code_dir)
                .context("run test command")?;
            test_runs += 1;
            self.log.output_block("tests", &run.output);

            if run.passed {
                self.log.info("Tests passed.");
                return Ok(DebugOutcome {
                    stop: DebugStop::Passed { iteration },
                    test_runs,
                    patched,
                });
            }
            let exit = run
                .exit_code
                .map_or_else(|| "no exit code".to_string(), |code| format!("exit {code}"));
            self.log.warn(format!("Tests failed ({exit})."));

            let tail = self.log.tail(self.settings.log_tail_lines)?;
            let prompt = self.prompts.debugger(&tail)?;
            let reply = self
                .generator
                .generate(&prompt)
                .context("debugger generation failed")?;

            let Some(entries) = extract_array(&reply) else {
                self.log
                    .warn("Debugger returned non-JSON or not a list; stopping.");
                return Ok(DebugOutcome {
                    stop: DebugStop::Unusable { iteration },
                    test_runs,
                    patched,
                });
            };

            let report = applier.apply(&entries);
            if !report.applied_any() {
                self.log.warn("No patches applied; stopping.");
                return Ok(DebugOutcome {
                    stop: DebugStop::NoProgress { iteration },
                    test_runs,
                    patched,
                });
            }
            debug!(applied = report.applied.len(), "patches applied");
            patched.extend(report.applied);
        }

        Ok(DebugOutcome {
            stop: DebugStop::Exhausted { max_iters },
            test_runs,
            patched,
        })
    }

    /// Best-effort dependency install; failures are logged and ignored.
    fn install_requirements(&self) {
        let requirements = &self.paths.requirements_path;
        if !requirements.is_file() {
            self.log
                .info("No requirements.txt found; skipping dependency install.");
            return;
        }
        self.log.info("Installing requirements (best-effort)...");
        match self.installer.install(requirements, &self.paths.code_dir) {
            Ok(output) => self.log.output_block("install", &output),
            Err(err) => self
                .log
                .warn(format!("Dependency install failed (continuing): {err:#}")),
        }
    }
}
