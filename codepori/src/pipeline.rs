//! Controller sequencing plan, file generation, finalization and the repair loop.
//!
//! Every stage runs to completion before the next begins. Stage errors are
//! returned with the stage name attached; the caller decides how to report them.

use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, info_span};

use crate::core::extract::{extract_json, extract_object};
use crate::core::path::sanitize_relative;
use crate::core::plan::parse_plan;
use crate::core::text::strip_code_fence;
use crate::core::types::{FileSpec, GeneratedArtifact, Plan};
use crate::debug_loop::{DebugLoop, DebugOutcome, DebugSettings};
use crate::exit_codes;
use crate::io::artifacts::{OutputPaths, write_artifact, write_text};
use crate::io::client::Generator;
use crate::io::config::PipelineConfig;
use crate::io::prompt::PromptBook;
use crate::io::run_log::RunLog;
use crate::io::test_runner::{DependencyInstaller, TestRunner};

/// Controller states, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    Plan,
    GenerateFiles,
    Finalize,
    DebugLoop,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "init",
            Stage::Plan => "plan",
            Stage::GenerateFiles => "generate-files",
            Stage::Finalize => "finalize",
            Stage::DebugLoop => "debug-loop",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Knobs the controller reads from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub strip_code_fences: bool,
    pub debug: DebugSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            strip_code_fences: true,
            debug: DebugSettings::default(),
        }
    }
}

impl PipelineSettings {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        Self {
            strip_code_fences: cfg.strip_code_fences,
            debug: DebugSettings {
                max_iters: cfg.max_debug_iters,
                log_tail_lines: cfg.log_tail_lines,
                patch_policy: cfg.patch_policy,
            },
        }
    }
}

/// Result of a pipeline run that reached the repair loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub plan: Plan,
    /// Relative paths of generated source and test files, in plan order.
    pub written: Vec<PathBuf>,
    pub debug: DebugOutcome,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.debug.stop.passed()
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            exit_codes::OK
        } else {
            exit_codes::TESTS_FAILED
        }
    }
}

/// The controller with its injected collaborators.
pub struct Pipeline<'a, G, R, I> {
    pub generator: &'a G,
    pub runner: &'a R,
    pub installer: &'a I,
    pub prompts: &'a PromptBook,
    pub paths: &'a OutputPaths,
    pub log: &'a RunLog,
    pub settings: PipelineSettings,
}

impl<G: Generator, R: TestRunner, I: DependencyInstaller> Pipeline<'_, G, R, I> {
    /// Run every stage in order.
    ///
    /// `Ok` means the repair loop was reached; whether tests passed is in the
    /// outcome. `Err` is a fatal stage failure.
    pub fn run(&self) -> Result<RunOutcome> {
        self.enter(Stage::Init);
        self.init();

        self.enter(Stage::Plan);
        let plan = self.plan().context("plan stage")?;

        self.enter(Stage::GenerateFiles);
        let written = self
            .generate_files(&plan)
            .context("generate-files stage")?;

        self.enter(Stage::Finalize);
        self.finalize(&written).context("finalize stage")?;

        self.enter(Stage::DebugLoop);
        let debug = self.debug_loop().run().context("debug-loop stage")?;

        let outcome = RunOutcome {
            plan,
            written,
            debug,
        };
        self.summarize(&outcome);
        Ok(outcome)
    }

    fn enter(&self, stage: Stage) {
        debug!(%stage, "entering stage");
        self.log.info(format!("== stage: {stage} =="));
    }

    /// Advisory health probe; never blocks progression.
    pub fn init(&self) {
        self.log.info(format!(
            "Output root: {}",
            self.paths.root.display()
        ));
        match self.generator.health() {
            Ok(report) => self.log.info(format!("Backend health: {}", report.summary())),
            Err(err) => self
                .log
                .warn(format!("Could not reach backend /health: {err:#}")),
        }
    }

    /// Ask the manager for a plan, parse it and persist it as `plan.json`.
    pub fn plan(&self) -> Result<Plan> {
        let _span = info_span!("plan").entered();
        let prompt = self.prompts.manager()?;
        let reply = self
            .generator
            .generate(&prompt)
            .context("manager generation failed")?;
        let value =
            extract_json(&reply).ok_or_else(|| anyhow!("no JSON value found in manager output"))?;
        let plan = parse_plan(&value)?;

        let mut serialized = serde_json::to_string_pretty(&plan).context("serialize plan")?;
        serialized.push('\n');
        write_text(&self.paths.plan_path, &serialized)?;

        self.log.info(format!(
            "Generated plan: {} file(s), {} test(s).",
            plan.files.len(),
            plan.tests.len()
        ));
        if plan.files.is_empty() && plan.tests.is_empty() {
            self.log.warn("Plan lists no files or tests.");
        }
        if !plan.notes.is_empty() {
            self.log.info(format!("Plan notes: {}", plan.notes));
        }
        Ok(plan)
    }

    /// Generate every planned source and test file, writing each immediately.
    pub fn generate_files(&self, plan: &Plan) -> Result<Vec<PathBuf>> {
        let mut written = Vec::with_capacity(plan.files.len() + plan.tests.len());
        for file in &plan.files {
            let prompt = self.prompts.developer(plan, file)?;
            written.push(self.materialize(file, &prompt)?);
        }
        for test in &plan.tests {
            let prompt = self.prompts.tester(test)?;
            written.push(self.materialize(test, &prompt)?);
        }
        self.log.info("Generated code and tests.");
        Ok(written)
    }

    fn materialize(&self, descriptor: &FileSpec, prompt: &str) -> Result<PathBuf> {
        let relative = sanitize_relative(&descriptor.path)
            .with_context(|| format!("plan path {:?}", descriptor.path))?;
        let _span = info_span!("materialize", path = %relative.display()).entered();
        let reply = self
            .generator
            .generate(prompt)
            .with_context(|| format!("generation failed for {}", relative.display()))?;
        let content = if self.settings.strip_code_fences {
            strip_code_fence(&reply).to_string()
        } else {
            reply
        };
        let target = write_artifact(
            self.paths,
            &GeneratedArtifact {
                path: relative.clone(),
                content,
            },
        )?;
        self.log.info(format!("WROTE {}", target.display()));
        Ok(relative)
    }

    /// Ask the finalizer for README and requirements text and write both.
    pub fn finalize(&self, written: &[PathBuf]) -> Result<()> {
        let files: Vec<String> = written
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        let prompt = self.prompts.finalizer(&self.paths.code_dir, &files)?;
        let reply = self
            .generator
            .generate(&prompt)
            .context("finalizer generation failed")?;
        let object = extract_object(&reply)
            .ok_or_else(|| anyhow!("finalizer output is not a JSON object"))?;

        for (key, path) in [
            ("readme", &self.paths.readme_path),
            ("requirements", &self.paths.requirements_path),
        ] {
            let text = match object.get(key) {
                Some(Value::String(text)) => text.as_str(),
                _ => {
                    self.log
                        .warn(format!("Finalizer output has no '{key}' text; writing empty file."));
                    ""
                }
            };
            write_text(path, text)?;
        }
        self.log.info("Finalized README.md and requirements.txt");
        Ok(())
    }

    fn debug_loop(&self) -> DebugLoop<'_, G, R, I> {
        DebugLoop {
            generator: self.generator,
            runner: self.runner,
            installer: self.installer,
            prompts: self.prompts,
            paths: self.paths,
            log: self.log,
            settings: self.settings.debug,
        }
    }

    fn summarize(&self, outcome: &RunOutcome) {
        self.log
            .info(format!("Repair loop stopped: {}.", outcome.debug.stop.describe()));
        if outcome.succeeded() {
            self.enter(Stage::Done);
            self.log
                .info(format!("DONE: output in {}", self.paths.code_dir.display()));
        } else {
            self.enter(Stage::Failed);
            self.log
                .info(format!("FAILED: see {}", self.log.path().display()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_loop::DebugStop;
    use crate::io::prompt::Guidance;
    use crate::io::run_log::is_warning;
    use crate::test_support::{RecordingInstaller, ScriptedGenerator, ScriptedTestRunner};
    use std::fs;

    const PLAN: &str = r#"Here is the plan:
```json
{"architecture": ["app.py: entrypoint"],
 "files": [{"path": "app.py", "purpose": "entrypoint"}],
 "tests": [{"path": "tests/test_app.py", "purpose": "entrypoint tests"}],
 "notes": "small"}
```"#;
    const FINAL: &str = r##"{"readme": "# App\n", "requirements": "pytest==8.3.3\n"}"##;

    struct Fixture {
        _temp: tempfile::TempDir,
        paths: OutputPaths,
        log: RunLog,
        prompts: PromptBook,
    }

    fn fixture() -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = OutputPaths::new(temp.path().join("output"));
        paths.ensure_dirs().expect("dirs");
        let log = RunLog::create(&paths.log_path)
            .expect("log")
            .with_echo(false);
        let prompts = PromptBook::new(Guidance::default(), "pytest").expect("prompts");
        Fixture {
            _temp: temp,
            paths,
            log,
            prompts,
        }
    }

    fn pipeline<'a>(
        fx: &'a Fixture,
        generator: &'a ScriptedGenerator,
        runner: &'a ScriptedTestRunner,
        installer: &'a RecordingInstaller,
    ) -> Pipeline<'a, ScriptedGenerator, ScriptedTestRunner, RecordingInstaller> {
        Pipeline {
            generator,
            runner,
            installer,
            prompts: &fx.prompts,
            paths: &fx.paths,
            log: &fx.log,
            settings: PipelineSettings::default(),
        }
    }

    fn log_text(fx: &Fixture) -> String {
        fs::read_to_string(&fx.paths.log_path).expect("read log")
    }

    #[test]
    fn full_run_writes_plan_files_and_metadata() {
        let fx = fixture();
        let generator = ScriptedGenerator::new([
            Some(PLAN),
            Some("```python\nprint('hi')\n```"),
            Some("def test_app():\n    assert True\n"),
            Some(FINAL),
        ]);
        let runner = ScriptedTestRunner::always(true);
        let installer = RecordingInstaller::default();

        let outcome = pipeline(&fx, &generator, &runner, &installer)
            .run()
            .expect("run");

        assert_eq!(outcome.exit_code(), exit_codes::OK);
        assert_eq!(
            outcome.written,
            vec![PathBuf::from("app.py"), PathBuf::from("tests/test_app.py")]
        );
        assert_eq!(
            fs::read_to_string(fx.paths.code_dir.join("app.py")).expect("read"),
            "print('hi')\n"
        );
        assert_eq!(
            fs::read_to_string(&fx.paths.readme_path).expect("readme"),
            "# App\n"
        );
        let persisted: Plan =
            serde_json::from_str(&fs::read_to_string(&fx.paths.plan_path).expect("plan"))
                .expect("parse plan");
        assert_eq!(persisted, outcome.plan);
        assert_eq!(installer.requested(), vec![fx.paths.requirements_path.clone()]);
        assert!(log_text(&fx).contains("DONE: output in"));
    }

    #[test]
    fn developer_and_tester_prompts_are_used_per_descriptor() {
        let fx = fixture();
        let generator = ScriptedGenerator::new([
            Some(PLAN),
            Some("x = 1"),
            Some("def test_x(): pass"),
            Some(FINAL),
        ]);
        let runner = ScriptedTestRunner::always(true);
        let installer = RecordingInstaller::default();

        pipeline(&fx, &generator, &runner, &installer)
            .run()
            .expect("run");

        assert_eq!(generator.prompts_for("You are the MANAGER"), 1);
        assert_eq!(generator.prompts_for("You are a SENIOR DEVELOPER"), 1);
        assert_eq!(generator.prompts_for("You are a TEST ENGINEER"), 1);
        assert_eq!(generator.prompts_for("You are the FINALIZER"), 1);
        assert_eq!(generator.prompts_for("You are a DEBUGGER"), 0);
    }

    #[test]
    fn unreachable_health_probe_does_not_block() {
        let fx = fixture();
        let generator = ScriptedGenerator::new([
            Some(PLAN),
            Some("x = 1"),
            Some("def test_x(): pass"),
            Some(FINAL),
        ])
        .unhealthy();
        let runner = ScriptedTestRunner::always(true);
        let installer = RecordingInstaller::default();

        let outcome = pipeline(&fx, &generator, &runner, &installer)
            .run()
            .expect("run");
        assert!(outcome.succeeded());
        assert!(log_text(&fx).contains("Could not reach backend /health"));
    }

    #[test]
    fn plan_without_json_is_fatal() {
        let fx = fixture();
        let generator = ScriptedGenerator::new([Some("I would rather not.")]);
        let runner = ScriptedTestRunner::always(true);
        let installer = RecordingInstaller::default();

        let err = pipeline(&fx, &generator, &runner, &installer)
            .run()
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("plan stage"));
        assert!(message.contains("no JSON value found"));
        assert_eq!(runner.runs(), 0);
    }

    #[test]
    fn plan_failing_schema_is_fatal() {
        let fx = fixture();
        let generator = ScriptedGenerator::new([Some(r#"{"files": [{"path": "a.py"}]}"#)]);
        let runner = ScriptedTestRunner::always(true);
        let installer = RecordingInstaller::default();

        let err = pipeline(&fx, &generator, &runner, &installer)
            .run()
            .unwrap_err();
        assert!(format!("{err:#}").contains("plan schema validation failed"));
        assert!(!fx.paths.plan_path.exists());
    }

    #[test]
    fn empty_file_generation_is_fatal_and_keeps_earlier_files() {
        let plan = r#"{"files": [
            {"path": "a.py", "purpose": "first"},
            {"path": "b.py", "purpose": "second"}
        ]}"#;
        let fx = fixture();
        let generator = ScriptedGenerator::new([Some(plan), Some("a = 1"), None]);
        let runner = ScriptedTestRunner::always(true);
        let installer = RecordingInstaller::default();

        let err = pipeline(&fx, &generator, &runner, &installer)
            .run()
            .unwrap_err();
        let message = format!("{err:#}");
        assert!(message.contains("generate-files stage"));
        assert!(message.contains("generation failed for b.py"));
        assert!(fx.paths.code_dir.join("a.py").is_file());
        assert!(!fx.paths.code_dir.join("b.py").exists());
    }

    #[test]
    fn non_object_finalizer_output_is_fatal() {
        let fx = fixture();
        let generator = ScriptedGenerator::new([
            Some(PLAN),
            Some("x = 1"),
            Some("def test_x(): pass"),
            Some(r#"["README", "requirements"]"#),
        ]);
        let runner = ScriptedTestRunner::always(true);
        let installer = RecordingInstaller::default();

        let err = pipeline(&fx, &generator, &runner, &installer)
            .run()
            .unwrap_err();
        assert!(format!("{err:#}").contains("finalizer output is not a JSON object"));
        assert_eq!(runner.runs(), 0);
    }

    #[test]
    fn finalizer_missing_field_writes_empty_file_with_warning() {
        let fx = fixture();
        let generator = ScriptedGenerator::new([
            Some(PLAN),
            Some("x = 1"),
            Some("def test_x(): pass"),
            Some(r##"{"readme": "# App"}"##),
        ]);
        let runner = ScriptedTestRunner::always(true);
        let installer = RecordingInstaller::default();

        pipeline(&fx, &generator, &runner, &installer)
            .run()
            .expect("run");
        assert_eq!(
            fs::read_to_string(&fx.paths.requirements_path).expect("requirements"),
            ""
        );
        let warnings: Vec<String> = fx
            .log
            .tail(200)
            .expect("tail")
            .into_iter()
            .filter(|line| is_warning(line))
            .collect();
        assert!(warnings.iter().any(|line| line.contains("'requirements'")));
    }

    #[test]
    fn failing_tests_map_to_tests_failed_exit_code() {
        let fx = fixture();
        let generator = ScriptedGenerator::new([
            Some(PLAN),
            Some("x = 1"),
            Some("def test_x(): assert False"),
            Some(FINAL),
            Some("[]"),
        ]);
        let runner = ScriptedTestRunner::always(false);
        let installer = RecordingInstaller::default();

        let outcome = pipeline(&fx, &generator, &runner, &installer)
            .run()
            .expect("run");
        assert_eq!(outcome.debug.stop, DebugStop::NoProgress { iteration: 1 });
        assert_eq!(outcome.exit_code(), exit_codes::TESTS_FAILED);
        let failed = log_text(&fx)
            .lines()
            .find(|line| line.contains("FAILED: see"))
            .map(str::to_string)
            .expect("FAILED line");
        assert!(!is_warning(&failed), "{failed}");
    }
}
