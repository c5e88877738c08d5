//! Command entry points wiring real collaborators from configuration.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error};

use crate::core::extract::extract_json;
use crate::exit_codes;
use crate::io::artifacts::OutputPaths;
use crate::io::client::{GenerationClient, HttpTransport, probe_health};
use crate::io::config::{BASE_URL_ENV, CONFIG_FILE_NAME, PipelineConfig, load_config, write_config};
use crate::io::prompt::{Guidance, PromptBook};
use crate::io::run_log::RunLog;
use crate::io::test_runner::{CommandInstaller, CommandTestRunner, DependencyInstaller, SkipInstall};
use crate::pipeline::{Pipeline, PipelineSettings, RunOutcome};

/// Command-line overrides layered over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub project_dir: PathBuf,
    pub config_path: Option<PathBuf>,
    pub base_url: Option<String>,
    pub max_iters: Option<u32>,
    pub output_dir: Option<PathBuf>,
}

impl RunOptions {
    fn config_path(&self) -> PathBuf {
        self.config_path
            .clone()
            .unwrap_or_else(|| self.project_dir.join(CONFIG_FILE_NAME))
    }
}

/// Resolve configuration: flags, then `GEMINI_PROXY_BASE`, then the file, then defaults.
pub fn resolve_config(opts: &RunOptions, env_base_url: Option<String>) -> Result<PipelineConfig> {
    let path = opts.config_path();
    let mut cfg = load_config(&path).with_context(|| format!("load config {}", path.display()))?;
    cfg.apply_env_base_url(env_base_url);
    if let Some(url) = &opts.base_url {
        cfg.backend.base_url = url.clone();
    }
    if let Some(max_iters) = opts.max_iters {
        cfg.max_debug_iters = max_iters;
    }
    if let Some(output_dir) = &opts.output_dir {
        cfg.output_dir = output_dir.clone();
    }
    cfg.validate()?;
    debug!(?cfg, "resolved config");
    Ok(cfg)
}

/// `codepori run`: the full pipeline. Returns the process exit code.
pub fn run_pipeline(opts: &RunOptions) -> i32 {
    let cfg = match resolve_config(opts, std::env::var(BASE_URL_ENV).ok()) {
        Ok(cfg) => cfg,
        Err(err) => return report_fatal(None, &err),
    };
    let paths = OutputPaths::new(cfg.output_root(&opts.project_dir));
    let log = match paths
        .ensure_dirs()
        .and_then(|()| RunLog::create(&paths.log_path))
    {
        Ok(log) => log,
        Err(err) => return report_fatal(None, &err),
    };

    match execute(&cfg, &opts.project_dir, &paths, &log) {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => report_fatal(Some(&log), &err),
    }
}

fn execute(
    cfg: &PipelineConfig,
    project_dir: &Path,
    paths: &OutputPaths,
    log: &RunLog,
) -> Result<RunOutcome> {
    log.info("Starting CodePori pipeline...");
    log.info(format!("Backend base: {}", cfg.backend.base_url));
    log.info(format!(
        "Primary model: {} | Fallback: {}",
        cfg.backend.primary_model, cfg.backend.fallback_model
    ));

    let guidance = Guidance::load(&cfg.prompts_root(project_dir))?;
    let prompts = PromptBook::new(guidance, cfg.tests.framework.clone())?;
    let client = GenerationClient::new(HttpTransport::new()?, cfg.backend.clone(), log);
    let runner = CommandTestRunner::new(&cfg.tests);
    let installer: Box<dyn DependencyInstaller> = if cfg.install.enabled {
        Box::new(CommandInstaller::new(
            &cfg.install,
            cfg.tests.output_limit_bytes,
        ))
    } else {
        Box::new(SkipInstall)
    };

    Pipeline {
        generator: &client,
        runner: &runner,
        installer: &installer,
        prompts: &prompts,
        paths,
        log,
        settings: PipelineSettings::from_config(cfg),
    }
    .run()
}

fn report_fatal(log: Option<&RunLog>, err: &anyhow::Error) -> i32 {
    error!(err = ?err, "fatal error");
    match log {
        Some(log) => {
            log.info(format!("FATAL: {err:#}"));
            log.info(format!("FAILED: see {}", log.path().display()));
        }
        None => eprintln!("FATAL: {err:#}"),
    }
    exit_codes::FATAL
}

/// Print a command result; a closed stdout is not an error.
fn emit(text: &str) {
    let _ = writeln!(std::io::stdout().lock(), "{text}");
}

/// `codepori health`: probe the backend and print its report.
pub fn run_health(opts: &RunOptions) -> i32 {
    let result = resolve_config(opts, std::env::var(BASE_URL_ENV).ok()).and_then(|cfg| {
        let transport = HttpTransport::new()?;
        probe_health(&transport, &cfg.backend)
    });
    match result {
        Ok(report) => {
            emit(&report.summary());
            exit_codes::OK
        }
        Err(err) => report_fatal(None, &err),
    }
}

/// `codepori extract`: recover a JSON value from a file (or stdin) and print it.
pub fn run_extract(input: Option<&Path>) -> i32 {
    match extract_from(input) {
        Ok(pretty) => {
            emit(&pretty);
            exit_codes::OK
        }
        Err(err) => report_fatal(None, &err),
    }
}

fn extract_from(input: Option<&Path>) -> Result<String> {
    let text = match input {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?
        }
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read stdin")?;
            buf
        }
    };
    let value = extract_json(&text).ok_or_else(|| anyhow!("no JSON value found in input"))?;
    serde_json::to_string_pretty(&value).context("serialize extracted value")
}

/// `codepori init`: write the default `codepori.toml` into the project directory.
pub fn run_init(project_dir: &Path, force: bool) -> i32 {
    let path = project_dir.join(CONFIG_FILE_NAME);
    if path.exists() && !force {
        eprintln!("{} already exists (use --force to overwrite)", path.display());
        return exit_codes::FATAL;
    }
    match write_config(&path, &PipelineConfig::default()) {
        Ok(()) => {
            emit(&format!("wrote {}", path.display()));
            exit_codes::OK
        }
        Err(err) => report_fatal(None, &err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(project_dir: &Path) -> RunOptions {
        RunOptions {
            project_dir: project_dir.to_path_buf(),
            ..RunOptions::default()
        }
    }

    #[test]
    fn defaults_apply_without_config_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = resolve_config(&options(temp.path()), None).expect("config");
        assert_eq!(cfg, PipelineConfig::default());
    }

    #[test]
    fn flag_beats_env_beats_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut file_cfg = PipelineConfig::default();
        file_cfg.backend.base_url = "http://from-file:1".to_string();
        file_cfg.max_debug_iters = 7;
        write_config(&temp.path().join(CONFIG_FILE_NAME), &file_cfg).expect("write");

        let cfg = resolve_config(&options(temp.path()), None).expect("file");
        assert_eq!(cfg.backend.base_url, "http://from-file:1");
        assert_eq!(cfg.max_debug_iters, 7);

        let cfg = resolve_config(&options(temp.path()), Some("http://from-env:2".to_string()))
            .expect("env");
        assert_eq!(cfg.backend.base_url, "http://from-env:2");

        let opts = RunOptions {
            base_url: Some("http://from-flag:3".to_string()),
            max_iters: Some(1),
            output_dir: Some(PathBuf::from("out")),
            ..options(temp.path())
        };
        let cfg = resolve_config(&opts, Some("http://from-env:2".to_string())).expect("flag");
        assert_eq!(cfg.backend.base_url, "http://from-flag:3");
        assert_eq!(cfg.max_debug_iters, 1);
        assert_eq!(cfg.output_root(temp.path()), temp.path().join("out"));
    }

    #[test]
    fn zero_iteration_override_is_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let opts = RunOptions {
            max_iters: Some(0),
            ..options(temp.path())
        };
        let err = resolve_config(&opts, None).unwrap_err();
        assert!(err.to_string().contains("max_debug_iters"));
    }

    #[test]
    fn explicit_config_path_is_used() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("custom.toml");
        fs::write(&path, "max_debug_iters = 5\n").expect("write");
        let opts = RunOptions {
            config_path: Some(path),
            ..options(temp.path())
        };
        assert_eq!(resolve_config(&opts, None).expect("config").max_debug_iters, 5);
    }

    #[test]
    fn extract_from_file_pretty_prints_value() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("reply.txt");
        fs::write(&path, "Sure:\n```json\n{\"a\": [1, 2]}\n```\n").expect("write");
        let pretty = extract_from(Some(&path)).expect("extract");
        assert_eq!(pretty, "{\n  \"a\": [\n    1,\n    2\n  ]\n}");
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert_eq!(run_init(temp.path(), false), exit_codes::OK);
        assert_eq!(run_init(temp.path(), false), exit_codes::FATAL);
        assert_eq!(run_init(temp.path(), true), exit_codes::OK);
        let cfg = load_config(&temp.path().join(CONFIG_FILE_NAME)).expect("load");
        assert_eq!(cfg, PipelineConfig::default());
    }
}
