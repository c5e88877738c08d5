//! Pipeline configuration loaded from `codepori.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::patch::PatchPolicy;

/// Default config file name, looked up in the project directory.
pub const CONFIG_FILE_NAME: &str = "codepori.toml";
/// Environment variable that overrides `backend.base_url`.
pub const BASE_URL_ENV: &str = "GEMINI_PROXY_BASE";

/// Pipeline configuration (TOML).
///
/// Missing fields fall back to defaults; the whole file is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum debug-repair iterations before giving up.
    pub max_debug_iters: u32,

    /// Run log lines embedded in each debugger prompt.
    pub log_tail_lines: usize,

    /// Output root, relative to the project directory unless absolute.
    pub output_dir: PathBuf,

    /// Directory holding the guidance texts, relative to the project directory unless absolute.
    pub prompts_dir: PathBuf,

    /// Unwrap generated files that arrive wrapped in a single markdown fence.
    pub strip_code_fences: bool,

    pub patch_policy: PatchPolicy,

    pub backend: BackendConfig,

    pub tests: TestsConfig,

    pub install: InstallConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub primary_model: String,
    pub fallback_model: String,
    /// Per-call timeout for generation requests.
    pub timeout_secs: u64,
    pub health_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TestsConfig {
    /// Command run inside the code directory; exit code 0 means pass.
    pub command: Vec<String>,
    /// Test framework named in tester prompts.
    pub framework: String,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct InstallConfig {
    pub enabled: bool,
    /// Install command; the requirements file path is appended as the last argument.
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            primary_model: "models/gemini-2.5-pro".to_string(),
            fallback_model: "models/gemini-2.5-flash".to_string(),
            timeout_secs: 180,
            health_timeout_secs: 10,
        }
    }
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "python3".to_string(),
                "-m".to_string(),
                "pytest".to_string(),
                "-q".to_string(),
            ],
            framework: "pytest".to_string(),
            timeout_secs: 30 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: vec![
                "python3".to_string(),
                "-m".to_string(),
                "pip".to_string(),
                "install".to_string(),
                "-r".to_string(),
            ],
            timeout_secs: 15 * 60,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_debug_iters: 3,
            log_tail_lines: 400,
            output_dir: PathBuf::from("output"),
            prompts_dir: PathBuf::from("."),
            strip_code_fences: true,
            patch_policy: PatchPolicy::Lenient,
            backend: BackendConfig::default(),
            tests: TestsConfig::default(),
            install: InstallConfig::default(),
        }
    }
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.backend.base_url.trim().is_empty() {
            return Err(anyhow!("backend.base_url must not be empty"));
        }
        if self.backend.primary_model.trim().is_empty() {
            return Err(anyhow!("backend.primary_model must not be empty"));
        }
        if self.backend.fallback_model.trim().is_empty() {
            return Err(anyhow!("backend.fallback_model must not be empty"));
        }
        if self.backend.timeout_secs == 0 {
            return Err(anyhow!("backend.timeout_secs must be > 0"));
        }
        if self.backend.health_timeout_secs == 0 {
            return Err(anyhow!("backend.health_timeout_secs must be > 0"));
        }
        if self.max_debug_iters == 0 {
            return Err(anyhow!("max_debug_iters must be > 0"));
        }
        if self.tests.timeout_secs == 0 {
            return Err(anyhow!("tests.timeout_secs must be > 0"));
        }
        if self.tests.output_limit_bytes == 0 {
            return Err(anyhow!("tests.output_limit_bytes must be > 0"));
        }
        if self.tests.command.is_empty() || self.tests.command[0].trim().is_empty() {
            return Err(anyhow!("tests.command must be a non-empty array"));
        }
        if self.install.enabled
            && (self.install.command.is_empty() || self.install.command[0].trim().is_empty())
        {
            return Err(anyhow!("install.command must be a non-empty array"));
        }
        if self.install.timeout_secs == 0 {
            return Err(anyhow!("install.timeout_secs must be > 0"));
        }
        Ok(())
    }

    /// Apply the base address from the environment, if one was set.
    pub fn apply_env_base_url(&mut self, env_value: Option<String>) {
        if let Some(url) = env_value.map(|v| v.trim().to_string())
            && !url.is_empty()
        {
            self.backend.base_url = url;
        }
    }

    /// Resolve `output_dir` against the project directory.
    pub fn output_root(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.output_dir)
    }

    /// Resolve `prompts_dir` against the project directory.
    pub fn prompts_root(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.prompts_dir)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `PipelineConfig::default()`.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Write config to disk as pretty TOML.
pub fn write_config(path: &Path, cfg: &PipelineConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, buf).with_context(|| format!("write config {}", path.display()))
}
