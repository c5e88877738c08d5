//! Output tree layout and artifact writes.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::core::types::GeneratedArtifact;

pub const README_FILE: &str = "README.md";
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// All canonical paths within the output root.
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub root: PathBuf,
    pub code_dir: PathBuf,
    pub log_path: PathBuf,
    pub plan_path: PathBuf,
    pub readme_path: PathBuf,
    pub requirements_path: PathBuf,
}

impl OutputPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let code_dir = root.join("code");
        Self {
            root: root.clone(),
            code_dir: code_dir.clone(),
            log_path: root.join("run.log"),
            plan_path: root.join("plan.json"),
            readme_path: code_dir.join(README_FILE),
            requirements_path: code_dir.join(REQUIREMENTS_FILE),
        }
    }

    /// Create the output root and code directory.
    pub fn ensure_dirs(&self) -> Result<()> {
        create_dir(&self.root)?;
        create_dir(&self.code_dir)
    }

    /// Absolute location of a sanitized relative path under the code directory.
    pub fn code_path(&self, relative: &Path) -> PathBuf {
        self.code_dir.join(relative)
    }
}

/// Write `artifact` under the code directory, creating parent directories.
pub fn write_artifact(paths: &OutputPaths, artifact: &GeneratedArtifact) -> Result<PathBuf> {
    let target = paths.code_path(&artifact.path);
    write_text(&target, &artifact.content)?;
    Ok(target)
}

/// Write text to `path`, creating parent directories.
pub fn write_text(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}
