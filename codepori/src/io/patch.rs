//! Apply debugger patches to the generated code tree.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::debug;

use crate::core::patch::{PatchPolicy, Precondition, check_precondition};
use crate::core::path::sanitize_relative;
use crate::core::types::PatchEntry;
use crate::io::artifacts::write_text;
use crate::io::run_log::RunLog;

/// What happened to each entry of a patch batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchReport {
    /// Relative paths whose `after` content was written.
    pub applied: Vec<PathBuf>,
    /// Relative paths whose `before` did not match the file on disk.
    pub mismatched: Vec<PathBuf>,
    /// Entries that were not written (malformed, rejected path, I/O error, strict mismatch).
    pub skipped: usize,
}

impl PatchReport {
    /// Whether at least one entry was written.
    pub fn applied_any(&self) -> bool {
        !self.applied.is_empty()
    }
}

/// Writes patch entries under a code root, one entry at a time.
pub struct PatchApplier<'a> {
    code_dir: &'a Path,
    policy: PatchPolicy,
    log: &'a RunLog,
}

impl<'a> PatchApplier<'a> {
    pub fn new(code_dir: &'a Path, policy: PatchPolicy, log: &'a RunLog) -> Self {
        Self {
            code_dir,
            policy,
            log,
        }
    }

    /// Apply raw JSON entries in order.
    ///
    /// A failing entry is logged and skipped; it never stops the remaining entries.
    pub fn apply(&self, entries: &[Value]) -> PatchReport {
        let mut report = PatchReport::default();
        for (idx, raw) in entries.iter().enumerate() {
            if let Err(err) = self.apply_one(raw, &mut report) {
                report.skipped += 1;
                self.log
                    .warn(format!("Failed to apply patch entry {idx}: {err:#}"));
            }
        }
        debug!(
            applied = report.applied.len(),
            mismatched = report.mismatched.len(),
            skipped = report.skipped,
            "patch batch finished"
        );
        report
    }

    fn apply_one(&self, raw: &Value, report: &mut PatchReport) -> Result<()> {
        let entry: PatchEntry =
            serde_json::from_value(raw.clone()).context("malformed patch entry")?;
        let relative = sanitize_relative(&entry.path)?;
        let target = self.code_dir.join(&relative);
        let current = read_or_empty(&target)?;

        let precondition = check_precondition(&entry.before, &current);
        if precondition == Precondition::Mismatch {
            report.mismatched.push(relative.clone());
            let action = if self.policy.allows(precondition) {
                "applying 'after' anyway"
            } else {
                "skipping (strict policy)"
            };
            self.log.warn(format!(
                "Patch warning for {}: 'before' does not match current; {action}.",
                relative.display()
            ));
        }
        if !self.policy.allows(precondition) {
            report.skipped += 1;
            return Ok(());
        }

        write_text(&target, &entry.after)?;
        self.log.info(format!(
            "Patched {}: {}",
            relative.display(),
            entry.explanation
        ));
        report.applied.push(relative);
        Ok(())
    }
}

/// Current file content, or empty text when the file does not exist yet.
fn read_or_empty(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(contents),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(_) if path.is_dir() => Err(anyhow!("{} is a directory", path.display())),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}
