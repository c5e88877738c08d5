//! Append-only run log written to `output/run.log`.
//!
//! # Separation of Concerns
//!
//! - **Run log (this module)**: product artifact. Every pipeline event is one
//!   timestamped line, and the tail of the log is fed back into debugger prompts.
//!   Always written, unaffected by `RUST_LOG`.
//!
//! - **Tracing (`logging`)**: developer diagnostics on stderr via `RUST_LOG`.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;

const WARN_MARKER: &str = "WARN ";

/// Timestamped line log with a single owner for the duration of a run.
///
/// Created (and truncated) once at run start; every write is flushed before
/// returning so a crash never loses an acknowledged line.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
    file: File,
    echo: bool,
}

impl RunLog {
    /// Create or truncate the log at `path`, echoing lines to stdout.
    ///
    /// Echo failures (e.g. a closed pipe) are ignored.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create log dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("open run log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            echo: true,
        })
    }

    /// Toggle echoing lines to stdout (tests keep the log quiet).
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record an informational line.
    pub fn info(&self, message: impl AsRef<str>) {
        self.write_line(message.as_ref());
    }

    /// Record a warning line.
    pub fn warn(&self, message: impl AsRef<str>) {
        self.write_line(&format!("{WARN_MARKER}{}", message.as_ref()));
    }

    /// Append captured child process output, one log line per output line.
    pub fn output_block(&self, label: &str, output: &str) {
        for line in output.lines() {
            self.write_line(&format!("{label}| {line}"));
        }
    }

    /// Return the last `n` lines of the log.
    pub fn tail(&self, n: usize) -> Result<Vec<String>> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read run log {}", self.path.display()))?;
        let lines: Vec<&str> = contents.lines().collect();
        let start = lines.len().saturating_sub(n);
        Ok(lines[start..].iter().map(|line| line.to_string()).collect())
    }

    fn write_line(&self, message: &str) {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{stamp}] {message}");
        if self.echo {
            let _ = writeln!(std::io::stdout().lock(), "{line}");
        }
        let mut file = &self.file;
        if let Err(err) = writeln!(file, "{line}").and_then(|()| file.flush()) {
            warn!(err = %err, path = %self.path.display(), "failed to write run log");
        }
    }
}

/// Whether a log line was written with [`RunLog::warn`].
pub fn is_warning(line: &str) -> bool {
    line.split_once("] ")
        .is_some_and(|(_, rest)| rest.starts_with(WARN_MARKER))
}
