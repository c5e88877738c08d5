//! Test-only doubles for the backend, test command and installer seams.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use serde_json::{Value, json};

use crate::io::client::{
    AttemptFailure, GenerationFailure, Generator, HealthReport, HttpReply, Transport,
};
use crate::io::test_runner::{DependencyInstaller, TestRun, TestRunner};

/// One request observed by [`ScriptedTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct TransportCall {
    pub url: String,
    /// JSON body for POST requests, `None` for GET.
    pub body: Option<Value>,
}

/// Transport that replays scripted replies in order, for both POST and GET.
///
/// `Err` entries simulate connection failures. Running out of replies is an error.
pub struct ScriptedTransport {
    replies: RefCell<VecDeque<Result<HttpReply, String>>>,
    calls: RefCell<Vec<TransportCall>>,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Result<HttpReply, String>>) -> Self {
        Self {
            replies: RefCell::new(replies.into()),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.borrow().clone()
    }

    fn next_reply(&self, url: &str, body: Option<Value>) -> Result<HttpReply> {
        self.calls.borrow_mut().push(TransportCall {
            url: url.to_string(),
            body,
        });
        match self.replies.borrow_mut().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted transport has no reply for {url}")),
        }
    }
}

impl Transport for ScriptedTransport {
    fn post_json(&self, url: &str, body: &Value, _timeout: Duration) -> Result<HttpReply> {
        self.next_reply(url, Some(body.clone()))
    }

    fn get(&self, url: &str, _timeout: Duration) -> Result<HttpReply> {
        self.next_reply(url, None)
    }
}

/// A generateContent response body whose first candidate carries `parts`.
pub fn candidate_body(parts: &[&str]) -> String {
    let parts: Vec<Value> = parts.iter().map(|text| json!({ "text": text })).collect();
    json!({
        "candidates": [
            {"content": {"parts": parts}}
        ]
    })
    .to_string()
}

/// Generator that returns scripted texts and records every prompt.
///
/// `None` entries (and an exhausted script) produce a [`GenerationFailure`].
pub struct ScriptedGenerator {
    replies: RefCell<VecDeque<Option<String>>>,
    prompts: RefCell<Vec<String>>,
    healthy: bool,
}

impl ScriptedGenerator {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            replies: RefCell::new(replies.into_iter().map(|r| r.map(Into::into)).collect()),
            prompts: RefCell::new(Vec::new()),
            healthy: true,
        }
    }

    /// Make `health` fail, simulating an unreachable backend.
    pub fn unhealthy(mut self) -> Self {
        self.healthy = false;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    /// Number of prompts that start with `role_marker` (e.g. "You are a DEBUGGER").
    pub fn prompts_for(&self, role_marker: &str) -> usize {
        self.prompts
            .borrow()
            .iter()
            .filter(|prompt| prompt.starts_with(role_marker))
            .count()
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> Result<String, GenerationFailure> {
        self.prompts.borrow_mut().push(prompt.to_string());
        match self.replies.borrow_mut().pop_front() {
            Some(Some(text)) if !text.trim().is_empty() => Ok(text),
            _ => Err(GenerationFailure {
                attempts: vec![AttemptFailure::Empty {
                    model: "scripted".to_string(),
                }],
            }),
        }
    }

    fn health(&self) -> Result<HealthReport> {
        if !self.healthy {
            return Err(anyhow!("scripted backend unreachable"));
        }
        Ok(HealthReport {
            status: Some("ok".to_string()),
            valid_keys: Some(json!(1)),
            cooldown_keys: Some(json!(0)),
            exhausted_keys_per_model: Some(json!({})),
        })
    }
}

/// Test runner that returns scripted pass/fail results.
///
/// Once the script runs out the last result repeats.
pub struct ScriptedTestRunner {
    results: RefCell<VecDeque<bool>>,
    last: Cell<bool>,
    runs: Cell<u32>,
}

impl ScriptedTestRunner {
    pub fn new(results: Vec<bool>) -> Self {
        Self {
            results: RefCell::new(results.into()),
            last: Cell::new(false),
            runs: Cell::new(0),
        }
    }

    pub fn always(passed: bool) -> Self {
        let runner = Self::new(Vec::new());
        runner.last.set(passed);
        runner
    }

    pub fn runs(&self) -> u32 {
        self.runs.get()
    }
}

impl TestRunner for ScriptedTestRunner {
    fn run(&self, _workdir: &Path) -> Result<TestRun> {
        self.runs.set(self.runs.get() + 1);
        let passed = self
            .results
            .borrow_mut()
            .pop_front()
            .unwrap_or(self.last.get());
        self.last.set(passed);
        let (exit_code, output) = if passed {
            (0, "1 passed")
        } else {
            (1, "FAILED tests/test_app.py::test_main - AssertionError\n1 failed")
        };
        Ok(TestRun {
            passed,
            exit_code: Some(exit_code),
            output: output.to_string(),
        })
    }
}

/// Installer that records requested requirement files and optionally fails.
#[derive(Default)]
pub struct RecordingInstaller {
    requested: RefCell<Vec<PathBuf>>,
    fail: bool,
}

impl RecordingInstaller {
    pub fn failing() -> Self {
        Self {
            requested: RefCell::new(Vec::new()),
            fail: true,
        }
    }

    pub fn requested(&self) -> Vec<PathBuf> {
        self.requested.borrow().clone()
    }
}

impl DependencyInstaller for RecordingInstaller {
    fn install(&self, requirements: &Path, _workdir: &Path) -> Result<String> {
        self.requested.borrow_mut().push(requirements.to_path_buf());
        if self.fail {
            return Err(anyhow!("scripted install failure"));
        }
        Ok("installed".to_string())
    }
}
