//! Generation backend client with primary/fallback model selection.
//!
//! The [`Generator`] trait decouples pipeline stages from the HTTP backend.
//! Tests use scripted generators (or a scripted [`Transport`]) that return
//! predetermined replies without touching the network.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::core::text::truncate_chars;
use crate::io::config::BackendConfig;
use crate::io::run_log::RunLog;

/// Characters of an error response body kept in log lines.
const ERROR_BODY_CHARS: usize = 200;

/// Raw HTTP reply: status code plus body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Abstraction over the HTTP layer so retry logic can be tested offline.
pub trait Transport {
    fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<HttpReply>;
    fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<HttpReply> {
        (**self).post_json(url, body, timeout)
    }

    fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply> {
        (**self).get(url, timeout)
    }
}

/// Blocking `reqwest` transport.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("build http client")?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn post_json(&self, url: &str, body: &Value, timeout: Duration) -> Result<HttpReply> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(body)
            .send()
            .with_context(|| format!("POST {url}"))?;
        let status = response.status().as_u16();
        let body = response.text().context("read response body")?;
        Ok(HttpReply { status, body })
    }

    fn get(&self, url: &str, timeout: Duration) -> Result<HttpReply> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .with_context(|| format!("GET {url}"))?;
        let status = response.status().as_u16();
        let body = response.text().context("read response body")?;
        Ok(HttpReply { status, body })
    }
}

/// Advisory status reported by the backend's `/health` endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub status: Option<String>,
    pub valid_keys: Option<Value>,
    pub cooldown_keys: Option<Value>,
    pub exhausted_keys_per_model: Option<Value>,
}

impl HealthReport {
    fn from_body(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body).context("parse health response")?;
        Ok(Self {
            status: value
                .get("status")
                .and_then(Value::as_str)
                .map(str::to_string),
            valid_keys: value.get("valid_keys").cloned(),
            cooldown_keys: value.get("cooldown_keys").cloned(),
            exhausted_keys_per_model: value.get("exhausted_keys_per_model").cloned(),
        })
    }

    /// One-line rendering for the run log.
    pub fn summary(&self) -> String {
        fn show(value: &Option<Value>) -> String {
            value
                .as_ref()
                .map_or_else(|| "none".to_string(), Value::to_string)
        }
        format!(
            "status={} valid_keys={} cooldown={} exhausted={}",
            self.status.as_deref().unwrap_or("none"),
            show(&self.valid_keys),
            show(&self.cooldown_keys),
            show(&self.exhausted_keys_per_model),
        )
    }
}

/// Why a single model attempt produced no usable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptFailure {
    /// The request never produced a response (connect error, timeout).
    Transport { model: String, error: String },
    /// The backend answered with a non-success status.
    Status {
        model: String,
        status: u16,
        body: String,
    },
    /// The backend answered successfully but no text could be extracted.
    Empty { model: String },
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptFailure::Transport { model, error } => {
                write!(f, "{model}: request failed: {error}")
            }
            AttemptFailure::Status {
                model,
                status,
                body,
            } => write!(f, "{model}: HTTP {status} - {body}"),
            AttemptFailure::Empty { model } => write!(f, "{model}: empty response text"),
        }
    }
}

/// Definitive failure: every model attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationFailure {
    pub attempts: Vec<AttemptFailure>,
}

impl fmt::Display for GenerationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let attempts: Vec<String> = self.attempts.iter().map(ToString::to_string).collect();
        write!(f, "no model produced text ({})", attempts.join("; "))
    }
}

impl std::error::Error for GenerationFailure {}

/// Text generation capability used by every pipeline stage.
pub trait Generator {
    /// Return non-empty text for `prompt`, or a definitive failure.
    fn generate(&self, prompt: &str) -> Result<String, GenerationFailure>;

    /// Query backend health (advisory only).
    fn health(&self) -> Result<HealthReport>;
}

/// Which model slot an attempt uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    Primary,
    Fallback,
}

impl Attempt {
    fn next(self) -> Option<Attempt> {
        match self {
            Attempt::Primary => Some(Attempt::Fallback),
            Attempt::Fallback => None,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Attempt::Primary => "Primary",
            Attempt::Fallback => "Fallback",
        }
    }
}

/// Client for `POST {base}/v1beta/models/{model}:generateContent`.
pub struct GenerationClient<'a, T: Transport> {
    transport: T,
    backend: BackendConfig,
    log: &'a RunLog,
}

impl<'a, T: Transport> GenerationClient<'a, T> {
    pub fn new(transport: T, backend: BackendConfig, log: &'a RunLog) -> Self {
        Self {
            transport,
            backend,
            log,
        }
    }

    fn base(&self) -> &str {
        self.backend.base_url.trim_end_matches('/')
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base())
    }

    fn model(&self, attempt: Attempt) -> &str {
        match attempt {
            Attempt::Primary => &self.backend.primary_model,
            Attempt::Fallback => &self.backend.fallback_model,
        }
    }

    #[instrument(skip_all, fields(model = %model))]
    fn try_model(&self, model: &str, payload: &Value) -> Result<String, AttemptFailure> {
        let reply = self
            .transport
            .post_json(&self.endpoint(model), payload, self.backend.timeout())
            .map_err(|err| AttemptFailure::Transport {
                model: model.to_string(),
                error: format!("{err:#}"),
            })?;
        if !reply.is_success() {
            return Err(AttemptFailure::Status {
                model: model.to_string(),
                status: reply.status,
                body: truncate_chars(&reply.body, ERROR_BODY_CHARS).to_string(),
            });
        }
        let text = serde_json::from_str::<Value>(&reply.body)
            .map(|value| extract_candidate_text(&value))
            .unwrap_or_default();
        if text.is_empty() {
            return Err(AttemptFailure::Empty {
                model: model.to_string(),
            });
        }
        debug!(chars = text.len(), "model produced text");
        Ok(text)
    }
}

impl<T: Transport> Generator for GenerationClient<'_, T> {
    fn generate(&self, prompt: &str) -> Result<String, GenerationFailure> {
        let payload = request_payload(prompt);
        let mut failures = Vec::new();
        let mut next = Some(Attempt::Primary);

        while let Some(attempt) = next {
            match self.try_model(self.model(attempt), &payload) {
                Ok(text) => {
                    if attempt == Attempt::Fallback {
                        self.log.info(format!(
                            "Used fallback model {} successfully.",
                            self.model(attempt)
                        ));
                    }
                    return Ok(text);
                }
                Err(failure) => {
                    let follow_up = match attempt.next() {
                        Some(_) => "; trying fallback model.",
                        None => ".",
                    };
                    self.log
                        .warn(format!("{} model failed: {failure}{follow_up}", attempt.label()));
                    failures.push(failure);
                }
            }
            next = attempt.next();
        }

        Err(GenerationFailure { attempts: failures })
    }

    fn health(&self) -> Result<HealthReport> {
        probe_health(&self.transport, &self.backend)
    }
}

/// `GET {base}/health`; anything but HTTP 200 with a JSON body is an error.
pub fn probe_health<T: Transport>(transport: &T, backend: &BackendConfig) -> Result<HealthReport> {
    let url = format!("{}/health", backend.base_url.trim_end_matches('/'));
    let reply = transport
        .get(&url, backend.health_timeout())
        .context("reach backend /health")?;
    if reply.status != 200 {
        return Err(anyhow!("/health HTTP {}", reply.status));
    }
    HealthReport::from_body(&reply.body)
}

/// Single user-role message carrying the whole prompt.
pub fn request_payload(prompt: &str) -> Value {
    json!({
        "contents": [
            {"role": "user", "parts": [{"text": prompt}]}
        ]
    })
}

/// Join the text parts of the first candidate.
///
/// Parts without a string `text` field are skipped; any unexpected shape yields
/// an empty string.
pub fn extract_candidate_text(response: &Value) -> String {
    let parts = response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array);
    let Some(parts) = parts else {
        return String::new();
    };
    parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}
