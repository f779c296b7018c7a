use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use tracing::{info, warn};
use triage_core::Config;

use crate::{http_client, DiagnosticsError};

const ERROR_BODY_EXCERPT_CHARS: usize = 200;

/// Outcome of one analysis request, serialized for the widget as
/// `{success: true, response}` or `{success: false, error}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisResult {
    Success { response: String },
    Failure { error: String },
}

impl AnalysisResult {
    pub fn success(response: impl Into<String>) -> Self {
        AnalysisResult::Success {
            response: response.into(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        AnalysisResult::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResult::Success { .. })
    }
}

impl Serialize for AnalysisResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AnalysisResult", 2)?;
        match self {
            AnalysisResult::Success { response } => {
                state.serialize_field("success", &true)?;
                state.serialize_field("response", response)?;
            }
            AnalysisResult::Failure { error } => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}

/// Client for the provider's responses API. One outbound call per
/// [`AnalysisClient::analyze`]; no retries and no caching.
#[derive(Clone)]
pub struct AnalysisClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    endpoint: String,
    timeout_secs: u64,
}

impl AnalysisClient {
    pub fn from_config(cfg: &Config) -> Result<Self, DiagnosticsError> {
        Ok(Self {
            http: http_client::client_with_timeout(cfg.request_timeout())?,
            api_key: cfg.api_key().map(str::to_string),
            model: cfg.model.clone(),
            endpoint: format!("{}/v1/responses", cfg.api_base_url.trim_end_matches('/')),
            timeout_secs: cfg.request_timeout().as_secs(),
        })
    }

    pub async fn analyze(&self, prompt: &str) -> AnalysisResult {
        match self.request_text(prompt).await {
            Ok(text) => {
                info!(
                    target: "triage::analysis",
                    model = %self.model,
                    chars = text.len(),
                    "analysis completed"
                );
                AnalysisResult::success(text)
            }
            Err(err) => {
                warn!(target: "triage::analysis", model = %self.model, error = %err, "analysis failed");
                AnalysisResult::failure(err.to_string())
            }
        }
    }

    async fn request_text(&self, prompt: &str) -> Result<String, DiagnosticsError> {
        let key = self.api_key.as_deref().ok_or(DiagnosticsError::MissingApiKey)?;
        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(key)
            .json(&request_body(&self.model, prompt))
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;
        let status = resp.status();
        let bytes = resp.bytes().await.map_err(|err| self.transport_error(err))?;
        if !status.is_success() {
            return Err(DiagnosticsError::Provider {
                status: status.as_u16(),
                body: excerpt(&bytes),
            });
        }
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|err| DiagnosticsError::MalformedResponse(format!("invalid JSON: {err}")))?;
        match output_text(&value) {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            Some(_) => Err(DiagnosticsError::MalformedResponse(
                "empty output text".into(),
            )),
            None => Err(DiagnosticsError::MalformedResponse(
                "no output text in response".into(),
            )),
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> DiagnosticsError {
        if err.is_timeout() {
            DiagnosticsError::Timeout(self.timeout_secs)
        } else {
            DiagnosticsError::Transport(err)
        }
    }
}

/// Request shape for the responses API, tuned for short, cheap answers.
pub fn request_body(model: &str, prompt: &str) -> Value {
    json!({
        "model": model,
        "input": prompt,
        "text": {
            "format": { "type": "text" },
            "verbosity": "low"
        },
        "reasoning": { "effort": "low" }
    })
}

/// `output[1].content[0].text` is where reasoning models put the answer; when
/// the layout shifts, fall back to the first `output_text` part of any
/// message item, then to a top-level `output_text`.
fn output_text(value: &Value) -> Option<&str> {
    value
        .pointer("/output/1/content/0/text")
        .and_then(Value::as_str)
        .or_else(|| {
            value
                .get("output")?
                .as_array()?
                .iter()
                .filter(|item| item.get("type").and_then(Value::as_str) == Some("message"))
                .filter_map(|item| item.get("content").and_then(Value::as_array))
                .flatten()
                .find(|part| part.get("type").and_then(Value::as_str) == Some("output_text"))
                .and_then(|part| part.get("text"))
                .and_then(Value::as_str)
        })
        .or_else(|| value.get("output_text").and_then(Value::as_str))
}

fn excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    match trimmed.char_indices().nth(ERROR_BODY_EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
