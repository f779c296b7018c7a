use serde::{Deserialize, Serialize};

/// Frames beyond this many are dropped from every captured backtrace.
pub const MAX_BACKTRACE_FRAMES: usize = 10;

/// Normalized description of one error occurrence.
///
/// Serializes to the flat wire shape the widget posts back:
/// `{exception, backtrace, logs}` or `{status, path, logs}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DiagnosticRecord {
    Exception {
        #[serde(rename = "exception")]
        message: String,
        backtrace: Vec<String>,
        logs: String,
    },
    HttpStatus {
        status: u16,
        path: String,
        logs: String,
    },
}

impl DiagnosticRecord {
    pub fn exception<I>(message: impl Into<String>, frames: I, logs: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        DiagnosticRecord::Exception {
            message: message.into(),
            backtrace: frames.into_iter().take(MAX_BACKTRACE_FRAMES).collect(),
            logs: logs.into(),
        }
    }

    pub fn http_status(status: u16, path: impl Into<String>, logs: impl Into<String>) -> Self {
        DiagnosticRecord::HttpStatus {
            status,
            path: path.into(),
            logs: logs.into(),
        }
    }

    pub fn logs(&self) -> &str {
        match self {
            DiagnosticRecord::Exception { logs, .. } | DiagnosticRecord::HttpStatus { logs, .. } => {
                logs
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            DiagnosticRecord::Exception { .. } => "exception",
            DiagnosticRecord::HttpStatus { .. } => "http_status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordShapeError {
    #[error("request carries neither an exception nor a status")]
    MissingDiscriminant,
    #[error("status {0} is not a valid HTTP status code")]
    InvalidStatus(u16),
}

/// Body accepted by the analysis endpoint. All fields are optional on the
/// wire; [`AnalyzeRequest::into_record`] picks the variant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub exception: Option<String>,
    #[serde(default)]
    pub backtrace: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub logs: Option<String>,
}

impl AnalyzeRequest {
    /// A non-blank `exception` wins; otherwise `status` is required.
    pub fn into_record(self) -> Result<DiagnosticRecord, RecordShapeError> {
        let logs = self.logs.unwrap_or_default();
        match self.exception.filter(|e| !e.trim().is_empty()) {
            Some(message) => Ok(DiagnosticRecord::exception(
                message,
                self.backtrace.unwrap_or_default(),
                logs,
            )),
            None => {
                let status = self.status.ok_or(RecordShapeError::MissingDiscriminant)?;
                if !(100..=999).contains(&status) {
                    return Err(RecordShapeError::InvalidStatus(status));
                }
                let path = self
                    .path
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| "/".to_string());
                Ok(DiagnosticRecord::http_status(status, path, logs))
            }
        }
    }
}
