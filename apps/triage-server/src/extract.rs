use axum::http::StatusCode;
use tracing::warn;
use triage_core::{DiagnosticRecord, LogSampler};

use crate::CapturedException;

const UNKNOWN_MESSAGE: &str = "Unknown error";

/// What the interceptor knows about the request that produced an error.
#[derive(Debug, Clone, Default)]
pub struct RequestEnv {
    pub path: String,
    pub exception: Option<CapturedException>,
}

/// Build the record for one intercepted response. The log read runs on the
/// blocking pool; it cannot fail the extraction.
pub async fn extract(env: &RequestEnv, status: StatusCode, sampler: &LogSampler) -> DiagnosticRecord {
    let logs = sample_logs(sampler).await;
    build_record(env, status, logs)
}

pub(crate) async fn sample_logs(sampler: &LogSampler) -> String {
    let sampler = sampler.clone();
    match tokio::task::spawn_blocking(move || sampler.sample()).await {
        Ok(logs) => logs,
        Err(err) => {
            warn!(target: "triage::extract", error = %err, "log sampling task failed");
            format!("Error reading logs: {err}")
        }
    }
}

pub(crate) fn build_record(env: &RequestEnv, status: StatusCode, logs: String) -> DiagnosticRecord {
    match &env.exception {
        Some(exception) => {
            let message = if exception.message.trim().is_empty() {
                UNKNOWN_MESSAGE.to_string()
            } else {
                exception.message.clone()
            };
            DiagnosticRecord::exception(message, exception.backtrace.iter().cloned(), logs)
        }
        None => DiagnosticRecord::http_status(status.as_u16(), env.path.clone(), logs),
    }
}
