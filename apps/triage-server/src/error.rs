/// Failures inside the diagnostics layer. None of these ever reach the host
/// application: the interceptor falls back to the original response and the
/// analysis client folds them into an [`crate::AnalysisResult`].
#[derive(Debug, thiserror::Error)]
pub enum DiagnosticsError {
    #[error("No API key configured")]
    MissingApiKey,
    #[error("build http client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("provider returned {status}: {body}")]
    Provider { status: u16, body: String },
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("read response body: {0}")]
    Body(#[source] axum::Error),
    #[error("serialize diagnostic record: {0}")]
    Serialize(#[from] serde_json::Error),
}
