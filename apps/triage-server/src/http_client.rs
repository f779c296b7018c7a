use std::time::Duration;

use crate::DiagnosticsError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);
const POOL_IDLE: Duration = Duration::from_secs(90);

fn user_agent() -> String {
    format!("triage/{}", env!("CARGO_PKG_VERSION"))
}

/// Base client builder with shared defaults. Apply the request timeout per client.
pub fn builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .user_agent(user_agent())
        .connect_timeout(CONNECT_TIMEOUT)
        .tcp_keepalive(TCP_KEEPALIVE)
        .pool_idle_timeout(POOL_IDLE)
}

/// Build a client whose every request is bounded by `timeout`.
pub fn client_with_timeout(timeout: Duration) -> Result<reqwest::Client, DiagnosticsError> {
    builder()
        .timeout(timeout)
        .build()
        .map_err(DiagnosticsError::ClientBuild)
}
