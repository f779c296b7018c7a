use std::net::SocketAddr;

use triage_core::DeploymentMode;

#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpConfigError {
    #[error("invalid TRIAGE_PORT: {0}")]
    InvalidPort(String),
    #[error("invalid TRIAGE_BIND: {0}")]
    InvalidBind(String),
    #[error("TRIAGE_BIND={bind} is not loopback; refusing to expose development diagnostics")]
    PublicBind { bind: String },
}

pub(crate) fn http_addr_from_env(mode: DeploymentMode) -> Result<SocketAddr, HttpConfigError> {
    let bind = std::env::var("TRIAGE_BIND").unwrap_or_else(|_| "127.0.0.1".into());
    let port = std::env::var("TRIAGE_PORT").unwrap_or_else(|_| "3000".into());
    http_addr(&bind, &port, mode)
}

fn http_addr(bind: &str, port_raw: &str, mode: DeploymentMode) -> Result<SocketAddr, HttpConfigError> {
    let port: u16 = port_raw
        .trim()
        .parse()
        .map_err(|_| HttpConfigError::InvalidPort(port_raw.to_string()))?;
    let bind = bind.trim();
    if mode.is_development() && !is_loopback(bind) {
        return Err(HttpConfigError::PublicBind {
            bind: bind.to_string(),
        });
    }
    let host = match bind {
        "localhost" => "127.0.0.1",
        "::1" => "[::1]",
        other => other,
    };
    format!("{host}:{port}")
        .parse()
        .map_err(|_| HttpConfigError::InvalidBind(bind.to_string()))
}

fn is_loopback(bind: &str) -> bool {
    matches!(
        bind.to_ascii_lowercase().as_str(),
        "127.0.0.1" | "::1" | "[::1]" | "localhost"
    )
}
