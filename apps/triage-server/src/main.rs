use std::sync::Arc;

use anyhow::Context as _;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use triage_core::DeploymentMode;
use triage_server::{attach, install_panic_hook, CapturedException, Diagnostics};

mod bootstrap;

const INDEX: &str = r#"<!DOCTYPE html>
<html>
<head><title>triage demo</title></head>
<body>
<h1>triage demo</h1>
<ul>
  <li><a href="/boom">/boom</a> handler error</li>
  <li><a href="/panic">/panic</a> handler panic</li>
  <li><a href="/api/missing">/api/missing</a> JSON 404</li>
  <li><a href="/nowhere">/nowhere</a> unmatched route</li>
</ul>
</body>
</html>
"#;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = triage_core::resolve_config().context("load triage config")?;
    triage_otel::init(&cfg);
    let mode = DeploymentMode::from_env();
    install_panic_hook();

    let addr = bootstrap::http_addr_from_env(mode)?;
    if cfg.api_key().is_none() {
        warn!(target: "triage::server", "no API key configured; analysis requests will fail");
    }
    info!(
        target: "triage::server",
        %mode,
        enabled = cfg.enabled,
        model = %cfg.model,
        log = %cfg.log_path().display(),
        "diagnostics configured"
    );

    let diagnostics = Arc::new(Diagnostics::new(cfg, mode).context("build diagnostics")?);
    let app = attach(demo_routes(), diagnostics).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    info!(target: "triage::server", %addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("http server exited with error")?;
    Ok(())
}

fn demo_routes() -> Router {
    Router::new()
        .route("/", get(|| async { Html(INDEX) }))
        .route("/boom", get(boom))
        .route("/panic", get(demo_panic))
        .route(
            "/api/missing",
            get(|| async { (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))) }),
        )
}

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("order lookup failed")]
    Lookup(#[source] std::io::Error),
}

impl IntoResponse for DemoError {
    fn into_response(self) -> Response {
        error!(target: "triage::server", error = %self, "demo handler failed");
        CapturedException::from_error(&self).into_error_page(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

async fn boom() -> Result<Html<&'static str>, DemoError> {
    let missing = std::path::Path::new("orders/42.json");
    let body = tokio::fs::read_to_string(missing).await.map_err(DemoError::Lookup)?;
    info!(target: "triage::server", bytes = body.len(), "order loaded");
    Ok(Html("<html><body>order loaded</body></html>"))
}

async fn demo_panic() -> &'static str {
    panic!("demo panic from /panic")
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(target: "triage::server", error = %err, "SIGTERM handler unavailable");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!(target: "triage::server", "shutdown signal received");
}
