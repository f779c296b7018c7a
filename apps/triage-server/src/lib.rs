//! Development-time error diagnostics for axum applications.
//!
//! [`attach`] wraps a host router with a middleware that rewrites error
//! responses (status >= 400) to carry an "ask AI" widget, and mounts the
//! endpoint the widget calls to get a model-written explanation.
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{routing::get, Router};
//! use triage_core::{Config, DeploymentMode};
//!
//! # fn demo() -> Result<(), triage_server::DiagnosticsError> {
//! let diagnostics = Arc::new(triage_server::Diagnostics::new(
//!     Config::default(),
//!     DeploymentMode::from_env(),
//! )?);
//! let app: Router = triage_server::attach(Router::new().route("/", get(|| async { "ok" })), diagnostics);
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::http::StatusCode;
use triage_core::{Config, DeploymentMode, LogSampler};

mod analysis;
pub mod api;
mod capture;
mod error;
mod extract;
mod http_client;
mod interceptor;
mod router;
pub mod widget;

pub use analysis::{request_body, AnalysisClient, AnalysisResult};
pub use capture::{install_panic_hook, panic_response, CapturedException};
pub use error::DiagnosticsError;
pub use extract::{extract, RequestEnv};
pub use interceptor::{intercept_mw, HANDLED_HEADER};
pub use router::attach;

/// Everything the middleware and the endpoint share. Constructed once at
/// startup and passed around as `Arc<Diagnostics>`; never mutated.
pub struct Diagnostics {
    config: Arc<Config>,
    mode: DeploymentMode,
    sampler: LogSampler,
    client: AnalysisClient,
}

impl Diagnostics {
    pub fn new(config: impl Into<Arc<Config>>, mode: DeploymentMode) -> Result<Self, DiagnosticsError> {
        let config = config.into();
        let sampler = LogSampler::from_config(&config);
        let client = AnalysisClient::from_config(&config)?;
        Ok(Self {
            config,
            mode,
            sampler,
            client,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn sampler(&self) -> &LogSampler {
        &self.sampler
    }

    pub fn client(&self) -> &AnalysisClient {
        &self.client
    }

    /// Development mode, enabled, and an error status.
    pub fn should_intercept(&self, status: StatusCode) -> bool {
        self.mode.is_development() && self.config.enabled && status.as_u16() >= 400
    }
}
