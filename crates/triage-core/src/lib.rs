//! Building blocks shared by the triage middleware and analysis endpoint.
//!
//! Everything here is free of HTTP concerns: configuration loading, the
//! deployment mode, the [`DiagnosticRecord`] sum type, the development log
//! sampler and the prompt template.

mod config;
pub mod logs;
mod mode;
pub mod prompt;
mod record;

pub use config::{
    config_schema_json, load_config, resolve_config, Config, ConfigError, DEFAULT_ENDPOINT_PATH,
    DEFAULT_MODEL,
};
pub use logs::LogSampler;
pub use mode::DeploymentMode;
pub use prompt::{build_prompt, PROMPT_TEMPLATE_VERSION};
pub use record::{AnalyzeRequest, DiagnosticRecord, RecordShapeError, MAX_BACKTRACE_FRAMES};
