use std::fmt;
use std::str::FromStr;

use tracing::warn;

/// Deployment mode of the host process. Only `Development` enables
/// interception and the analysis endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    Development,
    Test,
    Production,
}

impl DeploymentMode {
    /// Resolve from `TRIAGE_ENV`. Unset means development; an unrecognized
    /// value is treated as production so the tooling stays off.
    pub fn from_env() -> Self {
        match std::env::var("TRIAGE_ENV") {
            Ok(raw) if !raw.trim().is_empty() => raw.parse().unwrap_or_else(|_| {
                warn!(target: "triage::config", value = %raw, "unrecognized TRIAGE_ENV; assuming production");
                DeploymentMode::Production
            }),
            _ => DeploymentMode::Development,
        }
    }

    pub fn is_development(self) -> bool {
        self == DeploymentMode::Development
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentMode::Development => "development",
            DeploymentMode::Test => "test",
            DeploymentMode::Production => "production",
        }
    }
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(DeploymentMode::Development),
            "test" => Ok(DeploymentMode::Test),
            "production" | "prod" => Ok(DeploymentMode::Production),
            other => Err(format!("unknown deployment mode: {other}")),
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
