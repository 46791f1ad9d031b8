mod app;
mod connection;
mod trigger;

pub use app::*;
pub use connection::*;
pub use trigger::*;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub connection: ConnectionSettings,
    #[serde(default)]
    pub trigger: TriggerConfig,
}

impl Config {
    /// Parse a config from TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load the config at `path`, falling back to defaults when the file
    /// does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// Returns an empty vec when everything looks good.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.app.app_id.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "app.app_id".into(),
                message: "app_id must not be empty".into(),
            });
        }

        if self.app.resolve_secret().is_none() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "app.app_secret".into(),
                message: format!(
                    "no app_secret configured and ${} is unset",
                    self.app.app_secret_env
                ),
            });
        }

        if self.connection.negotiate_timeout_ms == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "connection.negotiate_timeout_ms".into(),
                message: "timeout must be greater than 0".into(),
            });
        }

        if self.connection.ping_interval_secs == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "connection.ping_interval_secs".into(),
                message: "ping interval must be greater than 0".into(),
            });
        }

        if !self.connection.auto_reconnect {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "connection.auto_reconnect".into(),
                message: "auto_reconnect is off; a dropped connection stays down".into(),
            });
        }

        if let Domain::Custom(url) = &self.app.domain {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "app.domain".into(),
                    message: format!("custom domain {url:?} must be an http(s) URL"),
                });
            }
        }

        errors
    }
}
