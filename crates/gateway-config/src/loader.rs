//! Configuration loading from files and the environment.

use crate::config::{GatewayConfig, LogFormat};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use validator::Validate;

/// Default prefix for environment overrides
pub const DEFAULT_ENV_PREFIX: &str = "GATEWAY";

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration file {path}: {message}")]
    Parse {
        /// File path
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// File extension is not a known format
    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    /// Environment override has an invalid value
    #[error("Invalid value for {var}: {message}")]
    InvalidEnv {
        /// Variable name
        var: String,
        /// Why the value was rejected
        message: String,
    },

    /// Resolved configuration failed validation
    #[error("Invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Builder that resolves a [`GatewayConfig`] from a file, then the environment.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader with no file and the default environment prefix
    #[must_use]
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
        }
    }

    /// Read the given YAML or TOML file
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }

    /// Change the environment variable prefix
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load, apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an override is
    /// malformed, or the resolved configuration is invalid.
    pub async fn load(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.file {
            Some(path) => {
                info!(path = %path.display(), "Loading configuration file");
                let content = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|source| ConfigError::Io {
                        path: path.clone(),
                        source,
                    })?;
                parse(path, &content)?
            }
            None => {
                debug!("No configuration file given, using defaults");
                GatewayConfig::default()
            }
        };

        self.apply_env(&mut config, |name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(
        &self,
        config: &mut GatewayConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let var = |suffix: &str| format!("{}_{suffix}", self.env_prefix);

        if let Some(host) = lookup(&var("HOST")) {
            config.server.host = host;
        }

        let port_var = var("PORT");
        if let Some(port) = lookup(&port_var) {
            config.server.port = port.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidEnv {
                    var: port_var.clone(),
                    message: e.to_string(),
                }
            })?;
        }

        if let Some(level) = lookup(&var("LOG_LEVEL")) {
            config.logging.level = level;
        }

        let format_var = var("LOG_FORMAT");
        if let Some(format) = lookup(&format_var) {
            config.logging.format = match format.to_ascii_lowercase().as_str() {
                "json" => LogFormat::Json,
                "pretty" => LogFormat::Pretty,
                other => {
                    return Err(ConfigError::InvalidEnv {
                        var: format_var,
                        message: format!("unknown log format '{other}'"),
                    })
                }
            };
        }

        Ok(())
    }
}

/// Load configuration from an optional file with the default environment prefix.
///
/// # Errors
///
/// See [`ConfigLoader::load`].
pub async fn load_config(path: Option<&Path>) -> Result<GatewayConfig, ConfigError> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = path {
        loader = loader.with_file(path);
    }
    loader.load().await
}

fn parse(path: &Path, content: &str) -> Result<GatewayConfig, ConfigError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    match extension.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string())),
        "toml" => toml::from_str(content).map_err(|e| parse_err(e.to_string())),
        "json" => serde_json::from_str(content).map_err(|e| parse_err(e.to_string())),
        other => Err(ConfigError::UnsupportedFormat(other.to_string())),
    }
}
