//! Configuration infrastructure
//!
//! Settings for the job stream transport and for logging. Sources are layered
//! with the `config` crate, lowest priority first:
//! 1. Built-in defaults (see [`defaults`])
//! 2. Optional config file (TOML/JSON/YAML, by extension)
//! 3. Environment variables prefixed `FWA_CONSOLE`, e.g.
//!    `FWA_CONSOLE__STREAM__BASE_URL=https://fwa.internal`

#![allow(clippy::uninlined_format_args)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "FWA_CONSOLE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },

    #[error("Could not resolve config directory")]
    NoConfigDir,
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Job stream transport
    pub stream: StreamConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Where and how the scoring job is started
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Base URL of the claims-review backend
    pub base_url: String,

    /// Path of the streaming job endpoint, relative to `base_url`
    pub job_path: String,

    /// Upper bound on the whole request, streaming included
    pub request_timeout_seconds: u64,

    /// Upper bound on establishing the connection
    pub connect_timeout_seconds: u64,

    /// User agent sent with job requests
    pub user_agent: String,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log file name inside the log directory
    pub file_name: String,

    /// Log directory; defaults to `logs/` next to the executable
    pub directory: Option<PathBuf>,

    /// Per-target level overrides (e.g., "reqwest": "warn")
    pub module_filters: HashMap<String, String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            job_path: defaults::JOB_PATH.to_string(),
            request_timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            connect_timeout_seconds: defaults::CONNECT_TIMEOUT_SECONDS,
            user_agent: defaults::USER_AGENT.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            directory: None,
            module_filters: HashMap::new(),
        }
    }
}

impl StreamConfig {
    /// Absolute URL of the job endpoint
    pub fn job_url(&self) -> Result<url::Url, ConfigError> {
        let base = url::Url::parse(&self.base_url).map_err(|e| ConfigError::Validation {
            message: format!("stream.base_url '{}' is not a valid URL: {}", self.base_url, e),
        })?;
        base.join(&self.job_path).map_err(|e| ConfigError::Validation {
            message: format!("stream.job_path '{}' cannot be joined: {}", self.job_path, e),
        })
    }
}

impl AppConfig {
    /// Load defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the transport cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.stream.job_url()?;

        if self.stream.request_timeout_seconds == 0 {
            return Err(ConfigError::Validation {
                message: "stream.request_timeout_seconds must be greater than 0".to_string(),
            });
        }

        if self.stream.connect_timeout_seconds > self.stream.request_timeout_seconds {
            return Err(ConfigError::Validation {
                message: "stream.connect_timeout_seconds cannot exceed request_timeout_seconds"
                    .to_string(),
            });
        }

        if !self.logging.console_output && !self.logging.file_output {
            return Err(ConfigError::Validation {
                message: "at least one logging output must be enabled".to_string(),
            });
        }

        Ok(())
    }
}

/// Resolves the per-user configuration file
pub struct ConfigManager {
    pub config_path: PathBuf,
}

impl ConfigManager {
    /// Get the application configuration directory
    pub fn get_config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(defaults::APP_DIR_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_dir()?.join(defaults::CONFIG_FILE_NAME);
        Ok(Self { config_path })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    /// Load the user config when it exists, otherwise defaults plus environment.
    pub fn load_config(&self) -> Result<AppConfig, ConfigError> {
        if self.config_path.exists() {
            info!("Loading configuration from: {:?}", self.config_path);
            AppConfig::load(Some(&self.config_path))
        } else {
            info!(
                "Configuration file not found ({:?}), using defaults",
                self.config_path
            );
            AppConfig::load(None)
        }
    }

    /// Get the configuration file path
    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }
}

/// Default configuration values
pub mod defaults {
    /// Directory name under the user config dir
    pub const APP_DIR_NAME: &str = "fwa-review-console";

    /// Config file name inside the app directory
    pub const CONFIG_FILE_NAME: &str = "console.toml";

    /// Default backend base URL
    pub const BASE_URL: &str = "http://localhost:8000";

    /// Default streaming job endpoint
    pub const JOB_PATH: &str = "/api/jobs/score/stream";

    /// Scoring a large batch can take a while; anything beyond this is
    /// treated as an overloaded backend.
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 600;

    /// Default connect timeout in seconds
    pub const CONNECT_TIMEOUT_SECONDS: u64 = 10;

    /// Default user agent
    pub const USER_AGENT: &str = "fwa-review-console/0.3";

    // Log configuration defaults
    /// Default log level
    pub const LOG_LEVEL: &str = "info";

    /// Default JSON format setting
    pub const LOG_JSON_FORMAT: bool = false;

    /// Default console output setting
    pub const LOG_CONSOLE_OUTPUT: bool = true;

    /// Default file output setting
    pub const LOG_FILE_OUTPUT: bool = false;

    /// Default log file name
    pub const LOG_FILE_NAME: &str = "console.log";
}
