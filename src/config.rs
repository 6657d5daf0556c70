//! Engine configuration.
//!
//! Configuration can be loaded from:
//! 1. TOML file (`doctrack.toml`)
//! 2. Environment variables (with `DOCTRACK_` prefix)
//!
//! Environment variables override TOML configuration.
//!
//! # Example TOML Configuration
//!
//! ```toml
//! [engine]
//! poll_interval_ms = 2000
//! max_filename_length = 100
//! supported_media_type = "application/pdf"
//! api_base_url = "http://localhost:5000/api"
//! request_timeout_secs = 30
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_POLL_INTERVAL_MS, MAX_FILENAME_LENGTH, SUPPORTED_MEDIA_TYPE};
use crate::error::ConfigError;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "doctrack.toml";

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "DOCTRACK_";

/// Tunables for submission, polling, and the HTTP adapter.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `poll_interval_ms` | 2000 |
/// | `max_filename_length` | 100 |
/// | `supported_media_type` | `application/pdf` |
/// | `api_base_url` | `http://localhost:5000/api` |
/// | `api_token` | none |
/// | `request_timeout_secs` | 30 |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay between status queries for one task.
    pub poll_interval_ms: u64,

    /// Longest allowed normalized file name, in characters.
    pub max_filename_length: usize,

    /// The one media type accepted for submission.
    pub supported_media_type: String,

    /// Base URL of the job runner's JSON API.
    pub api_base_url: String,

    /// Bearer token sent with every API call.
    pub api_token: Option<String>,

    /// Per-request timeout for the HTTP adapter.
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_filename_length: MAX_FILENAME_LENGTH,
            supported_media_type: SUPPORTED_MEDIA_TYPE.to_string(),
            api_base_url: "http://localhost:5000/api".to_string(),
            api_token: None,
            request_timeout_secs: 30,
        }
    }
}

impl EngineConfig {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. `doctrack.toml` in the working directory
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but does not parse, or the
    /// result fails [`validate`](Self::validate).
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Ok(contents) = std::fs::read_to_string(DEFAULT_CONFIG_FILE) {
            Self::from_toml(&contents)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or a parse or
    /// validation error.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        let mut config = Self::from_toml(&contents)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML content (the `[engine]` table).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or mistyped fields.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        #[derive(Deserialize)]
        struct FullConfig {
            #[serde(default)]
            engine: EngineConfig,
        }

        let full: FullConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Ok(full.engine)
    }

    /// Apply `DOCTRACK_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup keyed by full variable name.
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(v) = var("POLL_INTERVAL_MS").and_then(|v| v.parse().ok()) {
            self.poll_interval_ms = v;
        }
        if let Some(v) = var("MAX_FILENAME_LENGTH").and_then(|v| v.parse().ok()) {
            self.max_filename_length = v;
        }
        if let Some(v) = var("SUPPORTED_MEDIA_TYPE") {
            self.supported_media_type = v;
        }
        if let Some(v) = var("API_BASE_URL") {
            self.api_base_url = v;
        }
        if let Some(v) = var("API_TOKEN") {
            self.api_token = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = var("REQUEST_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.request_timeout_secs = v;
        }
    }

    /// Checks that the values are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero poll interval or timeout,
    /// or an empty media type or base URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.supported_media_type.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "supported_media_type must not be empty".to_string(),
            ));
        }
        if self.api_base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api_base_url must not be empty".to_string()));
        }
        Ok(())
    }

    /// The poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The HTTP request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
