//! Configuration management for Rubrik exporter.
//!
//! Supports loading configuration from:
//! - TOML configuration files
//! - Environment variables (with `RUBRIK_EXPORTER_` prefix)
//! - Command-line arguments

use crate::error::{Result, RubrikError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Rubrik appliance connection settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct RubrikConfig {
    /// Rubrik base URL (e.g., "https://rubrik.example.com")
    pub endpoint: String,

    /// API username (used when no service account is configured)
    #[serde(default)]
    pub username: String,

    /// API password
    #[serde(default)]
    pub password: String,

    /// Service account client ID, preferred over username/password
    #[serde(default)]
    pub service_account_client_id: String,

    /// Service account client secret
    #[serde(default)]
    pub service_account_client_secret: String,

    /// Verify TLS certificates (appliances usually ship self-signed certs)
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Try the GraphQL API before falling back to REST
    #[serde(default = "default_graphql_enabled")]
    pub graphql_enabled: bool,

    /// Relative range used for physical ingest and node stats (e.g. "-10min")
    #[serde(default = "default_time_series_range")]
    pub time_series_range: String,

    /// Relative range used for archival bandwidth (e.g. "-1h")
    #[serde(default = "default_archival_bandwidth_range")]
    pub archival_bandwidth_range: String,
}

impl RubrikConfig {
    /// Whether both service account fields are populated.
    pub fn has_service_account(&self) -> bool {
        !self.service_account_client_id.is_empty() && !self.service_account_client_secret.is_empty()
    }

    /// Whether both username and password are populated.
    pub fn has_user_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

impl std::fmt::Debug for RubrikConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RubrikConfig")
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &"***REDACTED***")
            .field("service_account_client_id", &self.service_account_client_id)
            .field("service_account_client_secret", &"***REDACTED***")
            .field("verify_tls", &self.verify_tls)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("graphql_enabled", &self.graphql_enabled)
            .field("time_series_range", &self.time_series_range)
            .field("archival_bandwidth_range", &self.archival_bandwidth_range)
            .finish()
    }
}

/// Exporter specific settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExporterConfig {
    /// Address to listen on for metrics endpoint
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format ("text" or "json")
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Main configuration structure for the Rubrik exporter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Rubrik appliance configuration
    pub rubrik: RubrikConfig,

    /// Exporter server configuration
    #[serde(default)]
    pub exporter: ExporterConfig,
}

fn default_verify_tls() -> bool {
    false
}

fn default_timeout() -> u64 {
    10
}

fn default_graphql_enabled() -> bool {
    true
}

fn default_time_series_range() -> String {
    "-10min".to_string()
}

fn default_archival_bandwidth_range() -> String {
    "-1h".to_string()
}

fn default_listen_address() -> String {
    "0.0.0.0:9477".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Settings {
    /// Load configuration from a file and environment variables.
    ///
    /// # Arguments
    ///
    /// * `config_path` - Optional path to configuration file
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rubrik_exporter::config::Settings;
    ///
    /// let settings = Settings::load(Some("config/default.toml")).unwrap();
    /// ```
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(config::File::with_name(path));
            }
        }

        // e.g. RUBRIK_EXPORTER__RUBRIK__SERVICE_ACCOUNT_CLIENT_ID
        builder = builder.add_source(
            config::Environment::with_prefix("RUBRIK_EXPORTER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let settings: Settings = config.try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration settings.
    fn validate(&self) -> Result<()> {
        if self.rubrik.endpoint.is_empty() {
            return Err(RubrikError::Config(config::ConfigError::Message(
                "Rubrik endpoint cannot be empty".to_string(),
            )));
        }

        if !self.rubrik.has_service_account() && !self.rubrik.has_user_credentials() {
            return Err(RubrikError::Config(config::ConfigError::Message(
                "Either username/password or service account client ID/secret is required"
                    .to_string(),
            )));
        }

        if self.rubrik.timeout_seconds == 0 {
            return Err(RubrikError::Config(config::ConfigError::Message(
                "timeout_seconds must be greater than zero".to_string(),
            )));
        }

        Ok(())
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            rubrik: RubrikConfig {
                endpoint: "https://localhost".to_string(),
                username: String::new(),
                password: String::new(),
                service_account_client_id: String::new(),
                service_account_client_secret: String::new(),
                verify_tls: default_verify_tls(),
                timeout_seconds: default_timeout(),
                graphql_enabled: default_graphql_enabled(),
                time_series_range: default_time_series_range(),
                archival_bandwidth_range: default_archival_bandwidth_range(),
            },
            exporter: ExporterConfig::default(),
        }
    }
}
