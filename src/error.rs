//! Error types for the Rubrik exporter.
//!
//! Authentication errors are fatal at startup. Request, query and decode
//! errors only ever travel as far as the resource client, which logs them
//! and degrades to an empty result.

use thiserror::Error;

/// Main error type for Rubrik exporter operations.
#[derive(Debug, Error)]
pub enum RubrikError {
    /// No authentication strategy produced a usable session token
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// REST call failed at the transport level or returned a non-2xx status
    #[error("REST request to {path} failed{}: {message}", status_suffix(.status))]
    Request {
        status: Option<u16>,
        path: String,
        message: String,
    },

    /// GraphQL call failed (transport, non-2xx or `errors` in the payload)
    #[error("GraphQL query failed: {0}")]
    Query(String),

    /// Response body could not be decoded into the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Neither protocol served any resource category during a scrape
    #[error("Rubrik appliance unavailable: {0}")]
    Unavailable(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// HTTP client could not be constructed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Metrics error
    #[error("Metrics error: {0}")]
    Metrics(String),

    /// HTTP server error
    #[error("HTTP server error: {0}")]
    Server(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RubrikError {
    /// Build a [`RubrikError::Request`] from a transport-level failure.
    pub(crate) fn transport(path: &str, err: reqwest::Error) -> Self {
        RubrikError::Request {
            status: err.status().map(|s| s.as_u16()),
            path: path.to_string(),
            message: err.to_string(),
        }
    }
}

impl From<prometheus::Error> for RubrikError {
    fn from(err: prometheus::Error) -> Self {
        RubrikError::Metrics(err.to_string())
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// Result type alias for Rubrik operations.
pub type Result<T> = std::result::Result<T, RubrikError>;
