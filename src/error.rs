//! Error types for the announcement pipeline

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for annunciator
///
/// Backend-level variants never escape the delivery worker; they are
/// logged and turned into a fallback to the next backend.
#[derive(Error, Debug)]
pub enum AnnouncerError {
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend '{backend}' timed out after {timeout:?}")]
    BackendTimeout { backend: String, timeout: Duration },

    #[error("Backend delivery failed: {0}")]
    BackendDelivery(String),

    #[error("All speech backends failed")]
    AllBackendsExhausted,

    #[error("Delivery worker did not stop within {0:?}")]
    UngracefulShutdown(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("INI parse error: {0}")]
    IniParse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for annunciator operations
pub type Result<T> = std::result::Result<T, AnnouncerError>;

impl From<String> for AnnouncerError {
    fn from(s: String) -> Self {
        AnnouncerError::Other(s)
    }
}

impl From<&str> for AnnouncerError {
    fn from(s: &str) -> Self {
        AnnouncerError::Other(s.to_string())
    }
}
