//! Error types for the LogDNA callback.
//!
//! None of these errors ever reach the orchestration run: the listener
//! methods return `()` and every failure below is logged and absorbed. They
//! exist so the pieces of the pipeline can be tested and composed with `?`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for callback operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for the LogDNA callback.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// No ingestion key was configured, so forwarding is disabled.
    #[error("No ingestion key configured; set LOGDNA_INGESTION_KEY or logdna_ingestion_key in [callback_logdna]")]
    MissingIngestionKey,

    /// Invalid configuration value.
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// Error reading a native configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    ConfigRead {
        /// Path to the config file
        path: PathBuf,
        /// Source error
        #[source]
        source: std::io::Error,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// The ingestion endpoint URL could not be built.
    #[error("Invalid ingestion endpoint '{endpoint}': {message}")]
    InvalidEndpoint {
        /// The endpoint that was attempted
        endpoint: String,
        /// Error message
        message: String,
    },

    /// HTTP request failed before a response arrived.
    #[error("HTTP request to ingestion endpoint failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Request did not complete within the configured timeout.
    #[error("Ingestion request timed out after {0:?}")]
    Timeout(Duration),

    /// The ingestion endpoint answered with a non-success status.
    #[error("Ingestion endpoint rejected the request: status={status}, body={body}")]
    Rejected {
        /// HTTP status code
        status: u16,
        /// Response body, if any
        body: String,
    },
}

impl Error {
    /// Creates a new invalid config error.
    pub fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if a retry of the same request may succeed.
    ///
    /// Client errors (4xx) other than 408/429 are permanent: retrying a
    /// rejected key or malformed payload only burns the flush window.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) | Error::Timeout(_) => true,
            Error::Rejected { status, .. } => {
                *status >= 500 || *status == 408 || *status == 429
            }
            _ => false,
        }
    }
}
