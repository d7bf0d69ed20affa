//! Unified error types for qsbackup.
//!
//! A run only fails as a whole before it starts. Once remote work begins,
//! failures are recorded in the report instead of being returned, so this
//! type covers configuration, credentials, and writing the outputs.

use qsbackup_core::{BackupError, ConfigError};
use thiserror::Error;

/// All qsbackup errors.
#[derive(Debug, Error)]
pub enum Error {
    /// The configuration broke one or more rules
    #[error("invalid configuration: {}", .0.join("; "))]
    Configuration(Vec<String>),

    /// A service rejected the caller's credentials
    #[error("credentials rejected by {service}: {message}")]
    Credentials {
        /// Service that rejected them
        service: String,
        /// Remote error code and message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for qsbackup operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration(_))
    }

    /// Check if this is a credentials error.
    pub fn is_credentials(&self) -> bool {
        matches!(self, Error::Credentials { .. })
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(self, Error::Internal(_))
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Configuration(e.errors)
    }
}

impl From<BackupError> for Error {
    fn from(e: BackupError) -> Self {
        match e {
            BackupError::Configuration(c) => Error::Configuration(c.errors),
            BackupError::Credentials { service, source } => Error::Credentials {
                service: service.to_string(),
                message: source.to_string(),
            },
            BackupError::Internal(msg) => Error::Internal(msg),
        }
    }
}

// Convert from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
