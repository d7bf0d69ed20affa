//! Error taxonomy for the backup engine
//!
//! Remote services report failures as a `(code, message)` pair. The engine
//! never propagates those as faults; it classifies them into a
//! [`FailureClass`] that decides whether the failing unit retries, and
//! records the final [`ErrorKind`] in the manifest.
//!
//! | Layer | Type | Propagates? |
//! |-------|------|-------------|
//! | Remote call | [`RemoteError`] | Returned as a value to the unit |
//! | Unit outcome | [`ErrorKind`] | Recorded in the manifest |
//! | Pre-run | [`ConfigError`], [`BackupError`] | Surfaced to the caller |

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error codes reported by the remote services when a caller is rate limited
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "TooManyRequestsException",
    "ProvisionedThroughputExceededException",
    "RequestLimitExceeded",
    "LimitExceededException",
    "SlowDown",
];

/// Error codes for failures that usually clear up on their own
const TRANSIENT_CODES: &[&str] = &[
    "ServiceUnavailable",
    "InternalServerError",
    "InternalFailure",
    "InternalFailureException",
    "ServiceException",
    "RequestTimeout",
    "RequestTimeoutException",
    "ConnectionError",
    "Timeout",
];

const PERMISSION_CODES: &[&str] = &[
    "AccessDenied",
    "AccessDeniedException",
    "UnauthorizedOperation",
    "Forbidden",
];

const NOT_FOUND_CODES: &[&str] = &[
    "ResourceNotFound",
    "ResourceNotFoundException",
    "NoSuchBucket",
    "NoSuchKey",
    "NoSuchUpload",
];

/// Codes meaning the caller's credentials are missing, invalid or expired
const CREDENTIAL_CODES: &[&str] = &[
    "InvalidClientTokenId",
    "UnrecognizedClientException",
    "ExpiredToken",
    "ExpiredTokenException",
    "InvalidAccessKeyId",
    "SignatureDoesNotMatch",
    "MissingAuthenticationToken",
    "NoCredentialProviders",
];

const ALREADY_EXISTS_CODES: &[&str] = &["ResourceInUseException", "ResourceExistsException"];

/// Retry class of a remote failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureClass {
    /// Rate limited by the remote service
    Throttled,
    /// Network hiccup, timeout or server-side 5xx
    TransientNetwork,
    /// The addressed resource does not exist
    ResourceNotFound,
    /// The caller is not allowed to perform the operation
    PermissionDenied,
    /// Anything else
    Unknown,
}

impl FailureClass {
    /// Whether a failure of this class may succeed if attempted again
    ///
    /// `Unknown` is not retryable here. Call sites that want to retry unknown
    /// submission failures decide that themselves.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FailureClass::Throttled | FailureClass::TransientNetwork)
    }

    /// Whether this class must fail immediately without consuming a retry
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FailureClass::PermissionDenied | FailureClass::ResourceNotFound
        )
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureClass::Throttled => "THROTTLED",
            FailureClass::TransientNetwork => "TRANSIENT_NETWORK",
            FailureClass::ResourceNotFound => "RESOURCE_NOT_FOUND",
            FailureClass::PermissionDenied => "PERMISSION_DENIED",
            FailureClass::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// A failure reported by one remote call
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct RemoteError {
    /// Service error code, e.g. `ThrottlingException`
    pub code: String,
    /// Human-readable message from the service
    pub message: String,
}

impl RemoteError {
    /// Create a remote error from a code and message
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        RemoteError {
            code: code.into(),
            message: message.into(),
        }
    }

    /// A call that did not answer within its deadline
    pub fn timeout(operation: &str) -> Self {
        RemoteError::new("RequestTimeout", format!("{} timed out", operation))
    }

    /// A call that failed before reaching the service
    pub fn connection(message: impl Into<String>) -> Self {
        RemoteError::new("ConnectionError", message)
    }

    /// Classify this failure for retry decisions
    pub fn classify(&self) -> FailureClass {
        let code = self.code.as_str();
        if THROTTLING_CODES.contains(&code) {
            FailureClass::Throttled
        } else if TRANSIENT_CODES.contains(&code) {
            FailureClass::TransientNetwork
        } else if PERMISSION_CODES.contains(&code) || CREDENTIAL_CODES.contains(&code) {
            FailureClass::PermissionDenied
        } else if NOT_FOUND_CODES.contains(&code) {
            FailureClass::ResourceNotFound
        } else {
            FailureClass::Unknown
        }
    }

    /// Whether the failure is caused by missing or invalid credentials
    pub fn is_credentials(&self) -> bool {
        CREDENTIAL_CODES.contains(&self.code.as_str())
    }

    /// Whether a create call failed because the resource is already there
    pub fn is_already_exists(&self) -> bool {
        ALREADY_EXISTS_CODES.contains(&self.code.as_str())
    }

    /// Shorthand for `classify().is_retryable()`
    pub fn is_retryable(&self) -> bool {
        self.classify().is_retryable()
    }
}

/// Error kind recorded against a resource in the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Throttled on every attempt
    Throttled,
    /// Network or server failure on every attempt
    TransientNetwork,
    /// Resource vanished or was never there
    ResourceNotFound,
    /// Caller lacks permission
    PermissionDenied,
    /// Unclassified remote failure
    Unknown,
    /// The export job could not be submitted
    SubmissionFailed,
    /// The archive could not be fetched from the export service
    DownloadFailed,
    /// The archive could not be written to object storage
    UploadFailed,
    /// The stored object did not match the local archive
    VerificationFailed,
    /// The dated identity table could not be created or never became writable
    TableCreationFailed,
    /// Identity records could not be written
    WriteFailed,
    /// The listing call for a category failed
    DiscoveryFailed,
}

impl ErrorKind {
    /// Canonical uppercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Throttled => "THROTTLED",
            ErrorKind::TransientNetwork => "TRANSIENT_NETWORK",
            ErrorKind::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::Unknown => "UNKNOWN",
            ErrorKind::SubmissionFailed => "SUBMISSION_FAILED",
            ErrorKind::DownloadFailed => "DOWNLOAD_FAILED",
            ErrorKind::UploadFailed => "UPLOAD_FAILED",
            ErrorKind::VerificationFailed => "VERIFICATION_FAILED",
            ErrorKind::TableCreationFailed => "TABLE_CREATION_FAILED",
            ErrorKind::WriteFailed => "WRITE_FAILED",
            ErrorKind::DiscoveryFailed => "DISCOVERY_FAILED",
        }
    }
}

impl From<FailureClass> for ErrorKind {
    fn from(class: FailureClass) -> Self {
        match class {
            FailureClass::Throttled => ErrorKind::Throttled,
            FailureClass::TransientNetwork => ErrorKind::TransientNetwork,
            FailureClass::ResourceNotFound => ErrorKind::ResourceNotFound,
            FailureClass::PermissionDenied => ErrorKind::PermissionDenied,
            FailureClass::Unknown => ErrorKind::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every rule a configuration broke
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid configuration: {}", errors.join("; "))]
pub struct ConfigError {
    /// One message per violated rule
    pub errors: Vec<String>,
}

impl ConfigError {
    /// A configuration error with a single violation
    pub fn single(message: impl Into<String>) -> Self {
        ConfigError {
            errors: vec![message.into()],
        }
    }
}

/// Errors that abort a run before any remote work starts
#[derive(Debug, Error)]
pub enum BackupError {
    /// The configuration is invalid
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// A service rejected the caller's credentials during pre-flight
    #[error("credentials rejected by {service}: {source}")]
    Credentials {
        /// Service that rejected the credentials
        service: &'static str,
        /// Underlying remote failure
        #[source]
        source: RemoteError,
    },

    /// The engine could not produce its output
    #[error("internal error: {0}")]
    Internal(String),
}

impl BackupError {
    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, BackupError::Configuration(_))
    }

    /// Check if this is a credentials error
    pub fn is_credentials(&self) -> bool {
        matches!(self, BackupError::Credentials { .. })
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(e: serde_json::Error) -> Self {
        BackupError::Internal(format!("serialization failed: {}", e))
    }
}
