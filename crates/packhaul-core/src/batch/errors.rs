//! Pipeline error types.
//!
//! These errors are designed to be serializable and not depend on external
//! error types like `std::io::Error`. For I/O errors, we capture the kind
//! and message as strings.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for pipeline operations.
///
/// Designed to be serializable across process boundaries (CLI output, UI
/// bridges) without depending on non-serializable types.
#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum PipelineError {
    /// I/O error during file operations.
    #[error("I/O error ({kind}): {message}")]
    Io {
        /// The kind of I/O error (e.g., "NotFound", "PermissionDenied").
        kind: String,
        /// Detailed error message.
        message: String,
    },

    /// The patch provider reported a failure.
    #[error("Patch failed: {message}")]
    Patch {
        /// Detailed error message.
        message: String,
    },

    /// The archiver reported a failure.
    #[error("Archive failed: {message}")]
    Archive {
        /// Detailed error message.
        message: String,
    },

    /// The uploader reported a failure.
    #[error("Upload failed: {message}")]
    Upload {
        /// Detailed error message.
        message: String,
        /// HTTP status code if available.
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// Publishing was requested but the archive file is missing on disk.
    #[error("Archive not found: {path}")]
    MissingArchive {
        /// The expected archive path.
        path: String,
    },

    /// All upload attempts for an item were used up.
    #[error("Upload failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The last attempt's error text.
        last_error: String,
    },

    /// Run settings failed validation.
    #[error("Invalid settings: {message}")]
    InvalidSettings {
        /// What was wrong.
        message: String,
    },

    /// The operation was cancelled by the user.
    #[error("Cancelled")]
    Cancelled,

    /// General/uncategorized error.
    #[error("{message}")]
    Other {
        /// Error message.
        message: String,
    },
}

impl PipelineError {
    /// Create an I/O error from kind and message strings.
    pub fn io(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Io {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error from a `std::io::Error`.
    ///
    /// This captures the error kind name and message for serialization.
    #[must_use]
    pub fn from_io_error(err: &std::io::Error) -> Self {
        let kind = err.kind();
        Self::Io {
            kind: format!("{kind:?}"),
            message: err.to_string(),
        }
    }

    /// Create a patch failure.
    pub fn patch(message: impl Into<String>) -> Self {
        Self::Patch {
            message: message.into(),
        }
    }

    /// Create an archive failure.
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }

    /// Create an upload failure.
    pub fn upload(message: impl Into<String>) -> Self {
        Self::Upload {
            message: message.into(),
            status_code: None,
        }
    }

    /// Create an upload failure with an HTTP status code.
    pub fn upload_with_status(message: impl Into<String>, status_code: u16) -> Self {
        Self::Upload {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a missing-archive failure.
    pub fn missing_archive(path: impl Into<String>) -> Self {
        Self::MissingArchive { path: path.into() }
    }

    /// Create a retries-exhausted failure.
    pub fn retries_exhausted(attempts: u32, last_error: impl Into<String>) -> Self {
        Self::RetriesExhausted {
            attempts,
            last_error: last_error.into(),
        }
    }

    /// Create an invalid-settings error.
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings {
            message: message.into(),
        }
    }

    /// Create a generic error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable by retrying.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Upload { .. } | Self::Io { .. } | Self::Other { .. })
    }

    /// Check if this is a cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Convert to a user-friendly message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Io { message, .. } => format!("File operation failed: {message}"),
            Self::Patch { message } => format!("Patching failed: {message}"),
            Self::Archive { message } => format!("Compression failed: {message}"),
            Self::Upload {
                message,
                status_code: Some(code),
            } => format!("Upload failed (HTTP {code}): {message}"),
            Self::Upload { message, .. } => format!("Upload failed: {message}"),
            Self::MissingArchive { path } => {
                format!("Cannot publish: archive '{path}' was not found on disk.")
            }
            Self::RetriesExhausted {
                attempts,
                last_error,
            } => format!("Upload gave up after {attempts} attempts. Last error: {last_error}"),
            Self::InvalidSettings { message } => format!("Settings are invalid: {message}"),
            Self::Cancelled => "The operation was cancelled.".to_string(),
            Self::Other { message } => message.clone(),
        }
    }
}

/// Convenience result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such folder");
        let err = PipelineError::from_io_error(&io_err);

        match err {
            PipelineError::Io { kind, message } => {
                assert_eq!(kind, "NotFound");
                assert!(message.contains("no such folder"));
            }
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn test_error_serialization() {
        let err = PipelineError::upload_with_status("timeout", 408);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("408"));
        assert!(json.contains("timeout"));

        let parsed: PipelineError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, err);
    }

    #[test]
    fn test_is_recoverable() {
        assert!(PipelineError::upload("timeout").is_recoverable());
        assert!(!PipelineError::Cancelled.is_recoverable());
        assert!(!PipelineError::invalid_settings("bad").is_recoverable());
        assert!(!PipelineError::missing_archive("/tmp/a.7z").is_recoverable());
    }

    #[test]
    fn test_user_messages() {
        let err = PipelineError::retries_exhausted(3, "connection reset");
        let msg = err.user_message();
        assert!(msg.contains('3'));
        assert!(msg.contains("connection reset"));
    }
}
