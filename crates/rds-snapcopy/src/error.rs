//! Error types for the snapshot copier.

use thiserror::Error;

/// Errors that can occur while talking to a region or driving a copy pass.
#[derive(Debug, Error)]
pub enum CopierError {
    /// The provider reported that the requested snapshot does not exist.
    #[error("snapshot not found: {identifier}")]
    SnapshotNotFound {
        /// Identifier that was looked up.
        identifier: String,
    },

    /// Any other failure reported by the provider API.
    #[error("{operation} failed: {message}")]
    Provider {
        /// Provider operation that failed (e.g. `DescribeDBSnapshots`).
        operation: String,
        /// Error message describing the failure.
        message: String,
    },

    /// Building the pre-signed copy request failed.
    #[error("presign error: {message}")]
    Presign {
        /// Error message describing the failure.
        message: String,
    },

    /// Configuration is missing or inconsistent.
    #[error("config error: {message}")]
    Config {
        /// Error message describing the problem.
        message: String,
    },

    /// A regional session could not be established.
    #[error("failed to open a session to region {region}: {message}")]
    Session {
        /// Region the session was bound to.
        region: String,
        /// Error message describing the failure.
        message: String,
    },

    /// I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl CopierError {
    /// Convenience constructor for provider failures.
    pub fn provider(operation: impl Into<String>, message: impl Into<String>) -> Self {
        CopierError::Provider {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for configuration failures.
    pub fn config(message: impl Into<String>) -> Self {
        CopierError::Config {
            message: message.into(),
        }
    }

    /// Returns true for the distinguished "snapshot not found" case.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CopierError::SnapshotNotFound { .. })
    }
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, CopierError>;
