//! Error types for artifact transfer.

use thiserror::Error;

/// Result alias used throughout the artifact transfer crates.
pub type ArtifactResult<T> = std::result::Result<T, ArtifactError>;

/// Represents an error that can occur while negotiating or transferring an artifact.
///
/// Variants separate failures of the connection itself from rejections by the
/// backend, so callers can decide what is worth retrying (see
/// [`ArtifactError::is_retryable`]).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArtifactError {
    /// The request never produced a response (connection refused, DNS, timeout).
    #[error("Transport Error during {operation}: {message}")]
    Transport {
        /// What was being attempted.
        operation: String,
        /// Error reported by the HTTP stack.
        message: String,
    },

    /// The metadata service rejected a negotiation request (URL or finalize).
    #[error("Negotiation Error during {operation} ({status}): {message}")]
    Negotiation {
        /// The endpoint or operation that failed.
        operation: String,
        /// HTTP status code returned by the service.
        status: u16,
        /// Response body, if any.
        message: String,
    },

    /// The object store rejected a transfer against a presigned URL.
    #[error("Transfer Error{} ({status}): {message}", .part_number.map(|n| format!(" for part {}", n)).unwrap_or_default())]
    Transfer {
        /// Part being transferred, `None` for whole-object transfers.
        part_number: Option<u64>,
        /// HTTP status code returned by the object store.
        status: u16,
        /// Response body, if any.
        message: String,
    },

    /// The metadata service refused to commit an uploaded part.
    #[error("Part Commit Error for part {part_number} ({status}): {message}")]
    PartCommit {
        /// The part that could not be committed.
        part_number: u64,
        /// HTTP status code returned by the service.
        status: u16,
        /// Response body, if any.
        message: String,
    },

    /// A part upload succeeded but its response carried no ETag.
    #[error("Missing ETag header in response for part {part_number}")]
    MissingEtag {
        /// The part whose response lacked an ETag.
        part_number: u64,
    },

    /// Multipart uploads need a non-zero part size.
    #[error("Invalid part size: must be greater than 0")]
    InvalidPartSize,

    /// Reading the caller's artifact stream failed.
    #[error("I/O Error: {0}")]
    Io(String),

    /// A response body could not be decoded, or a request could not be encoded.
    #[error("Serialization Error: {0}")]
    Serialization(String),

    /// Client configuration is missing or invalid.
    #[error("Configuration Error: {0}")]
    Config(String),
}

impl ArtifactError {
    /// HTTP status attached to this error, if the failure came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Negotiation { status, .. }
            | Self::Transfer { status, .. }
            | Self::PartCommit { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether repeating the whole operation might succeed.
    ///
    /// Connection-level failures and 5xx responses are transient; everything
    /// else is a hard rejection or a local problem.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            _ => self.status().is_some_and(|status| status >= 500),
        }
    }
}

impl From<std::io::Error> for ArtifactError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ArtifactError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
