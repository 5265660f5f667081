//! Error types for torrent client operations.

use std::error::Error;

use thiserror::Error;

/// Primary error type for torrent client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Operation is not implemented by the active backend.
    #[error("operation not supported by this backend")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
    /// The client is not connected and the caller required a session.
    #[error("not connected")]
    NotConnected,
    /// The backend handshake or probe failed; recovered via the retry timer.
    #[error("backend unreachable")]
    Connectivity {
        /// Human-readable failure description.
        detail: String,
    },
    /// A backend call failed mid-session.
    #[error("backend operation failed")]
    Backend {
        /// Operation identifier.
        operation: &'static str,
        /// Underlying failure.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// A value could not be parsed as a canonical info hash.
    #[error("invalid info hash")]
    InvalidHash {
        /// Offending value.
        value: String,
    },
    /// A backend-native record could not be normalized.
    #[error("invalid torrent record")]
    InvalidRecord {
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

/// Convenience alias for torrent client results.
pub type ClientResult<T> = Result<T, ClientError>;
