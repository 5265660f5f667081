//! Error types for settings storage.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for settings operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the settings file failed.
    #[error("settings io failed")]
    Io {
        /// Path the store persists to.
        path: PathBuf,
        /// Underlying io failure.
        #[source]
        source: io::Error,
    },
    /// The settings file held malformed JSON.
    #[error("settings file corrupt")]
    Corrupt {
        /// Path the store persists to.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// A stored value did not match the expected shape.
    #[error("invalid settings value")]
    InvalidValue {
        /// Key whose value failed validation.
        key: String,
        /// Machine-readable reason for the failure.
        reason: &'static str,
    },
}

/// Convenience alias for settings results.
pub type ConfigResult<T> = Result<T, ConfigError>;
