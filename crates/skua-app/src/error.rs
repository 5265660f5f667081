//! # Design
//!
//! - Centralize application-level errors for bootstrap and shutdown.
//! - Keep error messages constant while carrying context fields for debugging.
//! - Preserve source errors without re-logging at call sites.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Settings store operations failed.
    #[error("configuration operation failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: skua_config::ConfigError,
    },
    /// Hash ledger operations failed.
    #[error("ledger operation failed")]
    Ledger {
        /// Operation identifier.
        operation: &'static str,
        /// Source ledger error.
        source: skua_ledger::LedgerError,
    },
    /// Telemetry operations failed.
    #[error("telemetry operation failed")]
    Telemetry {
        /// Operation identifier.
        operation: &'static str,
        /// Source telemetry error.
        source: anyhow::Error,
    },
    /// IO operations failed.
    #[error("io operation failed")]
    Io {
        /// Operation identifier.
        operation: &'static str,
        /// Optional path involved in the failure.
        path: Option<PathBuf>,
        /// Source IO error.
        source: io::Error,
    },
}

impl AppError {
    pub(crate) const fn config(operation: &'static str, source: skua_config::ConfigError) -> Self {
        Self::Config { operation, source }
    }

    pub(crate) const fn ledger(operation: &'static str, source: skua_ledger::LedgerError) -> Self {
        Self::Ledger { operation, source }
    }

    pub(crate) fn telemetry(operation: &'static str, source: anyhow::Error) -> Self {
        Self::Telemetry { operation, source }
    }

    pub(crate) fn io(operation: &'static str, path: Option<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helpers_build_variants() {
        let config = AppError::config(
            "settings.open",
            skua_config::ConfigError::InvalidValue {
                key: "torrenting.client".into(),
                reason: "not a string",
            },
        );
        assert!(matches!(config, AppError::Config { .. }));

        let io = AppError::io(
            "data_dir.create",
            Some(PathBuf::from("./data")),
            io::Error::other("io"),
        );
        assert!(matches!(io, AppError::Io { .. }));

        let telemetry = AppError::telemetry("telemetry.init", anyhow::anyhow!("subscriber set"));
        assert!(matches!(telemetry, AppError::Telemetry { .. }));
    }
}
