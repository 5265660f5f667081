//! Telemetry primitives shared across the Skua workspace.
//!
//! Layout: `init.rs` (tracing subscriber setup and build metadata),
//! `metrics.rs` (prometheus registry and counters). Centralising both
//! keeps every crate's observability story identical.

pub mod init;
pub mod metrics;

pub use init::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, build_sha, init_logging};
pub use metrics::{Metrics, MetricsSnapshot};
