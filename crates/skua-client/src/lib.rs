//! Connection lifecycle, per-client torrent catalog, and client directory.
//!
//! This crate is the heart of the integration layer: it drives one poll
//! loop per configured torrent client, normalizes whatever the backend
//! reports into the shared record shape, detects removals by diffing
//! consecutive active lists, and fans updates out to hash-scoped and
//! wildcard subscribers.
//!
//! Layout: `client.rs` (connection state machine + poll loop),
//! `catalog.rs` (record index and update/removal events), `directory.rs`
//! (named registration and active-client selection).

pub mod catalog;
pub mod client;
pub mod directory;

pub use catalog::TorrentCatalog;
pub use client::{ConnectionState, POLL_INTERVAL, PROBE_TIMEOUT, RETRY_DELAY, TorrentClient};
pub use directory::ClientDirectory;
