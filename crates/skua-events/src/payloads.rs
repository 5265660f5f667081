//! Event payload types carried across the runtime.

use chrono::{DateTime, Utc};

/// Identifier assigned to each event emitted by the runtime.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed application events surfaced across the system.
///
/// Torrent-level update/removal traffic does not travel here; it flows
/// through the per-catalog [`crate::UpdateRouter`] channels instead. This
/// bus carries the coarse lifecycle signals several independent consumers
/// care about, most importantly `client_connected`, which doubles as the
/// reconnect trigger for anything that subscribes per session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A torrent client finished its handshake and started polling.
    ClientConnected {
        /// Directory name of the client that connected.
        client: String,
    },
    /// A torrent client was explicitly disconnected.
    ClientDisconnected {
        /// Directory name of the client that disconnected.
        client: String,
    },
    /// The application launched a download whose hash is now tracked.
    TorrentLaunched {
        /// Directory name of the client the torrent was handed to.
        client: String,
        /// Canonical info hash of the launched torrent.
        hash: String,
    },
    /// Persisted settings changed.
    SettingsChanged {
        /// Human-readable description of what changed.
        description: String,
    },
}

impl Event {
    /// Machine-friendly discriminator, used for log fields and metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Event::ClientConnected { .. } => "client_connected",
            Event::ClientDisconnected { .. } => "client_disconnected",
            Event::TorrentLaunched { .. } => "torrent_launched",
            Event::SettingsChanged { .. } => "settings_changed",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and
/// emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Sequential identifier assigned at publish time.
    pub id: EventId,
    /// Timestamp when the event was published.
    pub timestamp: DateTime<Utc>,
    /// Event payload.
    pub event: Event,
}
