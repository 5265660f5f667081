//! Backend-agnostic torrent interfaces and DTOs.
//!
//! Every concrete torrent product (JSON-RPC, XML-RPC, REST scrapers alike)
//! plugs into the runtime through the contracts defined here: a normalized
//! record shape, a backend adapter trait, and the collaborator traits the
//! catalog and automation rules call out to.

pub mod error;
pub mod model;
pub mod service;

pub use error::{ClientError, ClientResult};
pub use model::{
    InfoHash, RawTorrent, RecordEvent, TorrentFileEntry, TorrentRecord, magnet_info_hash,
    quantize_progress,
};
pub use service::{AddOptions, EpisodeRef, EpisodeStore, Notifier, TorrentBackend};
