//! Backend adapter and collaborator traits implemented outside this crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};
use crate::model::{InfoHash, RawTorrent, TorrentFileEntry, TorrentRecord};

/// Optional knobs accompanying an add operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddOptions {
    /// Download directory override, honored when the backend supports it.
    pub download_dir: Option<String>,
    /// Label/category applied to the torrent, honored when supported.
    pub label: Option<String>,
}

/// Contract each concrete torrent product implements once.
///
/// Wire-format specifics (RPC payload shapes, scraping selectors, session
/// cookies) live entirely behind this trait. Operations a product cannot
/// express keep the default body and surface [`ClientError::Unsupported`];
/// the caller decides how to degrade.
#[async_trait]
pub trait TorrentBackend: Send + Sync {
    /// Short product name used in logs and the client directory.
    fn name(&self) -> &'static str;

    /// Connectivity and auth probe. `Ok(false)` means the backend answered
    /// but refused the session; both are treated as "absent here".
    async fn probe(&self) -> ClientResult<bool>;

    /// Fetch the full active list in backend-native shape.
    async fn fetch_torrents(&self) -> ClientResult<Vec<RawTorrent>>;

    /// Map one backend-native record into the normalized shape.
    ///
    /// This is the single place a product's field renaming lives, so it
    /// can be unit-tested without a poll loop.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidRecord`] when mandatory fields are
    /// missing or malformed.
    fn normalize(&self, raw: &RawTorrent) -> ClientResult<TorrentRecord>;

    /// Fetch the file listing for one torrent.
    async fn fetch_files(&self, hash: &InfoHash) -> ClientResult<Vec<TorrentFileEntry>>;

    /// Hand a magnet URI to the backend.
    async fn add_magnet(&self, uri: &str, options: &AddOptions) -> ClientResult<()> {
        let _ = (uri, options);
        Err(ClientError::Unsupported {
            operation: "add_magnet",
        })
    }

    /// Hand a `.torrent` URL to the backend, returning the resulting hash.
    async fn add_torrent_by_url(
        &self,
        url: &str,
        info_hash: &InfoHash,
        release_name: &str,
        options: &AddOptions,
    ) -> ClientResult<InfoHash> {
        let _ = (url, info_hash, release_name, options);
        Err(ClientError::Unsupported {
            operation: "add_torrent_by_url",
        })
    }

    /// Upload raw `.torrent` bytes to the backend, returning the hash.
    async fn add_torrent_by_upload(
        &self,
        payload: &[u8],
        info_hash: &InfoHash,
        release_name: &str,
        options: &AddOptions,
    ) -> ClientResult<InfoHash> {
        let _ = (payload, info_hash, release_name, options);
        Err(ClientError::Unsupported {
            operation: "add_torrent_by_upload",
        })
    }

    /// Start a torrent; default reports lack of support.
    async fn start(&self, hash: &InfoHash) -> ClientResult<()> {
        let _ = hash;
        Err(ClientError::Unsupported { operation: "start" })
    }

    /// Stop a torrent. Backends treat stopping an already-stopped torrent
    /// as a no-op, so callers may issue this repeatedly.
    async fn stop(&self, hash: &InfoHash) -> ClientResult<()> {
        let _ = hash;
        Err(ClientError::Unsupported { operation: "stop" })
    }

    /// Pause a torrent; default reports lack of support.
    async fn pause(&self, hash: &InfoHash) -> ClientResult<()> {
        let _ = hash;
        Err(ClientError::Unsupported { operation: "pause" })
    }

    /// Remove a torrent from the backend; default reports lack of support.
    async fn remove(&self, hash: &InfoHash) -> ClientResult<()> {
        let _ = hash;
        Err(ClientError::Unsupported {
            operation: "remove",
        })
    }

    /// Whether add operations honor a download directory override.
    fn supports_download_dir(&self) -> bool {
        false
    }

    /// Whether add operations honor a label/category.
    fn supports_label(&self) -> bool {
        false
    }
}

/// Reference to an episode linked to a launched torrent hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRef {
    /// Stable episode identifier in the external store.
    pub id: Uuid,
    /// Series the episode belongs to.
    pub series: String,
    /// Episode title used in notifications.
    pub title: String,
}

/// Durable episode lookup consumed on removal and completion.
#[async_trait]
pub trait EpisodeStore: Send + Sync {
    /// Look up the episode linked to a hash, if any.
    async fn find_by_hash(&self, hash: &InfoHash) -> anyhow::Result<Option<EpisodeRef>>;

    /// Mark a linked episode as downloaded.
    async fn mark_downloaded(&self, episode: &EpisodeRef) -> anyhow::Result<()>;

    /// Unlink a hash from whatever episode referenced it.
    async fn unlink(&self, hash: &InfoHash) -> anyhow::Result<()>;
}

/// User-facing notification sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Surface a short notification to the user.
    async fn notify(&self, title: &str, message: &str);
}
