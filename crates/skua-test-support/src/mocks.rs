//! Scripted backend and in-memory collaborators for integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use skua_torrent_core::{
    AddOptions, ClientError, ClientResult, EpisodeRef, EpisodeStore, InfoHash, Notifier,
    RawTorrent, TorrentBackend, TorrentFileEntry, TorrentRecord, quantize_progress,
};
use uuid::Uuid;

/// One scripted reply to an active-list fetch.
#[derive(Debug, Clone)]
pub enum Frame {
    /// Return this list.
    List(Vec<RawTorrent>),
    /// Fail the fetch with this detail.
    Error(String),
}

/// Backend test double driven by queued probe outcomes and poll frames.
///
/// Field naming in `normalize` mirrors a real adapter: `hash`, `name`,
/// `progress`, `rate_bps`, `started`, `download_dir`.
#[derive(Default)]
pub struct ScriptedBackend {
    probe_outcomes: Mutex<VecDeque<Result<bool, String>>>,
    probe_delay: Mutex<Duration>,
    probe_calls: AtomicUsize,
    frames: Mutex<VecDeque<Frame>>,
    default_frame: Mutex<Vec<RawTorrent>>,
    fetch_calls: AtomicUsize,
    files: Mutex<Vec<TorrentFileEntry>>,
    stop_calls: Mutex<Vec<InfoHash>>,
    start_calls: Mutex<Vec<InfoHash>>,
    remove_calls: Mutex<Vec<InfoHash>>,
    magnets_added: Mutex<Vec<String>>,
    adds_enabled: AtomicBool,
    supports_dir: AtomicBool,
    supports_label: AtomicBool,
}

impl ScriptedBackend {
    /// Construct a backend that connects successfully and reports an
    /// empty active list until scripted otherwise.
    #[must_use]
    pub fn new() -> Self {
        let backend = Self::default();
        backend.adds_enabled.store(true, Ordering::SeqCst);
        backend
    }

    /// Queue one probe outcome; unqueued probes succeed.
    pub fn push_probe(&self, outcome: Result<bool, String>) {
        lock(&self.probe_outcomes).push_back(outcome);
    }

    /// Delay every probe by this long before it resolves.
    pub fn set_probe_delay(&self, delay: Duration) {
        *lock(&self.probe_delay) = delay;
    }

    /// Number of probes issued so far.
    #[must_use]
    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    /// Queue one active-list frame.
    pub fn push_frame(&self, list: Vec<RawTorrent>) {
        lock(&self.frames).push_back(Frame::List(list));
    }

    /// Queue one failing fetch.
    pub fn push_error_frame(&self, detail: impl Into<String>) {
        lock(&self.frames).push_back(Frame::Error(detail.into()));
    }

    /// List returned whenever the frame queue is empty.
    pub fn set_default_frame(&self, list: Vec<RawTorrent>) {
        *lock(&self.default_frame) = list;
    }

    /// Number of active-list fetches issued so far.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// File listing returned by `fetch_files`.
    pub fn set_files(&self, files: Vec<TorrentFileEntry>) {
        *lock(&self.files) = files;
    }

    /// Hashes stopped so far, in call order.
    #[must_use]
    pub fn stop_calls(&self) -> Vec<InfoHash> {
        lock(&self.stop_calls).clone()
    }

    /// Hashes started so far, in call order.
    #[must_use]
    pub fn start_calls(&self) -> Vec<InfoHash> {
        lock(&self.start_calls).clone()
    }

    /// Hashes removed so far, in call order.
    #[must_use]
    pub fn remove_calls(&self) -> Vec<InfoHash> {
        lock(&self.remove_calls).clone()
    }

    /// Magnet URIs handed to the backend so far.
    #[must_use]
    pub fn magnets_added(&self) -> Vec<String> {
        lock(&self.magnets_added).clone()
    }

    /// Toggle whether the add operations are implemented.
    pub fn set_adds_enabled(&self, enabled: bool) {
        self.adds_enabled.store(enabled, Ordering::SeqCst);
    }

    /// Toggle the download-directory capability flag.
    pub fn set_supports_download_dir(&self, supported: bool) {
        self.supports_dir.store(supported, Ordering::SeqCst);
    }

    /// Toggle the label capability flag.
    pub fn set_supports_label(&self, supported: bool) {
        self.supports_label.store(supported, Ordering::SeqCst);
    }
}

#[async_trait]
impl TorrentBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn probe(&self) -> ClientResult<bool> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.probe_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match lock(&self.probe_outcomes).pop_front() {
            None => Ok(true),
            Some(Ok(reachable)) => Ok(reachable),
            Some(Err(detail)) => Err(ClientError::Connectivity { detail }),
        }
    }

    async fn fetch_torrents(&self) -> ClientResult<Vec<RawTorrent>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        match lock(&self.frames).pop_front() {
            None => Ok(lock(&self.default_frame).clone()),
            Some(Frame::List(list)) => Ok(list),
            Some(Frame::Error(detail)) => Err(ClientError::Backend {
                operation: "fetch_torrents",
                source: detail.into(),
            }),
        }
    }

    fn normalize(&self, raw: &RawTorrent) -> ClientResult<TorrentRecord> {
        let hash = raw
            .string_field("hash")
            .ok_or(ClientError::InvalidRecord {
                reason: "missing hash",
            })
            .and_then(InfoHash::parse)?;
        let name = raw.string_field("name").unwrap_or_default().to_string();
        let mut record = TorrentRecord::new(hash, name);
        record.progress = quantize_progress(raw.number_field("progress").unwrap_or(0.0));
        record.download_rate_bps = raw
            .number_field("rate_bps")
            .map_or(0, |rate| rate.max(0.0) as u64);
        record.started = raw.bool_field("started").unwrap_or(false);
        record.download_dir = raw.string_field("download_dir").map(str::to_string);
        record.native = raw.fields.clone();
        Ok(record)
    }

    async fn fetch_files(&self, _hash: &InfoHash) -> ClientResult<Vec<TorrentFileEntry>> {
        Ok(lock(&self.files).clone())
    }

    async fn add_magnet(&self, uri: &str, _options: &AddOptions) -> ClientResult<()> {
        if !self.adds_enabled.load(Ordering::SeqCst) {
            return Err(ClientError::Unsupported {
                operation: "add_magnet",
            });
        }
        lock(&self.magnets_added).push(uri.to_string());
        Ok(())
    }

    async fn add_torrent_by_url(
        &self,
        _url: &str,
        info_hash: &InfoHash,
        _release_name: &str,
        _options: &AddOptions,
    ) -> ClientResult<InfoHash> {
        if !self.adds_enabled.load(Ordering::SeqCst) {
            return Err(ClientError::Unsupported {
                operation: "add_torrent_by_url",
            });
        }
        Ok(info_hash.clone())
    }

    async fn add_torrent_by_upload(
        &self,
        _payload: &[u8],
        info_hash: &InfoHash,
        _release_name: &str,
        _options: &AddOptions,
    ) -> ClientResult<InfoHash> {
        if !self.adds_enabled.load(Ordering::SeqCst) {
            return Err(ClientError::Unsupported {
                operation: "add_torrent_by_upload",
            });
        }
        Ok(info_hash.clone())
    }

    async fn start(&self, hash: &InfoHash) -> ClientResult<()> {
        lock(&self.start_calls).push(hash.clone());
        Ok(())
    }

    async fn stop(&self, hash: &InfoHash) -> ClientResult<()> {
        lock(&self.stop_calls).push(hash.clone());
        Ok(())
    }

    async fn pause(&self, hash: &InfoHash) -> ClientResult<()> {
        let _ = hash;
        Ok(())
    }

    async fn remove(&self, hash: &InfoHash) -> ClientResult<()> {
        lock(&self.remove_calls).push(hash.clone());
        Ok(())
    }

    fn supports_download_dir(&self) -> bool {
        self.supports_dir.load(Ordering::SeqCst)
    }

    fn supports_label(&self) -> bool {
        self.supports_label.load(Ordering::SeqCst)
    }
}

/// In-memory episode store recording every unlink and mark call.
#[derive(Default)]
pub struct MemoryEpisodeStore {
    linked: Mutex<HashMap<InfoHash, EpisodeRef>>,
    unlink_calls: Mutex<Vec<InfoHash>>,
    downloaded: Mutex<Vec<Uuid>>,
}

impl MemoryEpisodeStore {
    /// Construct an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Link a hash to an episode.
    pub fn link(&self, hash: InfoHash, episode: EpisodeRef) {
        lock(&self.linked).insert(hash, episode);
    }

    /// Every hash unlinked so far, in call order.
    #[must_use]
    pub fn unlink_calls(&self) -> Vec<InfoHash> {
        lock(&self.unlink_calls).clone()
    }

    /// Ids of every episode marked downloaded so far.
    #[must_use]
    pub fn downloaded_episodes(&self) -> Vec<Uuid> {
        lock(&self.downloaded).clone()
    }
}

#[async_trait]
impl EpisodeStore for MemoryEpisodeStore {
    async fn find_by_hash(&self, hash: &InfoHash) -> anyhow::Result<Option<EpisodeRef>> {
        Ok(lock(&self.linked).get(hash).cloned())
    }

    async fn mark_downloaded(&self, episode: &EpisodeRef) -> anyhow::Result<()> {
        lock(&self.downloaded).push(episode.id);
        Ok(())
    }

    async fn unlink(&self, hash: &InfoHash) -> anyhow::Result<()> {
        lock(&self.linked).remove(hash);
        lock(&self.unlink_calls).push(hash.clone());
        Ok(())
    }
}

/// Notifier capturing every notification.
#[derive(Default)]
pub struct RecordingNotifier {
    notifications: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    /// Construct an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(title, message)` pair captured so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<(String, String)> {
        lock(&self.notifications).clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, title: &str, message: &str) {
        lock(&self.notifications).push((title.to_string(), message.to_string()));
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
