//! Connection state machine and poll loop for one torrent client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use skua_events::{Event, EventBus};
use skua_ledger::HashLedger;
use skua_telemetry::Metrics;
use skua_torrent_core::{
    AddOptions, ClientError, ClientResult, EpisodeStore, InfoHash, TorrentBackend,
    TorrentFileEntry, magnet_info_hash,
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::catalog::TorrentCatalog;

/// Upper bound on the connectivity probe; a timeout means "backend absent
/// here", not a failure worth surfacing.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(850);

/// Fixed delay before retrying a failed handshake. No exponential backoff.
pub const RETRY_DELAY: Duration = Duration::from_secs(15);

/// Delay between the resolution of one active-list fetch and the start of
/// the next. Fetches for one client never overlap.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Observable connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session; nothing scheduled.
    Disconnected,
    /// A handshake probe is in flight; concurrent callers share it.
    Connecting,
    /// Session established; the poll loop is running.
    Connected,
    /// Last probe failed; a fixed-delay retry is scheduled.
    OfflineRetry,
}

enum ConnState {
    Disconnected,
    Connecting(watch::Receiver<Option<bool>>),
    Connected,
    OfflineRetry,
}

impl ConnState {
    const fn snapshot(&self) -> ConnectionState {
        match self {
            ConnState::Disconnected => ConnectionState::Disconnected,
            ConnState::Connecting(_) => ConnectionState::Connecting,
            ConnState::Connected => ConnectionState::Connected,
            ConnState::OfflineRetry => ConnectionState::OfflineRetry,
        }
    }
}

/// Lifecycle manager for one configured torrent backend.
///
/// Owns the backend adapter and the catalog it feeds. Cheap to clone;
/// clones share one state machine.
#[derive(Clone)]
pub struct TorrentClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    name: String,
    backend: Arc<dyn TorrentBackend>,
    catalog: TorrentCatalog,
    ledger: HashLedger,
    events: EventBus,
    metrics: Metrics,
    state: Mutex<ConnState>,
    // Bumped on disconnect so in-flight probes, retry timers, and poll
    // iterations from the old session resolve into nothing.
    epoch: AtomicU64,
}

impl TorrentClient {
    /// Construct a client around a backend adapter.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn TorrentBackend>,
        ledger: HashLedger,
        episodes: Arc<dyn EpisodeStore>,
        events: EventBus,
        metrics: Metrics,
    ) -> Self {
        let catalog = TorrentCatalog::new(ledger.clone(), episodes, metrics.clone());
        Self {
            inner: Arc::new(ClientInner {
                name: name.into(),
                backend,
                catalog,
                ledger,
                events,
                metrics,
                state: Mutex::new(ConnState::Disconnected),
                epoch: AtomicU64::new(0),
            }),
        }
    }

    /// Directory name of this client.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The catalog this client's poll loop feeds.
    #[must_use]
    pub fn catalog(&self) -> &TorrentCatalog {
        &self.inner.catalog
    }

    /// Handle to the backend adapter, for control calls outside the poll
    /// loop (automation rules, user actions).
    #[must_use]
    pub fn backend(&self) -> Arc<dyn TorrentBackend> {
        Arc::clone(&self.inner.backend)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.lock_state().snapshot()
    }

    /// Whether a session is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Establish a session, idempotently.
    ///
    /// Already connected: resolves immediately. A probe in flight:
    /// awaits the shared outcome; at most one handshake attempt exists
    /// per client at any time. Otherwise runs the probe under
    /// [`PROBE_TIMEOUT`]; on failure the state drops to `OfflineRetry`,
    /// a single retry fires after [`RETRY_DELAY`], and this call returns
    /// [`ClientError::NotConnected`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when the probe fails or
    /// times out; the retry timer keeps running regardless.
    pub async fn connect(&self) -> ClientResult<()> {
        let mut rx = {
            let mut state = self.inner.lock_state();
            match &*state {
                ConnState::Connected => return Ok(()),
                ConnState::Connecting(rx) => rx.clone(),
                ConnState::Disconnected | ConnState::OfflineRetry => {
                    self.inner.begin_attempt(&mut state)
                }
            }
        };

        match rx.wait_for(|outcome| outcome.is_some()).await {
            Ok(outcome) if *outcome == Some(true) => Ok(()),
            _ => Err(ClientError::NotConnected),
        }
    }

    /// Tear the session down immediately: polling stops, the catalog and
    /// all of its subscriptions are cleared, and any in-flight probe or
    /// fetch resolves into nothing. Not graceful, no draining.
    pub fn disconnect(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        *self.inner.lock_state() = ConnState::Disconnected;
        self.inner.catalog.clear();
        info!(client = %self.inner.name, "client disconnected");
        let _ = self.inner.events.publish(Event::ClientDisconnected {
            client: self.inner.name.clone(),
        });
        self.inner.metrics.record_event("client_disconnected");
    }

    /// Whether add operations honor a download directory override.
    #[must_use]
    pub fn supports_download_dir(&self) -> bool {
        self.inner.backend.supports_download_dir()
    }

    /// Whether add operations honor a label/category.
    #[must_use]
    pub fn supports_label(&self) -> bool {
        self.inner.backend.supports_label()
    }

    /// Hand a magnet URI to the backend, registering its hash in the
    /// ledger when the URI carries one.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when no session can be
    /// established, or the backend's own failure (including
    /// [`ClientError::Unsupported`]).
    pub async fn add_magnet(&self, uri: &str, options: &AddOptions) -> ClientResult<()> {
        self.connect().await?;
        self.inner.backend.add_magnet(uri, options).await?;
        if let Some(hash) = magnet_info_hash(uri) {
            self.track_launch(&hash);
        } else {
            debug!(client = %self.inner.name, "magnet carried no v1 hash; launch not tracked");
        }
        Ok(())
    }

    /// Hand a `.torrent` URL to the backend and register the resulting
    /// hash in the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when no session can be
    /// established, or the backend's own failure (including
    /// [`ClientError::Unsupported`]).
    pub async fn add_torrent_by_url(
        &self,
        url: &str,
        info_hash: &InfoHash,
        release_name: &str,
        options: &AddOptions,
    ) -> ClientResult<InfoHash> {
        self.connect().await?;
        let hash = self
            .inner
            .backend
            .add_torrent_by_url(url, info_hash, release_name, options)
            .await?;
        self.track_launch(&hash);
        Ok(hash)
    }

    /// Upload raw `.torrent` bytes to the backend and register the
    /// resulting hash in the ledger.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when no session can be
    /// established, or the backend's own failure (including
    /// [`ClientError::Unsupported`]).
    pub async fn add_torrent_by_upload(
        &self,
        payload: &[u8],
        info_hash: &InfoHash,
        release_name: &str,
        options: &AddOptions,
    ) -> ClientResult<InfoHash> {
        self.connect().await?;
        let hash = self
            .inner
            .backend
            .add_torrent_by_upload(payload, info_hash, release_name, options)
            .await?;
        self.track_launch(&hash);
        Ok(hash)
    }

    /// Fetch the file listing for one torrent.
    ///
    /// # Errors
    ///
    /// Returns the backend's failure when the listing cannot be fetched.
    pub async fn files(&self, hash: &InfoHash) -> ClientResult<Vec<TorrentFileEntry>> {
        self.inner.backend.fetch_files(hash).await
    }

    /// Start a torrent at the backend.
    ///
    /// # Errors
    ///
    /// Returns the backend's failure, including [`ClientError::Unsupported`].
    pub async fn start_torrent(&self, hash: &InfoHash) -> ClientResult<()> {
        self.inner.backend.start(hash).await
    }

    /// Stop a torrent at the backend. Safe to repeat; backends treat
    /// stopping a stopped torrent as a no-op.
    ///
    /// # Errors
    ///
    /// Returns the backend's failure, including [`ClientError::Unsupported`].
    pub async fn stop_torrent(&self, hash: &InfoHash) -> ClientResult<()> {
        self.inner.backend.stop(hash).await
    }

    /// Pause a torrent at the backend.
    ///
    /// # Errors
    ///
    /// Returns the backend's failure, including [`ClientError::Unsupported`].
    pub async fn pause_torrent(&self, hash: &InfoHash) -> ClientResult<()> {
        self.inner.backend.pause(hash).await
    }

    /// Remove a torrent at the backend. The catalog notices on the next
    /// poll via the active-list diff.
    ///
    /// # Errors
    ///
    /// Returns the backend's failure, including [`ClientError::Unsupported`].
    pub async fn remove_torrent(&self, hash: &InfoHash) -> ClientResult<()> {
        self.inner.backend.remove(hash).await
    }

    fn track_launch(&self, hash: &InfoHash) {
        if let Err(err) = self.inner.ledger.insert(hash) {
            warn!(client = %self.inner.name, hash = %hash, error = %err, "failed to persist launched hash");
        }
        let _ = self.inner.events.publish(Event::TorrentLaunched {
            client: self.inner.name.clone(),
            hash: hash.to_string(),
        });
        self.inner.metrics.record_event("torrent_launched");
    }
}

impl ClientInner {
    fn lock_state(&self) -> MutexGuard<'_, ConnState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn begin_attempt(self: &Arc<Self>, state: &mut ConnState) -> watch::Receiver<Option<bool>> {
        let (tx, rx) = watch::channel(None);
        *state = ConnState::Connecting(rx.clone());
        let inner = Arc::clone(self);
        let epoch = self.epoch.load(Ordering::SeqCst);
        tokio::spawn(async move {
            inner.run_attempt(epoch, tx).await;
        });
        rx
    }

    async fn run_attempt(self: Arc<Self>, epoch: u64, tx: watch::Sender<Option<bool>>) {
        let probe = tokio::time::timeout(PROBE_TIMEOUT, self.backend.probe()).await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            // disconnect() raced the probe; drop the result on the floor
            let _ = tx.send(Some(false));
            return;
        }

        let reachable = matches!(probe, Ok(Ok(true)));
        if reachable {
            *self.lock_state() = ConnState::Connected;
            info!(client = %self.name, "client connected");
            let _ = self.events.publish(Event::ClientConnected {
                client: self.name.clone(),
            });
            self.metrics.record_event("client_connected");
            self.spawn_poll_loop(epoch);
            let _ = tx.send(Some(true));
            return;
        }

        match probe {
            Ok(Ok(_)) => debug!(client = %self.name, "probe refused"),
            Ok(Err(err)) => debug!(client = %self.name, error = %err, "probe failed"),
            Err(_) => debug!(client = %self.name, "probe timed out"),
        }
        *self.lock_state() = ConnState::OfflineRetry;
        let _ = tx.send(Some(false));
        self.spawn_retry_timer(epoch);
    }

    fn spawn_retry_timer(self: &Arc<Self>, epoch: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(RETRY_DELAY).await;
            if inner.epoch.load(Ordering::SeqCst) != epoch {
                return;
            }
            let mut state = inner.lock_state();
            if matches!(*state, ConnState::OfflineRetry) {
                debug!(client = %inner.name, "retrying handshake");
                let _ = inner.begin_attempt(&mut state);
            }
        });
    }

    fn spawn_poll_loop(self: &Arc<Self>, epoch: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if inner.epoch.load(Ordering::SeqCst) != epoch
                    || !matches!(*inner.lock_state(), ConnState::Connected)
                {
                    break;
                }

                match inner.backend.fetch_torrents().await {
                    Ok(raw_list) => {
                        if inner.epoch.load(Ordering::SeqCst) != epoch {
                            break;
                        }
                        inner.metrics.record_poll_cycle(&inner.name);
                        let mut batch = Vec::with_capacity(raw_list.len());
                        for raw in &raw_list {
                            match inner.backend.normalize(raw) {
                                Ok(record) => batch.push(record),
                                Err(err) => {
                                    debug!(client = %inner.name, error = %err, "dropping unnormalizable record");
                                }
                            }
                        }
                        inner.catalog.ingest(batch).await;
                        inner
                            .metrics
                            .set_active_torrents(i64::try_from(inner.catalog.len()).unwrap_or(i64::MAX));
                    }
                    Err(err) => {
                        // The backend flagged an error mid-session; halt
                        // until an external trigger reconnects us. The
                        // catalog is cleared like on disconnect so the
                        // session's subscriber streams end with it.
                        debug!(client = %inner.name, error = %err, "poll failed; halting");
                        if inner.epoch.load(Ordering::SeqCst) == epoch {
                            inner.epoch.fetch_add(1, Ordering::SeqCst);
                            *inner.lock_state() = ConnState::Disconnected;
                            inner.catalog.clear();
                        }
                        break;
                    }
                }

                tokio::time::sleep(POLL_INTERVAL).await;
            }
        });
    }
}
