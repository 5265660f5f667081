use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use skua_automation::AutomationHooks;
use skua_client::{ClientDirectory, TorrentClient};
use skua_config::SettingsStore;
use skua_events::{Event, EventBus};
use skua_ledger::HashLedger;
use skua_telemetry::{LoggingConfig, Metrics, init_logging};
use skua_torrent_core::{EpisodeRef, EpisodeStore, InfoHash, Notifier, TorrentBackend};

use crate::error::{AppError, AppResult};

/// Environment variable naming the directory durable state lives under.
pub const DATA_DIR_ENV: &str = "SKUA_DATA_DIR";

const DEFAULT_DATA_DIR: &str = "./data";
const LEDGER_FILE: &str = "hashes.json";
const SETTINGS_FILE: &str = "settings.json";

/// Fully wired application services.
///
/// Construction opens the durable stores but starts nothing; callers
/// register backend adapters, then spawn the event listener and connect
/// clients in whatever order suits them.
pub struct AppContext {
    settings: SettingsStore,
    ledger: HashLedger,
    events: EventBus,
    metrics: Metrics,
    episodes: Arc<dyn EpisodeStore>,
    directory: Arc<ClientDirectory>,
    automation: AutomationHooks,
}

impl AppContext {
    /// Open the durable stores under `data_dir` and wire the services.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created, a durable
    /// store cannot be opened, or the metrics registry fails to build.
    pub fn new(
        data_dir: &Path,
        episodes: Arc<dyn EpisodeStore>,
        notifier: Arc<dyn Notifier>,
    ) -> AppResult<Self> {
        std::fs::create_dir_all(data_dir).map_err(|err| {
            AppError::io("data_dir.create", Some(data_dir.to_path_buf()), err)
        })?;

        let ledger = HashLedger::open(data_dir.join(LEDGER_FILE))
            .map_err(|err| AppError::ledger("ledger.open", err))?;
        let settings = SettingsStore::open(data_dir.join(SETTINGS_FILE))
            .map_err(|err| AppError::config("settings.open", err))?;
        let events = EventBus::new();
        let metrics = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
        let directory = Arc::new(ClientDirectory::new(settings.clone()));
        let automation = AutomationHooks::new(
            settings.clone(),
            ledger.clone(),
            Arc::clone(&episodes),
            notifier,
            metrics.clone(),
        );

        Ok(Self {
            settings,
            ledger,
            events,
            metrics,
            episodes,
            directory,
            automation,
        })
    }

    /// Open the context under the directory named by `SKUA_DATA_DIR`.
    ///
    /// # Errors
    ///
    /// Propagates the failures of [`AppContext::new`].
    pub fn from_env(
        episodes: Arc<dyn EpisodeStore>,
        notifier: Arc<dyn Notifier>,
    ) -> AppResult<Self> {
        let data_dir = data_dir_from(std::env::var(DATA_DIR_ENV).ok());
        Self::new(&data_dir, episodes, notifier)
    }

    /// Build a client around a backend adapter and register it under its
    /// directory name. Re-registering a name replaces the previous client.
    pub fn register_backend(
        &self,
        name: impl Into<String>,
        backend: Arc<dyn TorrentBackend>,
    ) -> TorrentClient {
        let name = name.into();
        let client = TorrentClient::new(
            name.clone(),
            backend,
            self.ledger.clone(),
            Arc::clone(&self.episodes),
            self.events.clone(),
            self.metrics.clone(),
        );
        self.directory.register(name, client.clone());
        client
    }

    /// Spawn the lifecycle listener.
    ///
    /// On each `client_connected` event it attaches the automation rules
    /// to that client's fresh catalog stream. The per-session attach is
    /// what survives reconnects: a disconnect ends the old stream, and
    /// the next connection event binds a new one.
    pub fn spawn_event_listener(&self) -> JoinHandle<()> {
        let mut stream = self.events.subscribe();
        let directory = Arc::clone(&self.directory);
        let automation = self.automation.clone();
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                let envelope = match item {
                    Ok(envelope) => envelope,
                    Err(lag) => {
                        warn!(error = %lag, "event listener lagged; events skipped");
                        continue;
                    }
                };
                if let Event::ClientConnected { client } = &envelope.event {
                    match directory.get(client) {
                        Some(handle) => {
                            let _rules = automation
                                .attach(handle.catalog().subscribe_all(), handle.backend());
                            info!(client, "automation attached to connected client");
                        }
                        None => warn!(client, "connected client missing from directory"),
                    }
                }
            }
        })
    }

    /// Disconnect every registered client.
    pub fn disconnect_all(&self) {
        for name in self.directory.names() {
            if let Some(client) = self.directory.get(&name) {
                client.disconnect();
            }
        }
    }

    /// Settings store backing the context.
    #[must_use]
    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Durable hash ledger backing the context.
    #[must_use]
    pub fn ledger(&self) -> &HashLedger {
        &self.ledger
    }

    /// Lifecycle event bus.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Metrics registry shared by every service.
    #[must_use]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Directory of registered clients.
    #[must_use]
    pub fn directory(&self) -> &ClientDirectory {
        &self.directory
    }
}

fn data_dir_from(value: Option<String>) -> PathBuf {
    match value {
        Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(DEFAULT_DATA_DIR),
    }
}

/// Episode store used when no media library is wired in.
pub struct UnlinkedEpisodes;

#[async_trait]
impl EpisodeStore for UnlinkedEpisodes {
    async fn find_by_hash(&self, _hash: &InfoHash) -> anyhow::Result<Option<EpisodeRef>> {
        Ok(None)
    }

    async fn mark_downloaded(&self, _episode: &EpisodeRef) -> anyhow::Result<()> {
        Ok(())
    }

    async fn unlink(&self, _hash: &InfoHash) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Notifier that surfaces notifications as structured log lines.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, title: &str, message: &str) {
        info!(title, message, "notification");
    }
}

/// Entry point for the application boot sequence.
///
/// # Errors
///
/// Returns an error if logging setup or context construction fails, or if
/// waiting on the shutdown signal fails.
pub async fn run_app() -> AppResult<()> {
    init_logging(&LoggingConfig::default())
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    let context = AppContext::from_env(Arc::new(UnlinkedEpisodes), Arc::new(LogNotifier))?;
    run_app_with(context).await
}

/// Boot sequence that relies entirely on an injected context to simplify testing.
pub(crate) async fn run_app_with(context: AppContext) -> AppResult<()> {
    info!(
        ledger = %context.ledger.path().display(),
        settings = %context.settings.path().display(),
        "application bootstrap starting"
    );

    let listener = context.spawn_event_listener();

    if let Some(client) = context.directory.active() {
        info!(client = client.name(), "connecting active client");
        if let Err(err) = client.connect().await {
            warn!(client = client.name(), error = %err, "active client offline; retrying in background");
        }
    } else {
        info!("no active client configured");
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|err| AppError::io("signal.ctrl_c", None, err))?;
    info!("shutdown signal received");

    context.disconnect_all();
    listener.abort();
    let _ = listener.await;

    info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use skua_config::AutoStopPolicy;
    use skua_test_support::fixtures::{episode, raw_record, sample_hash, scratch_dir};
    use skua_test_support::mocks::{MemoryEpisodeStore, RecordingNotifier, ScriptedBackend};
    use skua_torrent_core::AddOptions;

    fn context_in(dir: &Path) -> AppContext {
        AppContext::new(
            dir,
            Arc::new(MemoryEpisodeStore::new()),
            Arc::new(RecordingNotifier::new()),
        )
        .expect("context")
    }

    #[test]
    fn data_dir_falls_back_to_default() {
        assert_eq!(data_dir_from(None), PathBuf::from(DEFAULT_DATA_DIR));
        assert_eq!(
            data_dir_from(Some(String::new())),
            PathBuf::from(DEFAULT_DATA_DIR)
        );
        assert_eq!(
            data_dir_from(Some("/var/lib/skua".to_owned())),
            PathBuf::from("/var/lib/skua")
        );
    }

    #[tokio::test]
    async fn registered_backend_is_reachable_through_the_directory() {
        let dir = scratch_dir();
        let context = context_in(dir.path());

        let client = context.register_backend("uTorrent", Arc::new(ScriptedBackend::new()));
        assert_eq!(client.name(), "uTorrent");
        assert!(context.directory().get("uTorrent").is_some());
        assert!(context.directory().active().is_none());

        context
            .settings()
            .set_active_client("uTorrent")
            .expect("active");
        let active = context.directory().active().expect("active client");
        assert_eq!(active.name(), "uTorrent");
    }

    #[tokio::test(start_paused = true)]
    async fn listener_attaches_automation_on_connect() {
        let dir = scratch_dir();
        let context = context_in(dir.path());
        context
            .settings()
            .set_auto_stop_policy(AutoStopPolicy::All)
            .expect("policy");

        let backend = Arc::new(ScriptedBackend::new());
        let hash = sample_hash(0x7E);
        backend.set_default_frame(vec![raw_record(&hash, "finished", 100.0, true)]);

        let listener = context.spawn_event_listener();
        let client = context.register_backend("Transmission", Arc::clone(&backend) as Arc<dyn TorrentBackend>);
        client.connect().await.expect("connect");

        let mut stopped = false;
        for _ in 0..50 {
            if !backend.stop_calls().is_empty() {
                stopped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(stopped, "auto-stop never reached the backend");
        assert_eq!(backend.stop_calls()[0], hash);

        client.disconnect();
        listener.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_after_poll_halt_keeps_a_single_automation_consumer() {
        let dir = scratch_dir();
        let context = context_in(dir.path());
        context
            .settings()
            .set_auto_stop_policy(AutoStopPolicy::All)
            .expect("policy");

        let backend = Arc::new(ScriptedBackend::new());
        backend.push_error_frame("session expired");
        let hash = sample_hash(0x77);

        let listener = context.spawn_event_listener();
        let client =
            context.register_backend("Deluge", Arc::clone(&backend) as Arc<dyn TorrentBackend>);

        client.connect().await.expect("connect");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!client.is_connected());

        // One complete frame on the next session; later polls return an
        // empty list so the record is delivered exactly once.
        backend.push_frame(vec![raw_record(&hash, "finished", 100.0, true)]);
        client.connect().await.expect("reconnect");

        let mut stopped = false;
        for _ in 0..50 {
            if !backend.stop_calls().is_empty() {
                stopped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(stopped, "auto-stop never reached the backend");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(
            backend.stop_calls(),
            vec![hash],
            "one complete update must trigger exactly one stop"
        );

        client.disconnect();
        listener.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn launched_magnet_is_marked_downloaded_when_the_poll_reports_completion() {
        let dir = scratch_dir();
        let episodes = Arc::new(MemoryEpisodeStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let context = AppContext::new(
            dir.path(),
            Arc::clone(&episodes) as Arc<dyn EpisodeStore>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
        )
        .expect("context");

        let backend = Arc::new(ScriptedBackend::new());
        let hash = sample_hash(0x2A);
        let linked = episode("Show", "S01E04");
        episodes.link(hash.clone(), linked.clone());
        backend.set_default_frame(vec![raw_record(&hash, "Show.S01E04", 100.0, true)]);

        let listener = context.spawn_event_listener();
        let client = context
            .register_backend("qBittorrent", Arc::clone(&backend) as Arc<dyn TorrentBackend>);
        let uri = format!("magnet:?xt=urn:btih:{hash}&dn=Show.S01E04");
        client
            .add_magnet(&uri, &AddOptions::default())
            .await
            .expect("add magnet");

        assert!(context.ledger().contains(&hash));
        assert!(!context.ledger().is_downloaded(&hash));

        let mut downloaded = false;
        for _ in 0..50 {
            if context.ledger().is_downloaded(&hash) {
                downloaded = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        assert!(downloaded, "completion never reached the ledger");
        assert_eq!(episodes.downloaded_episodes(), vec![linked.id]);
        assert_eq!(
            notifier.notifications(),
            vec![("Download complete".to_owned(), "Show - S01E04".to_owned())]
        );

        client.disconnect();
        listener.abort();
    }
}
