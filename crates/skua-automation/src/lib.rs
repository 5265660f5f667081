//! Automation rules evaluated against the wildcard record stream.
//!
//! Two rules run per update, downloaded detection first:
//!
//! 1. **Downloaded detection** flips the durable `downloaded` flag the
//!    first time a tracked hash reports complete, marks the linked
//!    episode, and raises a notification.
//! 2. **Auto-stop** issues a stop command for complete torrents that are
//!    still transferring, gated by the configured policy.
//!
//! Evaluation order matters: a hash stopped by rule 2 may never report
//! again, so rule 1 has to observe the completing update first.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use skua_config::{AutoStopPolicy, SettingsStore};
use skua_events::UpdateStream;
use skua_ledger::HashLedger;
use skua_telemetry::Metrics;
use skua_torrent_core::{
    ClientError, EpisodeStore, Notifier, RecordEvent, TorrentBackend, TorrentRecord,
};

/// Automation rules bound to one settings store, ledger, and episode store.
///
/// One instance serves every client; [`AutomationHooks::attach`] spawns an
/// evaluation task per subscribed stream, so each connected client gets its
/// own consumer while the rules and their collaborators stay shared.
#[derive(Clone)]
pub struct AutomationHooks {
    inner: Arc<HooksInner>,
}

struct HooksInner {
    settings: SettingsStore,
    ledger: HashLedger,
    episodes: Arc<dyn EpisodeStore>,
    notifier: Arc<dyn Notifier>,
    metrics: Metrics,
}

impl AutomationHooks {
    /// Bind the rules to their collaborators.
    #[must_use]
    pub fn new(
        settings: SettingsStore,
        ledger: HashLedger,
        episodes: Arc<dyn EpisodeStore>,
        notifier: Arc<dyn Notifier>,
        metrics: Metrics,
    ) -> Self {
        Self {
            inner: Arc::new(HooksInner {
                settings,
                ledger,
                episodes,
                notifier,
                metrics,
            }),
        }
    }

    /// Consume a record stream, evaluating the rules against every update.
    ///
    /// The task ends when the stream does (catalog reset or client
    /// disconnect). Removed events carry no completion state and are
    /// ignored here; the catalog already handled ledger cleanup.
    pub fn attach(
        &self,
        mut stream: UpdateStream<RecordEvent>,
        backend: Arc<dyn TorrentBackend>,
    ) -> JoinHandle<()> {
        let hooks = self.clone();
        tokio::spawn(async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(RecordEvent::Updated(record)) => {
                        hooks.inner.evaluate(&record, backend.as_ref()).await;
                    }
                    Ok(RecordEvent::Removed(_)) => {}
                    Err(lag) => {
                        warn!(error = %lag, "automation stream lagged; updates skipped");
                    }
                }
            }
        })
    }
}

impl HooksInner {
    async fn evaluate(&self, record: &TorrentRecord, backend: &dyn TorrentBackend) {
        self.detect_downloaded(record).await;
        self.auto_stop(record, backend).await;
    }

    /// Flip the durable downloaded flag the first time a tracked hash
    /// reports complete. The flag is the once-only guard: later complete
    /// sightings of the same hash fall through without side effects.
    async fn detect_downloaded(&self, record: &TorrentRecord) {
        if !record.is_complete()
            || !self.ledger.contains(&record.hash)
            || self.ledger.is_downloaded(&record.hash)
        {
            return;
        }

        if let Err(error) = self.ledger.mark_downloaded(&record.hash) {
            warn!(hash = %record.hash, error = %error, "failed to persist downloaded flag");
            return;
        }
        self.metrics.record_download_completed();
        debug!(hash = %record.hash, name = %record.name, "download complete");

        match self.episodes.find_by_hash(&record.hash).await {
            Ok(Some(episode)) => {
                if let Err(error) = self.episodes.mark_downloaded(&episode).await {
                    warn!(hash = %record.hash, error = %error, "failed to mark episode downloaded");
                }
                let message = format!("{} - {}", episode.series, episode.title);
                self.notifier.notify("Download complete", &message).await;
            }
            Ok(None) => {
                self.notifier.notify("Download complete", &record.name).await;
            }
            Err(error) => {
                warn!(hash = %record.hash, error = %error, "episode lookup failed");
                self.notifier.notify("Download complete", &record.name).await;
            }
        }
    }

    /// Stop a complete torrent that is still transferring, per policy.
    /// Backends take repeated stops as no-ops, so the rule re-fires
    /// harmlessly if a stopped torrent keeps reporting.
    async fn auto_stop(&self, record: &TorrentRecord, backend: &dyn TorrentBackend) {
        if !record.started || !record.is_complete() {
            return;
        }

        let stop = match self.settings.auto_stop_policy() {
            AutoStopPolicy::Off => false,
            AutoStopPolicy::All => true,
            AutoStopPolicy::Tracked => self.ledger.contains(&record.hash),
        };
        if !stop {
            return;
        }

        match backend.stop(&record.hash).await {
            Ok(()) => {
                self.metrics.record_auto_stop();
                debug!(hash = %record.hash, name = %record.name, "auto-stopped completed torrent");
            }
            Err(ClientError::Unsupported { operation }) => {
                debug!(backend = backend.name(), operation, "auto-stop unsupported");
            }
            Err(error) => {
                warn!(hash = %record.hash, error = %error, "auto-stop command failed");
            }
        }
    }
}
