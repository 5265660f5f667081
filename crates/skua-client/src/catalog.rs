//! Per-client in-memory torrent catalog with update/removal events.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use skua_events::{UpdateRouter, UpdateStream};
use skua_ledger::HashLedger;
use skua_telemetry::Metrics;
use skua_torrent_core::{EpisodeStore, InfoHash, RecordEvent, TorrentRecord};
use tracing::{debug, warn};

/// Index of every torrent one backend currently reports, keyed by hash.
///
/// Single-writer by construction: only the owning client's ingest step
/// mutates the record map, so readers never race a partial update.
/// Subscribers receive [`RecordEvent`] clones on a per-hash channel or the
/// wildcard channel.
#[derive(Clone)]
pub struct TorrentCatalog {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    records: Mutex<HashMap<InfoHash, TorrentRecord>>,
    router: UpdateRouter<InfoHash, RecordEvent>,
    ledger: HashLedger,
    episodes: Arc<dyn EpisodeStore>,
    metrics: Metrics,
}

impl TorrentCatalog {
    /// Construct an empty catalog wired to its durable collaborators.
    #[must_use]
    pub fn new(ledger: HashLedger, episodes: Arc<dyn EpisodeStore>, metrics: Metrics) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                records: Mutex::new(HashMap::new()),
                router: UpdateRouter::new(),
                ledger,
                episodes,
                metrics,
            }),
        }
    }

    /// Feed one full active list into the catalog.
    ///
    /// Unseen hashes become new records; seen hashes merge
    /// non-destructively. Every previously tracked hash absent from the
    /// batch is removed: one `Removed` event fires per hash, the ledger
    /// forgets it, and the episode store unlinks it. Collaborator
    /// failures are logged, never fatal; removal is a routine
    /// transition, not an error.
    pub async fn ingest(&self, batch: Vec<TorrentRecord>) {
        let mut updated = Vec::with_capacity(batch.len());
        let removed: Vec<InfoHash>;
        {
            let mut records = self.lock_records();
            let seen: HashSet<InfoHash> = batch.iter().map(|record| record.hash.clone()).collect();
            for record in batch {
                let merged = match records.entry(record.hash.clone()) {
                    std::collections::hash_map::Entry::Occupied(mut entry) => {
                        entry.get_mut().absorb(record);
                        entry.get().clone()
                    }
                    std::collections::hash_map::Entry::Vacant(entry) => {
                        entry.insert(record).clone()
                    }
                };
                updated.push(merged);
            }
            removed = records
                .keys()
                .filter(|hash| !seen.contains(*hash))
                .cloned()
                .collect();
            for hash in &removed {
                records.remove(hash);
            }
        }

        for record in updated {
            let hash = record.hash.clone();
            self.inner.router.publish(&hash, RecordEvent::Updated(record));
        }

        for hash in removed {
            debug!(hash = %hash, "torrent left the active list");
            self.inner
                .router
                .publish(&hash, RecordEvent::Removed(hash.clone()));
            self.inner.router.drop_key(&hash);
            self.inner.metrics.record_removal();
            if let Err(err) = self.inner.ledger.forget(&hash) {
                warn!(hash = %hash, error = %err, "failed to drop removed hash from ledger");
            }
            if let Err(err) = self.inner.episodes.unlink(&hash).await {
                warn!(hash = %hash, error = %err, "failed to unlink episode for removed hash");
            }
        }
    }

    /// Snapshot of the record tracked under a hash.
    #[must_use]
    pub fn get(&self, hash: &InfoHash) -> Option<TorrentRecord> {
        self.lock_records().get(hash).cloned()
    }

    /// Number of tracked records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_records().len()
    }

    /// Whether the catalog tracks no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_records().is_empty()
    }

    /// Snapshot of every tracked hash.
    #[must_use]
    pub fn hashes(&self) -> Vec<InfoHash> {
        self.lock_records().keys().cloned().collect()
    }

    /// Subscribe to updates for a single hash.
    #[must_use]
    pub fn subscribe(&self, hash: InfoHash) -> UpdateStream<RecordEvent> {
        self.inner.router.subscribe(hash)
    }

    /// Subscribe to every update and removal the catalog publishes.
    #[must_use]
    pub fn subscribe_all(&self) -> UpdateStream<RecordEvent> {
        self.inner.router.subscribe_all()
    }

    /// Drop every record and end all subscriber streams.
    pub fn clear(&self) {
        self.lock_records().clear();
        self.inner.router.reset();
    }

    fn lock_records(&self) -> MutexGuard<'_, HashMap<InfoHash, TorrentRecord>> {
        self.inner
            .records
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
