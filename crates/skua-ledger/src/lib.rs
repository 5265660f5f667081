#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Durable ledger of app-managed torrent hashes.
//!
//! The ledger is the bridge between "what this process currently knows"
//! and "what was previously launched": the backend process restarts
//! independently of us, so the set of hashes the application started, and
//! whether each finished downloading, must outlive any one session. Every
//! mutation is idempotent, which makes redundant calls from the poll loop
//! and automation rules safe without locking beyond a single mutex.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use skua_torrent_core::InfoHash;
use thiserror::Error;
use tracing::debug;

/// Errors raised by ledger persistence.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Reading or writing the ledger file failed.
    #[error("ledger io failed")]
    Io {
        /// Path the ledger persists to.
        path: PathBuf,
        /// Underlying io failure.
        #[source]
        source: io::Error,
    },
    /// The ledger file held malformed JSON.
    #[error("ledger file corrupt")]
    Corrupt {
        /// Path the ledger persists to.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience alias for ledger results.
pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerEntry {
    downloaded: bool,
}

/// Durable set of app-managed hashes with a per-hash downloaded flag.
///
/// Cheap to clone; clones share the same file and in-memory state.
#[derive(Clone)]
pub struct HashLedger {
    inner: Arc<LedgerInner>,
}

struct LedgerInner {
    path: PathBuf,
    entries: Mutex<BTreeMap<InfoHash, LedgerEntry>>,
}

impl HashLedger {
    /// Open a ledger backed by the given file, loading any persisted state.
    /// A missing file is an empty ledger, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| LedgerError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => {
                return Err(LedgerError::Io {
                    path: path.clone(),
                    source,
                });
            }
        };
        debug!(path = %path.display(), "hash ledger opened");
        Ok(Self {
            inner: Arc::new(LedgerInner {
                path,
                entries: Mutex::new(entries),
            }),
        })
    }

    /// Register a hash as app-managed. No-op when already present.
    ///
    /// # Errors
    ///
    /// Returns an error when the updated state cannot be persisted.
    pub fn insert(&self, hash: &InfoHash) -> LedgerResult<()> {
        let mut entries = self.lock();
        if entries.contains_key(hash) {
            return Ok(());
        }
        entries.insert(hash.clone(), LedgerEntry::default());
        self.persist(&entries)
    }

    /// Drop a hash from the ledger. No-op when absent.
    ///
    /// # Errors
    ///
    /// Returns an error when the updated state cannot be persisted.
    pub fn forget(&self, hash: &InfoHash) -> LedgerResult<()> {
        let mut entries = self.lock();
        if entries.remove(hash).is_none() {
            return Ok(());
        }
        self.persist(&entries)
    }

    /// Flag a tracked hash as downloaded. No-op when the hash is untracked
    /// or already flagged.
    ///
    /// # Errors
    ///
    /// Returns an error when the updated state cannot be persisted.
    pub fn mark_downloaded(&self, hash: &InfoHash) -> LedgerResult<()> {
        let mut entries = self.lock();
        match entries.get_mut(hash) {
            Some(entry) if !entry.downloaded => {
                entry.downloaded = true;
                self.persist(&entries)
            }
            _ => Ok(()),
        }
    }

    /// Whether the hash is tracked by this ledger.
    #[must_use]
    pub fn contains(&self, hash: &InfoHash) -> bool {
        self.lock().contains_key(hash)
    }

    /// Whether a tracked hash has been flagged as downloaded.
    #[must_use]
    pub fn is_downloaded(&self, hash: &InfoHash) -> bool {
        self.lock().get(hash).is_some_and(|entry| entry.downloaded)
    }

    /// Number of tracked hashes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether the ledger tracks no hashes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of every tracked hash.
    #[must_use]
    pub fn hashes(&self) -> Vec<InfoHash> {
        self.lock().keys().cloned().collect()
    }

    /// Path the ledger persists to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    // Temp-file write followed by rename; a failed write leaves the last
    // good state on disk.
    fn persist(&self, entries: &BTreeMap<InfoHash, LedgerEntry>) -> LedgerResult<()> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|source| LedgerError::Corrupt {
            path: self.inner.path.clone(),
            source,
        })?;
        let tmp = self.inner.path.with_extension("tmp");
        let io_err = |source| LedgerError::Io {
            path: self.inner.path.clone(),
            source,
        };
        if let Some(parent) = self.inner.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&tmp, bytes).map_err(io_err)?;
        fs::rename(&tmp, &self.inner.path).map_err(io_err)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<InfoHash, LedgerEntry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hash(fill: char) -> InfoHash {
        InfoHash::parse(&fill.to_string().repeat(40)).expect("valid hash")
    }

    fn temp_ledger() -> (tempfile::TempDir, HashLedger) {
        let dir = tempfile::tempdir().expect("tempdir");
        let ledger = HashLedger::open(dir.path().join("hashes.json")).expect("open");
        (dir, ledger)
    }

    #[test]
    fn insert_and_lookups() {
        let (_dir, ledger) = temp_ledger();
        let hash = sample_hash('a');

        assert!(!ledger.contains(&hash));
        ledger.insert(&hash).expect("insert");
        assert!(ledger.contains(&hash));
        assert!(!ledger.is_downloaded(&hash));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn operations_are_idempotent() {
        let (_dir, ledger) = temp_ledger();
        let hash = sample_hash('b');

        ledger.insert(&hash).expect("insert");
        ledger.insert(&hash).expect("insert again");
        assert_eq!(ledger.len(), 1);

        ledger.mark_downloaded(&hash).expect("mark");
        ledger.mark_downloaded(&hash).expect("mark again");
        assert!(ledger.is_downloaded(&hash));

        ledger.forget(&hash).expect("forget");
        ledger.forget(&hash).expect("forget again");
        assert!(ledger.is_empty());
    }

    #[test]
    fn mark_downloaded_requires_tracked_hash() {
        let (_dir, ledger) = temp_ledger();
        let hash = sample_hash('c');

        ledger.mark_downloaded(&hash).expect("no-op mark");
        assert!(!ledger.contains(&hash));
        assert!(!ledger.is_downloaded(&hash));
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hashes.json");
        let done = sample_hash('d');
        let pending = sample_hash('e');

        {
            let ledger = HashLedger::open(&path).expect("open");
            ledger.insert(&done).expect("insert");
            ledger.insert(&pending).expect("insert");
            ledger.mark_downloaded(&done).expect("mark");
        }

        let reopened = HashLedger::open(&path).expect("reopen");
        assert_eq!(reopened.len(), 2);
        assert!(reopened.is_downloaded(&done));
        assert!(!reopened.is_downloaded(&pending));
    }

    #[test]
    fn stored_hashes_are_canonical_uppercase_hex() {
        let (_dir, ledger) = temp_ledger();
        let hash = InfoHash::parse("deadbeefdeadbeefdeadbeefdeadbeefdeadbeef").expect("hash");
        ledger.insert(&hash).expect("insert");

        for stored in ledger.hashes() {
            assert_eq!(stored.as_str().len(), 40);
            assert!(
                stored
                    .as_str()
                    .chars()
                    .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase())
            );
        }
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("hashes.json");
        fs::write(&path, b"{not json").expect("write");

        assert!(matches!(
            HashLedger::open(&path),
            Err(LedgerError::Corrupt { .. })
        ));
    }
}
