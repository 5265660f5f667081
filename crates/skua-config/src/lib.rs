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

//! Persisted key-value settings store.
//!
//! Layout: `model.rs` (typed values and well-known keys), `error.rs`
//! (`ConfigError`), with `lib.rs` hosting the flat JSON-file-backed
//! `SettingsStore`. Credentials, ports, the active-client selection, and
//! policy flags all live here under dotted keys.

pub mod error;
pub mod model;

pub use error::{ConfigError, ConfigResult};
pub use model::{ACTIVE_CLIENT_KEY, AUTO_STOP_KEY, AutoStopPolicy};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};
use tracing::debug;

/// Flat key-value settings store persisted as a single JSON object.
///
/// Cheap to clone; clones share the same file and in-memory state. Writes
/// persist immediately, last write wins.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    values: Mutex<Map<String, Value>>,
}

impl SettingsStore {
    /// Open a store backed by the given file, loading any persisted state.
    /// A missing file is an empty store, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let values = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| ConfigError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Map::new(),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.clone(),
                    source,
                });
            }
        };
        debug!(path = %path.display(), "settings store opened");
        Ok(Self {
            inner: Arc::new(StoreInner {
                path,
                values: Mutex::new(values),
            }),
        })
    }

    /// Fetch the raw value stored under a key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().get(key).cloned()
    }

    /// Fetch a string value stored under a key.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|value| value.as_str().map(str::to_string))
    }

    /// Store a value under a key and persist.
    ///
    /// # Errors
    ///
    /// Returns an error when the updated state cannot be persisted.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> ConfigResult<()> {
        let mut values = self.lock();
        values.insert(key.into(), value.into());
        self.persist(&values)
    }

    /// Remove a key and persist. No-op when absent.
    ///
    /// # Errors
    ///
    /// Returns an error when the updated state cannot be persisted.
    pub fn unset(&self, key: &str) -> ConfigResult<()> {
        let mut values = self.lock();
        if values.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&values)
    }

    /// Name of the client the directory should treat as active.
    #[must_use]
    pub fn active_client(&self) -> Option<String> {
        self.get_str(ACTIVE_CLIENT_KEY)
    }

    /// Select the active client by directory name.
    ///
    /// # Errors
    ///
    /// Returns an error when the updated state cannot be persisted.
    pub fn set_active_client(&self, name: &str) -> ConfigResult<()> {
        self.set(ACTIVE_CLIENT_KEY, name)
    }

    /// Auto-stop policy, defaulting to [`AutoStopPolicy::Off`] when unset
    /// or unparseable.
    #[must_use]
    pub fn auto_stop_policy(&self) -> AutoStopPolicy {
        self.get(AUTO_STOP_KEY)
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    /// Store the auto-stop policy.
    ///
    /// # Errors
    ///
    /// Returns an error when the updated state cannot be persisted.
    pub fn set_auto_stop_policy(&self, policy: AutoStopPolicy) -> ConfigResult<()> {
        self.set(AUTO_STOP_KEY, policy.as_str())
    }

    /// Path the store persists to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    fn persist(&self, values: &Map<String, Value>) -> ConfigResult<()> {
        let bytes = serde_json::to_vec_pretty(values).map_err(|source| ConfigError::Corrupt {
            path: self.inner.path.clone(),
            source,
        })?;
        let tmp = self.inner.path.with_extension("tmp");
        let io_err = |source| ConfigError::Io {
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

    fn lock(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.inner
            .values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::open(dir.path().join("settings.json")).expect("open");
        (dir, store)
    }

    #[test]
    fn set_get_and_unset() {
        let (_dir, store) = temp_store();
        assert!(store.get("utorrent.port").is_none());

        store.set("utorrent.port", 8080).expect("set");
        assert_eq!(store.get("utorrent.port"), Some(Value::from(8080)));

        store.unset("utorrent.port").expect("unset");
        assert!(store.get("utorrent.port").is_none());
        store.unset("utorrent.port").expect("unset absent");
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        {
            let store = SettingsStore::open(&path).expect("open");
            store.set_active_client("Transmission").expect("set");
            store
                .set_auto_stop_policy(AutoStopPolicy::Tracked)
                .expect("set policy");
        }

        let reopened = SettingsStore::open(&path).expect("reopen");
        assert_eq!(reopened.active_client().as_deref(), Some("Transmission"));
        assert_eq!(reopened.auto_stop_policy(), AutoStopPolicy::Tracked);
    }

    #[test]
    fn auto_stop_policy_defaults_when_unset_or_garbage() {
        let (_dir, store) = temp_store();
        assert_eq!(store.auto_stop_policy(), AutoStopPolicy::Off);

        store.set(AUTO_STOP_KEY, "sometimes").expect("set");
        assert_eq!(store.auto_stop_policy(), AutoStopPolicy::Off);

        store.set(AUTO_STOP_KEY, "all").expect("set");
        assert_eq!(store.auto_stop_policy(), AutoStopPolicy::All);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.json");
        fs::write(&path, b"[1,2").expect("write");

        assert!(matches!(
            SettingsStore::open(&path),
            Err(ConfigError::Corrupt { .. })
        ));
    }
}
