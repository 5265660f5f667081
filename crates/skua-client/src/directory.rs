//! Named registration and active-client selection.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use skua_config::SettingsStore;
use tracing::info;

use crate::client::TorrentClient;

/// Explicit registry of configured torrent clients.
///
/// Built once at startup and passed by reference wherever a client is
/// needed; nothing here is process-global. The "active" client is whatever
/// the settings store's selection key names; a missing or dangling
/// selection is a caller-visible misconfiguration, not an internal error.
pub struct ClientDirectory {
    settings: SettingsStore,
    clients: Mutex<HashMap<String, TorrentClient>>,
}

impl ClientDirectory {
    /// Construct an empty directory reading its selection key from the
    /// given settings store.
    #[must_use]
    pub fn new(settings: SettingsStore) -> Self {
        Self {
            settings,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Register a client under a name, replacing any previous entry.
    /// Replacement is how a backend gets hot-swapped on configuration
    /// change; disconnecting the old instance is the caller's call.
    pub fn register(&self, name: impl Into<String>, client: TorrentClient) {
        let name = name.into();
        let replaced = self.lock().insert(name.clone(), client).is_some();
        info!(client = %name, replaced, "torrent client registered");
    }

    /// Look up a client by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<TorrentClient> {
        self.lock().get(name).cloned()
    }

    /// The client currently selected in settings, if the selection names
    /// a registered entry.
    #[must_use]
    pub fn active(&self) -> Option<TorrentClient> {
        let name = self.settings.active_client()?;
        self.get(&name)
    }

    /// Names of every registered client, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TorrentClient>> {
        self.clients
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
