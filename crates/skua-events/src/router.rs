//! Per-key update router.
//!
//! The torrent catalog publishes one stream of record updates per hash plus
//! a wildcard stream every subscriber can tap. Keeping the observer list
//! explicit and per-router (instead of one ambient bus with a shared
//! namespace) means a disconnected client tears down exactly its own
//! subscriptions via [`UpdateRouter::reset`].

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

const CHANNEL_CAPACITY: usize = 64;

/// Stream of updates handed to subscribers.
pub type UpdateStream<T> = BroadcastStream<T>;

/// Routes published values to a per-key channel and a wildcard channel.
///
/// Key channels are created lazily on first subscription; publishing to a
/// key nobody watches only reaches wildcard subscribers.
pub struct UpdateRouter<K, T> {
    inner: Arc<Mutex<RouterInner<K, T>>>,
}

struct RouterInner<K, T> {
    channels: HashMap<K, broadcast::Sender<T>>,
    wildcard: broadcast::Sender<T>,
}

impl<K, T> Clone for UpdateRouter<K, T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, T> UpdateRouter<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone + Send + 'static,
{
    /// Construct an empty router.
    #[must_use]
    pub fn new() -> Self {
        let (wildcard, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(RouterInner {
                channels: HashMap::new(),
                wildcard,
            })),
        }
    }

    /// Publish a value to the key's channel (when subscribed) and the
    /// wildcard channel.
    pub fn publish(&self, key: &K, value: T) {
        let inner = self.lock();
        if let Some(sender) = inner.channels.get(key) {
            let _ = sender.send(value.clone());
        }
        let _ = inner.wildcard.send(value);
    }

    /// Subscribe to updates for a single key.
    #[must_use]
    pub fn subscribe(&self, key: K) -> UpdateStream<T> {
        let mut inner = self.lock();
        let sender = inner
            .channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        BroadcastStream::new(sender.subscribe())
    }

    /// Subscribe to every update the router carries.
    #[must_use]
    pub fn subscribe_all(&self) -> UpdateStream<T> {
        BroadcastStream::new(self.lock().wildcard.subscribe())
    }

    /// Drop the channel registered under a key, ending its subscriber
    /// streams. No-op when the key has no channel.
    pub fn drop_key(&self, key: &K) {
        let _ = self.lock().channels.remove(key);
    }

    /// Drop every channel, ending all subscriber streams (per-key and
    /// wildcard alike).
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.channels.clear();
        let (wildcard, _) = broadcast::channel(CHANNEL_CAPACITY);
        inner.wildcard = wildcard;
    }

    /// Number of keys with live channels, used by tests and diagnostics.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.lock().channels.len()
    }

    fn lock(&self) -> MutexGuard<'_, RouterInner<K, T>> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl<K, T> Default for UpdateRouter<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
