//! Core torrent domain types shared across the workspace.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientError, ClientResult};

/// Canonical torrent identifier: 40 hexadecimal characters, uppercase.
///
/// Every backend reports hashes in its own casing; parsing through this
/// type is what lets the ledger, catalog, and automation rules agree on
/// identity across sessions and backend restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InfoHash(String);

impl InfoHash {
    /// Parse and canonicalize an info hash.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidHash`] when the value is not exactly
    /// 40 hexadecimal characters.
    pub fn parse(value: &str) -> ClientResult<Self> {
        let trimmed = value.trim();
        if trimmed.len() == 40 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(ClientError::InvalidHash {
                value: value.to_string(),
            })
        }
    }

    /// Canonical string form (40 uppercase hex characters).
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InfoHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for InfoHash {
    type Error = ClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<InfoHash> for String {
    fn from(hash: InfoHash) -> Self {
        hash.0
    }
}

/// Extract the v1 info hash from a magnet URI (`xt=urn:btih:<hex>`).
///
/// Returns `None` for URIs without a hex-encoded v1 hash; base32 magnets
/// are left for the backend to resolve.
#[must_use]
pub fn magnet_info_hash(uri: &str) -> Option<InfoHash> {
    let marker = "urn:btih:";
    let start = uri.find(marker)? + marker.len();
    let candidate: String = uri[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    InfoHash::parse(&candidate).ok()
}

/// Clamp a progress value into 0–100 and floor it to one decimal place.
#[must_use]
pub fn quantize_progress(value: f64) -> f64 {
    let clamped = value.clamp(0.0, 100.0);
    (clamped * 10.0).floor() / 10.0
}

/// Normalized view of one torrent as reported by a backend's active list.
///
/// Owned exclusively by the catalog that tracks it; subscribers receive
/// clones. Backend-native fields ride along untouched in `native`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TorrentRecord {
    /// Canonical info hash, unique within one catalog.
    pub hash: InfoHash,
    /// Display name reported by the backend.
    pub name: String,
    /// Completion percentage, 0–100, floored to one decimal.
    pub progress: f64,
    /// Current download rate in bytes per second.
    pub download_rate_bps: u64,
    /// Whether the torrent is actively started at the backend.
    pub started: bool,
    /// Download directory when the backend reports one.
    pub download_dir: Option<String>,
    /// Backend-native fields passed through without interpretation.
    #[serde(default)]
    pub native: Map<String, Value>,
}

impl TorrentRecord {
    /// Construct a record with the mandatory normalized fields.
    #[must_use]
    pub fn new(hash: InfoHash, name: impl Into<String>) -> Self {
        Self {
            hash,
            name: name.into(),
            progress: 0.0,
            download_rate_bps: 0,
            started: false,
            download_dir: None,
            native: Map::new(),
        }
    }

    /// Merge a fresh sighting into this record.
    ///
    /// Scalar fields take the incoming value; optional fields are only
    /// overwritten when the update carries one; native fields merge
    /// key-by-key so a backend that omits a field on one poll does not
    /// erase it.
    pub fn absorb(&mut self, update: TorrentRecord) {
        debug_assert_eq!(self.hash, update.hash);
        self.name = update.name;
        self.progress = update.progress;
        self.download_rate_bps = update.download_rate_bps;
        self.started = update.started;
        if update.download_dir.is_some() {
            self.download_dir = update.download_dir;
        }
        for (key, value) in update.native {
            self.native.insert(key, value);
        }
    }

    /// Whether the backend reports this torrent as fully downloaded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress >= 100.0
    }
}

/// One torrent exactly as the backend's wire format reported it.
///
/// Adapters hand these to their `normalize` mapping; nothing else in the
/// runtime interprets the field names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTorrent {
    /// Backend-native field map.
    pub fields: Map<String, Value>,
}

impl RawTorrent {
    /// Construct an empty raw record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a native field, returning self for fluent construction.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Fetch a string field by backend-native name.
    #[must_use]
    pub fn string_field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Fetch a numeric field by backend-native name.
    #[must_use]
    pub fn number_field(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(Value::as_f64)
    }

    /// Fetch a boolean field by backend-native name.
    #[must_use]
    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.fields.get(key).and_then(Value::as_bool)
    }
}

/// Individual file within a torrent payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFileEntry {
    /// Relative path of the file within the torrent.
    pub path: String,
    /// Total size of the file in bytes.
    pub size_bytes: u64,
}

/// Update published on the catalog's per-hash and wildcard channels.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEvent {
    /// A record was first seen or merged with a fresh sighting.
    Updated(TorrentRecord),
    /// A tracked hash disappeared from the backend's active list.
    Removed(InfoHash),
}

impl RecordEvent {
    /// Hash the event refers to.
    #[must_use]
    pub fn hash(&self) -> &InfoHash {
        match self {
            RecordEvent::Updated(record) => &record.hash,
            RecordEvent::Removed(hash) => hash,
        }
    }
}
