//! Sample hashes, record builders, and scratch directories.

use skua_torrent_core::{EpisodeRef, InfoHash, RawTorrent, TorrentRecord, quantize_progress};
use uuid::Uuid;

/// Deterministic 40-character hash built from a single byte seed.
///
/// # Panics
///
/// Never panics; the generated string is always valid hex.
#[must_use]
pub fn sample_hash(seed: u8) -> InfoHash {
    InfoHash::parse(&format!("{seed:02X}").repeat(20)).expect("seeded hash is valid hex")
}

/// Backend-native raw record in the field shape `ScriptedBackend` expects.
#[must_use]
pub fn raw_record(hash: &InfoHash, name: &str, progress: f64, started: bool) -> RawTorrent {
    RawTorrent::new()
        .with_field("hash", hash.as_str())
        .with_field("name", name)
        .with_field("progress", progress)
        .with_field("rate_bps", 0)
        .with_field("started", started)
}

/// Normalized record with the common fields filled in.
#[must_use]
pub fn normalized_record(hash: &InfoHash, name: &str, progress: f64, started: bool) -> TorrentRecord {
    let mut record = TorrentRecord::new(hash.clone(), name);
    record.progress = quantize_progress(progress);
    record.started = started;
    record
}

/// Episode reference with a fresh id.
#[must_use]
pub fn episode(series: &str, title: &str) -> EpisodeRef {
    EpisodeRef {
        id: Uuid::new_v4(),
        series: series.to_string(),
        title: title.to_string(),
    }
}

/// Scratch directory for durable-state tests.
///
/// # Panics
///
/// Panics when the temp directory cannot be created.
#[must_use]
pub fn scratch_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("create temp dir")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_hash_is_canonical() {
        let hash = sample_hash(0xAB);
        assert_eq!(hash.as_str().len(), 40);
        assert!(hash.as_str().starts_with("ABAB"));
    }

    #[test]
    fn raw_record_carries_expected_fields() {
        let hash = sample_hash(1);
        let raw = raw_record(&hash, "show.s01e02", 55.5, true);
        assert_eq!(raw.string_field("hash"), Some(hash.as_str()));
        assert_eq!(raw.bool_field("started"), Some(true));
    }
}
