//! End-to-end lifecycle tests driving a scripted backend under paused time.

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::StreamExt;

use skua_client::{ClientDirectory, ConnectionState, TorrentClient};
use skua_config::SettingsStore;
use skua_events::EventBus;
use skua_ledger::HashLedger;
use skua_telemetry::Metrics;
use skua_test_support::fixtures::{episode, raw_record, sample_hash, scratch_dir};
use skua_test_support::mocks::{MemoryEpisodeStore, ScriptedBackend};
use skua_torrent_core::{AddOptions, ClientError, EpisodeStore, RecordEvent, TorrentBackend};

struct Rig {
    client: TorrentClient,
    backend: Arc<ScriptedBackend>,
    ledger: HashLedger,
    episodes: Arc<MemoryEpisodeStore>,
    _dir: tempfile::TempDir,
}

fn rig() -> Rig {
    rig_named("uTorrent")
}

fn rig_named(name: &str) -> Rig {
    let dir = scratch_dir();
    let ledger = HashLedger::open(dir.path().join("hashes.json")).expect("ledger");
    let episodes = Arc::new(MemoryEpisodeStore::new());
    let backend = Arc::new(ScriptedBackend::new());
    let client = TorrentClient::new(
        name,
        Arc::clone(&backend) as Arc<dyn TorrentBackend>,
        ledger.clone(),
        Arc::clone(&episodes) as Arc<dyn EpisodeStore>,
        EventBus::new(),
        Metrics::new().expect("metrics"),
    );
    Rig {
        client,
        backend,
        ledger,
        episodes,
        _dir: dir,
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_connects_share_one_probe() {
    let rig = rig();
    rig.backend.set_probe_delay(Duration::from_millis(200));

    let (a, b, c) = tokio::join!(rig.client.connect(), rig.client.connect(), rig.client.connect());
    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(rig.backend.probe_calls(), 1);
    assert_eq!(rig.client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn connect_when_connected_is_a_no_op() {
    let rig = rig();
    rig.client.connect().await.expect("first connect");
    rig.client.connect().await.expect("second connect");
    assert_eq!(rig.backend.probe_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_probe_retries_after_fixed_delay() {
    let rig = rig();
    rig.backend.push_probe(Err("connection refused".into()));

    let result = rig.client.connect().await;
    assert!(matches!(result, Err(ClientError::NotConnected)));
    assert_eq!(rig.client.state(), ConnectionState::OfflineRetry);

    // One second short of the retry delay nothing has happened yet.
    tokio::time::sleep(Duration::from_secs(14)).await;
    assert_eq!(rig.backend.probe_calls(), 1);
    assert_eq!(rig.client.state(), ConnectionState::OfflineRetry);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(rig.backend.probe_calls(), 2);
    assert_eq!(rig.client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn probe_timeout_means_offline() {
    let rig = rig();
    rig.backend.set_probe_delay(Duration::from_secs(2));

    let result = rig.client.connect().await;
    assert!(matches!(result, Err(ClientError::NotConnected)));
    assert_eq!(rig.client.state(), ConnectionState::OfflineRetry);
}

#[tokio::test(start_paused = true)]
async fn refused_session_means_offline() {
    let rig = rig();
    rig.backend.push_probe(Ok(false));

    let result = rig.client.connect().await;
    assert!(matches!(result, Err(ClientError::NotConnected)));
    assert_eq!(rig.client.state(), ConnectionState::OfflineRetry);
}

#[tokio::test(start_paused = true)]
async fn poll_cadence_is_measured_between_fetches() {
    let rig = rig();
    rig.client.connect().await.expect("connect");

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(rig.backend.fetch_calls(), 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(rig.backend.fetch_calls(), 2);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(rig.backend.fetch_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn poll_error_halts_silently() {
    let rig = rig();
    rig.backend.push_error_frame("session expired");

    rig.client.connect().await.expect("connect");
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(rig.client.state(), ConnectionState::Disconnected);
    assert_eq!(rig.backend.fetch_calls(), 1);

    // No retry timer after a poll failure; reconnection is caller-driven.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(rig.backend.fetch_calls(), 1);
    assert_eq!(rig.backend.probe_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn poll_halt_clears_the_catalog_and_ends_subscriptions() {
    let rig = rig();
    let hash = sample_hash(0x55);
    rig.backend
        .push_frame(vec![raw_record(&hash, "steady", 40.0, true)]);
    rig.backend.push_error_frame("session expired");

    let mut updates = rig.client.catalog().subscribe_all();
    rig.client.connect().await.expect("connect");
    tokio::time::sleep(Duration::from_secs(4)).await;

    assert_eq!(rig.client.state(), ConnectionState::Disconnected);
    assert!(rig.client.catalog().is_empty());

    // The first fetch's update arrives, then the halt ends the stream.
    assert!(matches!(
        updates.next().await,
        Some(Ok(RecordEvent::Updated(_)))
    ));
    assert!(updates.next().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn removal_by_diff_fires_once_and_cleans_up() {
    let rig = rig();
    let hash = sample_hash(0xAB);
    rig.ledger.insert(&hash).expect("insert");
    rig.episodes.link(hash.clone(), episode("Show", "S02E01"));
    rig.backend
        .push_frame(vec![raw_record(&hash, "episode", 42.0, true)]);
    rig.backend.set_default_frame(Vec::new());

    let mut updates = rig.client.catalog().subscribe_all();
    rig.client.connect().await.expect("connect");
    tokio::time::sleep(Duration::from_secs(7)).await;

    let first = updates.next().await.expect("update").expect("recv");
    assert!(matches!(first, RecordEvent::Updated(record) if record.hash == hash));
    let second = updates.next().await.expect("removal").expect("recv");
    assert!(matches!(second, RecordEvent::Removed(removed) if removed == hash));

    // Two more empty polls have run by now; no further removal events.
    assert!(
        tokio::time::timeout(Duration::from_millis(50), updates.next())
            .await
            .is_err()
    );

    assert!(!rig.ledger.contains(&hash));
    assert_eq!(rig.episodes.unlink_calls(), vec![hash]);
    assert!(rig.client.catalog().is_empty());
}

#[tokio::test(start_paused = true)]
async fn disconnect_clears_catalog_and_stops_polling() {
    let rig = rig();
    let hash = sample_hash(0xCD);
    rig.backend
        .set_default_frame(vec![raw_record(&hash, "steady", 10.0, true)]);

    rig.client.connect().await.expect("connect");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(rig.client.catalog().len(), 1);

    rig.client.disconnect();
    assert_eq!(rig.client.state(), ConnectionState::Disconnected);
    assert!(rig.client.catalog().is_empty());

    let fetches = rig.backend.fetch_calls();
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(rig.backend.fetch_calls(), fetches);
}

#[tokio::test(start_paused = true)]
async fn disconnect_does_not_forget_tracked_hashes() {
    let rig = rig();
    let hash = sample_hash(0xEF);
    rig.ledger.insert(&hash).expect("insert");
    rig.backend
        .set_default_frame(vec![raw_record(&hash, "tracked", 10.0, true)]);

    rig.client.connect().await.expect("connect");
    tokio::time::sleep(Duration::from_secs(1)).await;
    rig.client.disconnect();

    assert!(rig.ledger.contains(&hash));
    assert!(rig.episodes.unlink_calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn add_magnet_registers_hash_and_connects_first() {
    let rig = rig();
    let hash = sample_hash(0x11);
    let uri = format!("magnet:?xt=urn:btih:{hash}&dn=release");

    rig.client
        .add_magnet(&uri, &AddOptions::default())
        .await
        .expect("add magnet");

    assert_eq!(rig.backend.probe_calls(), 1);
    assert_eq!(rig.backend.magnets_added(), vec![uri]);
    assert!(rig.ledger.contains(&hash));
}

#[tokio::test(start_paused = true)]
async fn add_magnet_surfaces_missing_capability() {
    let rig = rig();
    rig.backend.set_adds_enabled(false);

    let result = rig
        .client
        .add_magnet("magnet:?xt=urn:btih:0", &AddOptions::default())
        .await;
    assert!(matches!(
        result,
        Err(ClientError::Unsupported {
            operation: "add_magnet"
        })
    ));
}

#[tokio::test(start_paused = true)]
async fn reconnect_after_poll_halt_resumes_polling() {
    let rig = rig();
    rig.backend.push_error_frame("session expired");

    rig.client.connect().await.expect("connect");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(rig.client.state(), ConnectionState::Disconnected);

    rig.client.connect().await.expect("reconnect");
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(rig.client.state(), ConnectionState::Connected);
    assert!(rig.backend.fetch_calls() >= 2);
}

#[tokio::test]
async fn directory_overwrites_and_selects_active_client() {
    let dir = scratch_dir();
    let settings = SettingsStore::open(dir.path().join("settings.json")).expect("settings");
    let directory = ClientDirectory::new(settings.clone());

    let first = rig_named("first");
    let second = rig_named("second");
    directory.register("uTorrent", first.client.clone());
    directory.register("uTorrent", second.client.clone());
    directory.register("Transmission", rig_named("third").client.clone());

    let resolved = directory.get("uTorrent").expect("registered client");
    assert_eq!(resolved.name(), "second");
    assert_eq!(directory.names(), vec!["Transmission", "uTorrent"]);

    assert!(directory.active().is_none());
    settings.set_active_client("uTorrent").expect("active");
    assert_eq!(directory.active().expect("active client").name(), "second");

    settings.set_active_client("Deluge").expect("active");
    assert!(directory.active().is_none());
}
