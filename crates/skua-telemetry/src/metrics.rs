//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters/gauges relevant to the polling runtime.

use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: std::sync::Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    poll_cycles_total: IntCounterVec,
    events_emitted_total: IntCounterVec,
    active_torrents: IntGauge,
    auto_stops_total: IntCounter,
    downloads_completed_total: IntCounter,
    removals_total: IntCounter,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Number of torrents currently tracked across catalogs.
    pub active_torrents: i64,
    /// Total auto-stop commands issued.
    pub auto_stops_total: u64,
    /// Total downloads flagged complete by automation.
    pub downloads_completed_total: u64,
    /// Total torrents removed via diff detection.
    pub removals_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let poll_cycles_total = IntCounterVec::new(
            Opts::new("poll_cycles_total", "Active-list fetches per client"),
            &["client"],
        )?;
        let events_emitted_total = IntCounterVec::new(
            Opts::new("events_emitted_total", "Application events emitted by type"),
            &["type"],
        )?;
        let active_torrents = IntGauge::with_opts(Opts::new(
            "active_torrents",
            "Torrents currently tracked across catalogs",
        ))?;
        let auto_stops_total = IntCounter::with_opts(Opts::new(
            "auto_stops_total",
            "Stop commands issued by the auto-stop rule",
        ))?;
        let downloads_completed_total = IntCounter::with_opts(Opts::new(
            "downloads_completed_total",
            "Downloads flagged complete by automation",
        ))?;
        let removals_total = IntCounter::with_opts(Opts::new(
            "removals_total",
            "Torrents removed via active-list diffing",
        ))?;

        registry.register(Box::new(poll_cycles_total.clone()))?;
        registry.register(Box::new(events_emitted_total.clone()))?;
        registry.register(Box::new(active_torrents.clone()))?;
        registry.register(Box::new(auto_stops_total.clone()))?;
        registry.register(Box::new(downloads_completed_total.clone()))?;
        registry.register(Box::new(removals_total.clone()))?;

        Ok(Self {
            inner: std::sync::Arc::new(MetricsInner {
                registry,
                poll_cycles_total,
                events_emitted_total,
                active_torrents,
                auto_stops_total,
                downloads_completed_total,
                removals_total,
            }),
        })
    }

    /// Record one active-list fetch for a client.
    pub fn record_poll_cycle(&self, client: &str) {
        self.inner
            .poll_cycles_total
            .with_label_values(&[client])
            .inc();
    }

    /// Record one emitted application event by kind.
    pub fn record_event(&self, kind: &str) {
        self.inner
            .events_emitted_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Update the tracked-torrent gauge.
    pub fn set_active_torrents(&self, count: i64) {
        self.inner.active_torrents.set(count);
    }

    /// Record one auto-stop command.
    pub fn record_auto_stop(&self) {
        self.inner.auto_stops_total.inc();
    }

    /// Record one download flagged complete.
    pub fn record_download_completed(&self) {
        self.inner.downloads_completed_total.inc();
    }

    /// Record one removal detected by diffing.
    pub fn record_removal(&self) {
        self.inner.removals_total.inc();
    }

    /// Snapshot the counters used by health reporting.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_torrents: self.inner.active_torrents.get(),
            auto_stops_total: self.inner.auto_stops_total.get(),
            downloads_completed_total: self.inner.downloads_completed_total.get(),
            removals_total: self.inner.removals_total.get(),
        }
    }

    /// Render the registry in the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding the metric families fails.
    pub fn render(&self) -> Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_and_render() {
        let metrics = Metrics::new().expect("metrics");
        metrics.record_poll_cycle("uTorrent");
        metrics.record_poll_cycle("uTorrent");
        metrics.record_event("client_connected");
        metrics.set_active_torrents(3);
        metrics.record_auto_stop();
        metrics.record_download_completed();
        metrics.record_removal();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.active_torrents, 3);
        assert_eq!(snapshot.auto_stops_total, 1);
        assert_eq!(snapshot.downloads_completed_total, 1);
        assert_eq!(snapshot.removals_total, 1);

        let rendered = metrics.render().expect("render");
        assert!(rendered.contains("poll_cycles_total"));
        assert!(rendered.contains("active_torrents 3"));
    }
}
