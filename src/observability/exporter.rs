//! Prometheus exposition of the last completed run.
//!
//! Each published snapshot is replayed into a fresh, local
//! `PrometheusRecorder` and rendered once, so the text always describes
//! exactly one run and no global recorder is installed.
//!
//! # Metrics
//! - `payment_probe_requests_total{endpoint, outcome}` (counter)
//! - `payment_probe_request_duration_seconds{endpoint}` (histogram)
//! - `payment_probe_success_rate` (gauge, percent)
//! - `payment_probe_latency_p50_seconds` / `_p90_` / `_p99_` (gauges)
//! - `payment_probe_endpoint_latency_seconds{endpoint, quantile}` (gauge)
//! - `payment_probe_latency_total_seconds`, `payment_probe_latency_avg_seconds`,
//!   `payment_probe_latest_request_duration_seconds` (gauges)
//! - `payment_probe_last_run_timestamp_seconds` (gauge, 0 before the first run)

use arc_swap::ArcSwap;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusRecorder};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::observability::aggregator::MetricsSnapshot;
use crate::pacing::clock::unix_secs;
use crate::probe::Outcome;

/// Content type of the text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

const REQUESTS_TOTAL: &str = "payment_probe_requests_total";
const REQUEST_DURATION: &str = "payment_probe_request_duration_seconds";
const DURATION_BUCKETS: [f64; 8] = [0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

fn build_recorder() -> PrometheusRecorder {
    match PrometheusBuilder::new()
        .set_buckets_for_metric(Matcher::Full(REQUEST_DURATION.to_string()), &DURATION_BUCKETS)
    {
        Ok(builder) => builder.build_recorder(),
        Err(e) => {
            tracing::warn!(error = %e, "Invalid histogram buckets, falling back to summaries");
            PrometheusBuilder::new().build_recorder()
        }
    }
}

fn record_snapshot(snapshot: &MetricsSnapshot) {
    describe_counter!(REQUESTS_TOTAL, "Probe calls in the last run by endpoint and outcome");
    describe_histogram!(REQUEST_DURATION, Unit::Seconds, "Latency of completed probe calls");
    describe_gauge!(
        "payment_probe_success_rate",
        Unit::Percent,
        "Share of successful calls in the last run"
    );
    describe_gauge!(
        "payment_probe_last_run_timestamp_seconds",
        Unit::Seconds,
        "Completion time of the last run"
    );

    for (endpoint, stats) in &snapshot.endpoints {
        let endpoint = endpoint.as_str();
        for outcome in Outcome::ALL {
            let n = stats.outcomes.get(&outcome).copied().unwrap_or(0);
            counter!(REQUESTS_TOTAL, "endpoint" => endpoint, "outcome" => outcome.as_str())
                .absolute(n);
        }
        let duration = histogram!(REQUEST_DURATION, "endpoint" => endpoint);
        for sample in &stats.duration_samples {
            duration.record(*sample);
        }
        for (quantile, value) in [("0.5", stats.p50), ("0.9", stats.p90), ("0.99", stats.p99)] {
            gauge!(
                "payment_probe_endpoint_latency_seconds",
                "endpoint" => endpoint,
                "quantile" => quantile
            )
            .set(value);
        }
    }

    gauge!("payment_probe_success_rate").set(snapshot.success_rate);
    gauge!("payment_probe_latency_p50_seconds").set(snapshot.p50);
    gauge!("payment_probe_latency_p90_seconds").set(snapshot.p90);
    gauge!("payment_probe_latency_p99_seconds").set(snapshot.p99);
    gauge!("payment_probe_latency_total_seconds").set(snapshot.total_latency);
    gauge!("payment_probe_latency_avg_seconds").set(snapshot.average_latency);
    gauge!("payment_probe_latest_request_duration_seconds").set(snapshot.latest_duration);
    gauge!("payment_probe_last_run_timestamp_seconds")
        .set(snapshot.last_run_timestamp.unwrap_or(0) as f64);
}

/// Render a snapshot in the Prometheus text format.
pub fn render(snapshot: &MetricsSnapshot) -> String {
    let recorder = build_recorder();
    let handle = recorder.handle();
    metrics::with_local_recorder(&recorder, || record_snapshot(snapshot));
    handle.render()
}

struct Published {
    snapshot: Arc<MetricsSnapshot>,
    rendered: String,
}

impl Published {
    fn new(snapshot: MetricsSnapshot) -> Self {
        let rendered = render(&snapshot);
        Self {
            snapshot: Arc::new(snapshot),
            rendered,
        }
    }
}

/// Holds the last completed run for scraping.
///
/// Readers never see a partially accumulated run: only whole snapshots
/// are swapped in, after their batch has finished.
pub struct MetricsExporter {
    current: ArcSwap<Published>,
}

impl MetricsExporter {
    /// Start with an all-zero snapshot.
    pub fn new() -> Self {
        Self {
            current: ArcSwap::from_pointee(Published::new(MetricsSnapshot::default())),
        }
    }

    /// Replace the served snapshot.
    pub fn publish(&self, snapshot: MetricsSnapshot) -> Arc<MetricsSnapshot> {
        let published = Published::new(snapshot);
        let snapshot = published.snapshot.clone();
        self.current.store(Arc::new(published));
        snapshot
    }

    /// Last published snapshot.
    pub fn latest(&self) -> Arc<MetricsSnapshot> {
        self.current.load().snapshot.clone()
    }

    /// Exposition text of the last published snapshot.
    pub fn export(&self) -> String {
        self.current.load().rendered.clone()
    }

    /// True when nothing was published yet or the last run is older than `max_age`.
    pub fn is_stale(&self, now: SystemTime, max_age: Duration) -> bool {
        match self.current.load().snapshot.last_run_timestamp {
            None => true,
            Some(ts) => unix_secs(now).saturating_sub(ts) > max_age.as_secs(),
        }
    }
}

impl Default for MetricsExporter {
    fn default() -> Self {
        Self::new()
    }
}
