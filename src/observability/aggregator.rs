//! Per-run metrics aggregation.
//!
//! # Responsibilities
//! - Count attempts per `(endpoint, outcome)`
//! - Collect latency samples of completed calls
//! - Compute success rate and percentiles into a [`MetricsSnapshot`]
//!
//! # Design Decisions
//! - Reset-then-accumulate: a run never merges with a previous run
//! - One mutex linearizes concurrent `record` calls
//! - Percentile `p` is the sorted sample at index `floor(p * len)`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::probe::{Endpoint, Outcome, ProbeAttempt};

/// Counters and percentiles for one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EndpointSnapshot {
    pub success_count: u64,
    /// Network, protocol and parse failures.
    pub failure_count: u64,
    /// Redemptions skipped for lack of a token.
    pub skipped_count: u64,
    pub outcomes: BTreeMap<Outcome, u64>,
    /// Latency samples in seconds, in record order.
    pub duration_samples: Vec<f64>,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
}

/// Point-in-time view of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub endpoints: BTreeMap<Endpoint, EndpointSnapshot>,
    /// All latency samples in seconds, in record order.
    pub duration_samples: Vec<f64>,
    /// Percentage of attempts that succeeded; skips count against it.
    pub success_rate: f64,
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
    pub total_latency: f64,
    pub average_latency: f64,
    pub latest_duration: f64,
    /// Unix seconds at which the run completed; set when published.
    pub last_run_timestamp: Option<u64>,
}

impl MetricsSnapshot {
    pub fn endpoint(&self, endpoint: Endpoint) -> EndpointSnapshot {
        self.endpoints.get(&endpoint).cloned().unwrap_or_default()
    }

    pub fn total_attempts(&self) -> u64 {
        self.endpoints
            .values()
            .map(|e| e.success_count + e.failure_count + e.skipped_count)
            .sum()
    }
}

/// Value at sorted index `floor(p * len)`, or 0 for no samples.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((p * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    sorted[idx]
}

fn sorted(samples: &[f64]) -> Vec<f64> {
    let mut out = samples.to_vec();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

#[derive(Debug, Default)]
struct EndpointCounters {
    outcomes: BTreeMap<Outcome, u64>,
    samples: Vec<f64>,
}

#[derive(Debug, Default)]
struct Inner {
    endpoints: BTreeMap<Endpoint, EndpointCounters>,
    samples: Vec<f64>,
}

/// Thread-safe accumulator for the current run.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    inner: Mutex<Inner>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear every counter and sample.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *inner = Inner::default();
    }

    /// Count one attempt and keep its latency if the call completed.
    pub fn record(&self, attempt: &ProbeAttempt) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let secs = attempt.duration.as_secs_f64();
        let completed = attempt.outcome.is_completed();

        let counters = inner.endpoints.entry(attempt.endpoint).or_default();
        *counters.outcomes.entry(attempt.outcome).or_default() += 1;
        if completed {
            counters.samples.push(secs);
            inner.samples.push(secs);
        }
    }

    /// Compute the snapshot of everything recorded since the last reset.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);

        let mut endpoints = BTreeMap::new();
        let mut successes = 0u64;
        let mut attempts = 0u64;

        for endpoint in Endpoint::ALL {
            let mut snap = EndpointSnapshot::default();
            if let Some(counters) = inner.endpoints.get(&endpoint) {
                for (&outcome, &n) in &counters.outcomes {
                    match outcome {
                        Outcome::Success => snap.success_count += n,
                        Outcome::PhaseSkipped => snap.skipped_count += n,
                        _ => snap.failure_count += n,
                    }
                }
                snap.outcomes = counters.outcomes.clone();
                snap.duration_samples = counters.samples.clone();
                let ordered = sorted(&counters.samples);
                snap.p50 = percentile(&ordered, 0.5);
                snap.p90 = percentile(&ordered, 0.9);
                snap.p99 = percentile(&ordered, 0.99);
            }
            successes += snap.success_count;
            attempts += snap.success_count + snap.failure_count + snap.skipped_count;
            endpoints.insert(endpoint, snap);
        }

        let ordered = sorted(&inner.samples);
        let total_latency: f64 = inner.samples.iter().sum();
        let average_latency = if inner.samples.is_empty() {
            0.0
        } else {
            total_latency / inner.samples.len() as f64
        };

        MetricsSnapshot {
            endpoints,
            duration_samples: inner.samples.clone(),
            success_rate: if attempts == 0 {
                0.0
            } else {
                successes as f64 / attempts as f64 * 100.0
            },
            p50: percentile(&ordered, 0.5),
            p90: percentile(&ordered, 0.9),
            p99: percentile(&ordered, 0.99),
            total_latency,
            average_latency,
            latest_duration: inner.samples.last().copied().unwrap_or(0.0),
            last_run_timestamp: None,
        }
    }
}
