//! One measurement batch.
//!
//! Resets the aggregator, issues up to `requests_per_interval` probes paced
//! across the window, waits for all of them, then returns the snapshot.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::config::{BatchMode, LoadConfig};
use crate::error::FaultResult;
use crate::observability::{MetricsAggregator, MetricsSnapshot};
use crate::pacing::{Clock, Pacer};
use crate::probe::invoice::InvoiceIdGenerator;
use crate::probe::pipeline::RequestPipeline;
use crate::probe::types::ProbeResult;
use crate::scheduler::BatchJob;

/// Runs batches of probes through the pipeline.
pub struct Prober {
    pipeline: Arc<RequestPipeline>,
    ids: Arc<InvoiceIdGenerator>,
    aggregator: Arc<MetricsAggregator>,
    clock: Arc<dyn Clock>,
    load: LoadConfig,
}

#[derive(Debug, Default)]
struct Tally {
    issued: u64,
    succeeded: u64,
}

impl Tally {
    fn add(&mut self, result: &ProbeResult) {
        if result.is_success() {
            self.succeeded += 1;
        }
    }
}

impl Prober {
    pub fn new(
        pipeline: Arc<RequestPipeline>,
        ids: Arc<InvoiceIdGenerator>,
        aggregator: Arc<MetricsAggregator>,
        clock: Arc<dyn Clock>,
        load: LoadConfig,
    ) -> Self {
        Self {
            pipeline,
            ids,
            aggregator,
            clock,
            load,
        }
    }

    fn elapsed_since(&self, start: std::time::SystemTime) -> Duration {
        self.clock.now().duration_since(start).unwrap_or_default()
    }

    /// Execute one batch and return its snapshot.
    pub async fn run_batch(&self) -> FaultResult<MetricsSnapshot> {
        self.aggregator.reset();

        let window = self.load.interval();
        let count = self.load.requests_per_interval;
        let started = self.clock.now();
        let mut pacer = Pacer::new(count, window, self.clock.clone());
        let in_flight = Arc::new(Semaphore::new(self.load.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();
        let mut tally = Tally::default();

        tracing::info!(
            count,
            window_secs = window.as_secs(),
            mode = ?self.load.mode,
            spacing_ms = pacer.spacing().as_millis() as u64,
            "Batch starting"
        );

        for _ in 0..count {
            pacer.wait().await;
            if self.elapsed_since(started) >= window {
                tracing::warn!(
                    issued = tally.issued,
                    "Batch window elapsed before all probes were issued"
                );
                break;
            }

            let invoice_id = self.ids.next();
            tally.issued += 1;

            match self.load.mode {
                BatchMode::Sequential => {
                    let result = self.pipeline.run(invoice_id).await;
                    tally.add(&result);
                }
                BatchMode::Concurrent => {
                    let Ok(permit) = in_flight.clone().acquire_owned().await else {
                        break;
                    };
                    let pipeline = self.pipeline.clone();
                    tasks.spawn(
                        async move {
                            let _permit = permit;
                            pipeline.run(invoice_id).await
                        }
                        .in_current_span(),
                    );
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            tally.add(&joined?);
        }

        let snapshot = self.aggregator.snapshot();
        tracing::info!(
            issued = tally.issued,
            succeeded = tally.succeeded,
            success_rate = snapshot.success_rate,
            p50 = snapshot.p50,
            p90 = snapshot.p90,
            p99 = snapshot.p99,
            "Batch completed"
        );
        Ok(snapshot)
    }
}

#[async_trait]
impl BatchJob for Prober {
    async fn run(&self) -> FaultResult<MetricsSnapshot> {
        self.run_batch().await
    }
}
