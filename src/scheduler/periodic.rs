//! Periodic, single-flight batch scheduling.
//!
//! # Responsibilities
//! - Start batches on wall-clock boundaries (`period - now % period`)
//! - Accept manual triggers without blocking, reject them while running
//! - Publish each completed snapshot to the exporter
//! - Survive faulted batches: log, back off, retry
//!
//! # Design Decisions
//! - Batches run in their own task, so a panic becomes a fault, not a crash
//! - Shutdown is observed only while sleeping; an in-flight batch finishes
//! - The run slot is an RAII guard owned by the batch task, so it is released
//!   when the batch ends, even if the caller stops waiting

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ScheduleConfig;
use crate::error::{FaultResult, ScheduleError};
use crate::lifecycle::{Shutdown, ShutdownSignal};
use crate::observability::{MetricsExporter, MetricsSnapshot};
use crate::pacing::clock::{unix_secs, Clock};
use crate::scheduler::state::{RunGuard, ScheduleState, StateCell};

/// A unit of work the scheduler runs under mutual exclusion.
#[async_trait]
pub trait BatchJob: Send + Sync + 'static {
    async fn run(&self) -> FaultResult<MetricsSnapshot>;
}

/// Time from `now` until the next multiple of `period` since the epoch.
///
/// Exactly on a boundary, the wait is one full period.
pub fn until_next_boundary(now: SystemTime, period: Duration) -> Duration {
    let period_ms = period.as_millis().max(1);
    let now_ms = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    Duration::from_millis((period_ms - now_ms % period_ms) as u64)
}

/// Drives batches periodically and on demand.
pub struct Scheduler {
    job: Arc<dyn BatchJob>,
    exporter: Arc<MetricsExporter>,
    clock: Arc<dyn Clock>,
    state: StateCell,
    config: ScheduleConfig,
}

impl Scheduler {
    pub fn new(
        job: Arc<dyn BatchJob>,
        exporter: Arc<MetricsExporter>,
        clock: Arc<dyn Clock>,
        config: ScheduleConfig,
    ) -> Self {
        Self {
            job,
            exporter,
            clock,
            state: StateCell::new(),
            config,
        }
    }

    pub fn state(&self) -> ScheduleState {
        self.state.get()
    }

    pub fn period(&self) -> Duration {
        self.config.period()
    }

    /// Start a batch in the background and return immediately.
    pub fn trigger(&self) -> Result<(), ScheduleError> {
        let guard = self.state.try_begin()?;
        // Faults are already logged and recorded in the state.
        drop(self.launch(guard));
        Ok(())
    }

    /// Run a batch now and wait for its snapshot.
    ///
    /// Dropping the returned future detaches from the batch; the run slot
    /// stays taken until the batch itself finishes.
    pub async fn run_once(&self) -> Result<Arc<MetricsSnapshot>, ScheduleError> {
        let guard = self.state.try_begin()?;
        self.launch(guard)
            .await
            .map_err(|e| ScheduleError::SchedulerFault(format!("batch task failed: {}", e)))?
    }

    /// Resolve once no batch is running.
    pub async fn wait_idle(&self) {
        self.state.wait_idle().await
    }

    /// Spawn the batch together with its bookkeeping. The guard moves into
    /// the task and is released only after publish or fault.
    fn launch(&self, guard: RunGuard) -> JoinHandle<Result<Arc<MetricsSnapshot>, ScheduleError>> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("batch", %run_id);
        let job = self.job.clone();
        let exporter = self.exporter.clone();
        let clock = self.clock.clone();

        tokio::spawn(async move {
            let joined = tokio::spawn(async move { job.run().await }.instrument(span)).await;
            settle(guard, joined, run_id, &exporter, clock.as_ref())
        })
    }

    /// Start the periodic loop.
    pub fn spawn(self: Arc<Self>, shutdown: &Shutdown) -> SchedulerHandle {
        let signal = shutdown.subscribe();
        let scheduler = self.clone();
        let task = tokio::spawn(self.run_loop(signal));
        SchedulerHandle {
            task,
            shutdown: shutdown.clone(),
            scheduler,
        }
    }

    async fn run_loop(self: Arc<Self>, mut shutdown: ShutdownSignal) {
        let period = self.config.period();
        let backoff = self.config.fault_backoff();
        let mut run_now = self.config.run_on_start;

        tracing::info!(
            period_secs = period.as_secs(),
            backoff_secs = backoff.as_secs(),
            run_on_start = run_now,
            "Scheduler starting"
        );

        loop {
            if !run_now {
                let now = self.clock.now();
                let wait = until_next_boundary(now, period);
                self.state.set_next_run(unix_secs(now + wait));
                tracing::debug!(wait_secs = wait.as_secs(), "Sleeping until next boundary");

                tokio::select! {
                    _ = self.clock.sleep(wait) => {}
                    _ = shutdown.recv() => break,
                }
            }
            run_now = false;

            match self.run_once().await {
                Ok(_) => {}
                Err(ScheduleError::ConcurrentRunRejected) => {
                    tracing::info!("Tick skipped: a manually triggered batch is running");
                }
                Err(ScheduleError::SchedulerFault(_)) => {
                    self.state.set_next_run(unix_secs(self.clock.now() + backoff));
                    tracing::warn!(backoff_secs = backoff.as_secs(), "Backing off before retry");
                    tokio::select! {
                        _ = self.clock.sleep(backoff) => run_now = true,
                        _ = shutdown.recv() => break,
                    }
                }
            }

            if shutdown.is_triggered() {
                break;
            }
        }

        tracing::info!("Scheduler stopped");
    }
}

/// Record the outcome of a finished batch and release its run slot.
fn settle(
    guard: RunGuard,
    joined: Result<FaultResult<MetricsSnapshot>, JoinError>,
    run_id: Uuid,
    exporter: &MetricsExporter,
    clock: &dyn Clock,
) -> Result<Arc<MetricsSnapshot>, ScheduleError> {
    let result = match joined {
        Ok(Ok(snapshot)) => Ok(snapshot),
        Ok(Err(fault)) => Err(fault.to_string()),
        Err(e) => Err(format!("batch task failed: {}", e)),
    };

    match result {
        Ok(mut snapshot) => {
            let finished_at = unix_secs(clock.now());
            snapshot.last_run_timestamp = Some(finished_at);
            let published = exporter.publish(snapshot);
            guard.complete(finished_at);
            tracing::info!(%run_id, success_rate = published.success_rate, "Snapshot published");
            Ok(published)
        }
        Err(message) => {
            guard.fault(&message);
            tracing::error!(%run_id, kind = "scheduler_fault", error = %message, "Batch faulted");
            Err(ScheduleError::SchedulerFault(message))
        }
    }
}

/// Owns the periodic task; shut it down explicitly.
pub struct SchedulerHandle {
    task: JoinHandle<()>,
    shutdown: Shutdown,
    scheduler: Arc<Scheduler>,
}

impl SchedulerHandle {
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Stop the loop, then wait for any in-flight batch to finish.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Scheduler task ended abnormally");
        }
        self.scheduler.wait_idle().await;
    }
}
