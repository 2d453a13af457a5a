//! Scheduler behavior with stub batch jobs and a virtual clock.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use payment_probe::config::ScheduleConfig;
use payment_probe::error::{FaultResult, ProbeFault, ScheduleError};
use payment_probe::lifecycle::Shutdown;
use payment_probe::observability::{MetricsExporter, MetricsSnapshot};
use payment_probe::pacing::{ManualClock, SystemClock};
use payment_probe::scheduler::{BatchJob, Phase, Scheduler};

fn snapshot(success_rate: f64) -> MetricsSnapshot {
    MetricsSnapshot {
        success_rate,
        ..MetricsSnapshot::default()
    }
}

/// Faults on the first run, succeeds afterwards.
struct FlakyJob {
    calls: AtomicU32,
    recovered: Notify,
}

#[async_trait]
impl BatchJob for FlakyJob {
    async fn run(&self) -> FaultResult<MetricsSnapshot> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            return Err(ProbeFault::CannotBeABase("mailto:ops@example.com".into()));
        }
        self.recovered.notify_one();
        Ok(snapshot(100.0))
    }
}

/// Faults once, then holds the retry until released.
struct FaultThenHoldJob {
    calls: AtomicU32,
    retried: Notify,
    release: Notify,
}

#[async_trait]
impl BatchJob for FaultThenHoldJob {
    async fn run(&self) -> FaultResult<MetricsSnapshot> {
        match self.calls.fetch_add(1, Ordering::SeqCst) {
            0 => Err(ProbeFault::CannotBeABase("mailto:ops@example.com".into())),
            1 => {
                self.retried.notify_one();
                self.release.notified().await;
                Ok(snapshot(100.0))
            }
            _ => Ok(snapshot(100.0)),
        }
    }
}

/// Blocks until released.
struct GatedJob {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl BatchJob for GatedJob {
    async fn run(&self) -> FaultResult<MetricsSnapshot> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(snapshot(75.0))
    }
}

/// Tracks how many runs overlap; each run blocks until released.
struct OverlapJob {
    active: AtomicU32,
    peak: AtomicU32,
    release: Notify,
}

#[async_trait]
impl BatchJob for OverlapJob {
    async fn run(&self) -> FaultResult<MetricsSnapshot> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.release.notified().await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(snapshot(50.0))
    }
}

struct PanickingJob;

#[async_trait]
impl BatchJob for PanickingJob {
    async fn run(&self) -> FaultResult<MetricsSnapshot> {
        let crash = true;
        if crash {
            panic!("probe worker crashed");
        }
        Ok(snapshot(0.0))
    }
}

fn schedule(run_on_start: bool) -> ScheduleConfig {
    ScheduleConfig {
        period_secs: 3600,
        fault_backoff_secs: 10,
        run_on_start,
    }
}

#[tokio::test]
async fn test_fault_backs_off_then_recovers() {
    let clock = ManualClock::at_unix(1_700_000_000);
    let job = Arc::new(FlakyJob {
        calls: AtomicU32::new(0),
        recovered: Notify::new(),
    });
    let exporter = Arc::new(MetricsExporter::new());
    let scheduler = Arc::new(Scheduler::new(
        job.clone(),
        exporter.clone(),
        Arc::new(clock.clone()),
        schedule(true),
    ));

    let shutdown = Shutdown::new();
    let handle = scheduler.clone().spawn(&shutdown);

    tokio::time::timeout(Duration::from_secs(5), job.recovered.notified())
        .await
        .expect("scheduler never recovered");
    handle.shutdown().await;

    let sleeps = clock.sleeps();
    assert_eq!(sleeps[0], Duration::from_secs(10));
    // 1_700_000_010 is 810s past an hour boundary.
    assert_eq!(sleeps[1], Duration::from_secs(2790));

    let state = scheduler.state();
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.runs_faulted, 1);
    assert!(state.runs_completed >= 1);
    assert_eq!(state.last_fault, None);
    assert_eq!(exporter.latest().success_rate, 100.0);
    assert!(exporter.latest().last_run_timestamp >= Some(1_700_000_010));
}

#[tokio::test]
async fn test_backoff_sets_next_run() {
    let job = Arc::new(FaultThenHoldJob {
        calls: AtomicU32::new(0),
        retried: Notify::new(),
        release: Notify::new(),
    });
    let scheduler = Arc::new(Scheduler::new(
        job.clone(),
        Arc::new(MetricsExporter::new()),
        Arc::new(ManualClock::at_unix(1_700_000_000)),
        schedule(true),
    ));

    let shutdown = Shutdown::new();
    let handle = scheduler.clone().spawn(&shutdown);

    tokio::time::timeout(Duration::from_secs(5), job.retried.notified())
        .await
        .expect("scheduler never retried");
    assert_eq!(scheduler.state().next_run_timestamp, Some(1_700_000_010));
    assert_eq!(scheduler.state().runs_faulted, 1);

    job.release.notify_one();
    handle.shutdown().await;
}

#[tokio::test]
async fn test_trigger_while_running_is_rejected() {
    let job = Arc::new(GatedJob {
        started: Notify::new(),
        release: Notify::new(),
    });
    let exporter = Arc::new(MetricsExporter::new());
    let scheduler = Arc::new(Scheduler::new(
        job.clone(),
        exporter.clone(),
        Arc::new(ManualClock::at_unix(1_700_000_000)),
        schedule(false),
    ));

    scheduler.trigger().unwrap();
    job.started.notified().await;

    assert_eq!(scheduler.trigger(), Err(ScheduleError::ConcurrentRunRejected));
    assert_eq!(
        scheduler.run_once().await.unwrap_err(),
        ScheduleError::ConcurrentRunRejected
    );
    assert_eq!(scheduler.state().phase, Phase::Running);
    assert_eq!(scheduler.state().triggers_rejected, 2);
    // Nothing published while the batch is in flight.
    assert_eq!(exporter.latest().last_run_timestamp, None);

    job.release.notify_one();
    scheduler.wait_idle().await;

    assert_eq!(scheduler.state().runs_completed, 1);
    assert_eq!(exporter.latest().success_rate, 75.0);
    assert_eq!(exporter.latest().last_run_timestamp, Some(1_700_000_000));
}

#[tokio::test]
async fn test_abandoned_run_once_keeps_run_slot() {
    let job = Arc::new(OverlapJob {
        active: AtomicU32::new(0),
        peak: AtomicU32::new(0),
        release: Notify::new(),
    });
    let exporter = Arc::new(MetricsExporter::new());
    let scheduler = Arc::new(Scheduler::new(
        job.clone(),
        exporter.clone(),
        Arc::new(ManualClock::at_unix(1_700_000_000)),
        schedule(false),
    ));

    let waited = tokio::time::timeout(Duration::from_millis(50), scheduler.run_once()).await;
    assert!(waited.is_err());

    // The batch is still in flight after its caller gave up.
    assert_eq!(scheduler.state().phase, Phase::Running);
    assert_eq!(scheduler.trigger(), Err(ScheduleError::ConcurrentRunRejected));

    job.release.notify_one();
    scheduler.wait_idle().await;

    assert_eq!(job.peak.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.state().runs_completed, 1);
    assert_eq!(exporter.latest().success_rate, 50.0);
    assert!(scheduler.trigger().is_ok());
    job.release.notify_one();
    scheduler.wait_idle().await;
    assert_eq!(job.peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_panicking_batch_becomes_fault() {
    let scheduler = Scheduler::new(
        Arc::new(PanickingJob),
        Arc::new(MetricsExporter::new()),
        Arc::new(ManualClock::at_unix(0)),
        schedule(false),
    );

    let err = scheduler.run_once().await.unwrap_err();
    assert!(matches!(err, ScheduleError::SchedulerFault(_)));

    let state = scheduler.state();
    assert_eq!(state.phase, Phase::Idle);
    assert_eq!(state.runs_faulted, 1);
    assert!(state.last_fault.is_some());
}

#[tokio::test]
async fn test_shutdown_interrupts_long_sleep() {
    let job = Arc::new(GatedJob {
        started: Notify::new(),
        release: Notify::new(),
    });
    let scheduler = Arc::new(Scheduler::new(
        job,
        Arc::new(MetricsExporter::new()),
        Arc::new(SystemClock),
        schedule(false),
    ));

    let shutdown = Shutdown::new();
    let handle = scheduler.clone().spawn(&shutdown);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(scheduler.state().next_run_timestamp.is_some());

    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("shutdown waited for the full period");
    assert_eq!(scheduler.state().runs_completed, 0);
}
