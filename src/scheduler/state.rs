//! Schedule state machine.
//!
//! # States
//! - Idle: no batch running, triggers accepted
//! - Running: exactly one batch in flight, triggers rejected
//!
//! # State Transitions
//! ```text
//! Idle → Running: try_begin() succeeds, returns a RunGuard
//! Running → Idle: RunGuard dropped when the batch task ends
//! Running → Running: try_begin() fails with ConcurrentRunRejected
//! ```

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

use crate::error::ScheduleError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Idle,
    Running,
}

/// Process-wide scheduling status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleState {
    pub phase: Phase,
    /// Unix seconds of the last successfully completed batch.
    pub last_run_timestamp: Option<u64>,
    /// Unix seconds of the next timer-driven batch.
    pub next_run_timestamp: Option<u64>,
    pub runs_completed: u64,
    pub runs_faulted: u64,
    pub triggers_rejected: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fault: Option<String>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<ScheduleState>,
    idle: Notify,
}

/// Shared handle to the single [`ScheduleState`].
#[derive(Debug, Clone, Default)]
pub struct StateCell {
    shared: Arc<Shared>,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ScheduleState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    pub fn get(&self) -> ScheduleState {
        self.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().phase == Phase::Running
    }

    /// Attempt `Idle → Running`. Never blocks.
    pub fn try_begin(&self) -> Result<RunGuard, ScheduleError> {
        let mut state = self.lock();
        if state.phase == Phase::Running {
            state.triggers_rejected += 1;
            return Err(ScheduleError::ConcurrentRunRejected);
        }
        state.phase = Phase::Running;
        Ok(RunGuard {
            cell: self.clone(),
        })
    }

    pub fn set_next_run(&self, ts: u64) {
        self.lock().next_run_timestamp = Some(ts);
    }

    /// Resolve once no batch is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if !self.is_running() {
                return;
            }
            notified.await;
        }
    }
}

/// Proof of holding the single run slot; releases it on drop.
#[derive(Debug)]
pub struct RunGuard {
    cell: StateCell,
}

impl RunGuard {
    /// Record a successful batch.
    pub fn complete(&self, finished_at: u64) {
        let mut state = self.cell.lock();
        state.last_run_timestamp = Some(finished_at);
        state.runs_completed += 1;
        state.last_fault = None;
    }

    /// Record a faulted batch.
    pub fn fault(&self, message: &str) {
        let mut state = self.cell.lock();
        state.runs_faulted += 1;
        state.last_fault = Some(message.to_string());
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.cell.lock().phase = Phase::Idle;
        self.cell.shared.idle.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_flight() {
        let cell = StateCell::new();
        let guard = cell.try_begin().unwrap();
        assert!(cell.is_running());
        assert_eq!(cell.try_begin().unwrap_err(), ScheduleError::ConcurrentRunRejected);
        assert_eq!(cell.get().triggers_rejected, 1);

        guard.complete(42);
        drop(guard);

        let state = cell.get();
        assert_eq!(state.phase, Phase::Idle);
        assert_eq!(state.last_run_timestamp, Some(42));
        assert!(cell.try_begin().is_ok());
    }

    #[test]
    fn test_guard_released_on_panic() {
        let cell = StateCell::new();
        let inner = cell.clone();
        let result = std::thread::spawn(move || {
            let _guard = inner.try_begin().unwrap();
            panic!("batch blew up");
        })
        .join();
        assert!(result.is_err());
        assert_eq!(cell.get().phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_wait_idle() {
        let cell = StateCell::new();
        let guard = cell.try_begin().unwrap();
        let waiter = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.wait_idle().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.unwrap();
    }
}
