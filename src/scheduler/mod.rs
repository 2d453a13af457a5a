//! Scheduling subsystem.
//!
//! # Data Flow
//! ```text
//! timer tick (aligned) ─┐
//! POST /force-run ──────┼→ state.rs try_begin (single flight)
//! stale /metrics ───────┘      → periodic.rs execute (batch task + run_id span)
//!                              → exporter publish
//!                              → RunGuard drop → Idle
//! ```

pub mod periodic;
pub mod state;

pub use periodic::{until_next_boundary, BatchJob, Scheduler, SchedulerHandle};
pub use state::{Phase, RunGuard, ScheduleState, StateCell};
