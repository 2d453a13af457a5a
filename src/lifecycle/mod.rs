//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Build pipeline, prober, exporter, scheduler → Agent
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Scheduler loop leaves its sleep → In-flight batch drains
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Ordered shutdown: stop serving, stop scheduling, drain the batch

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use signals::wait_for_signal;
pub use startup::{build, build_with_clock, Agent, StartupError};
