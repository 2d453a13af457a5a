//! Pacing subsystem.
//!
//! # Data Flow
//! ```text
//! batch loop
//!     → pacer.rs (wait interval/count between issues)
//!     → clock.rs (sleep on Tokio timers, or virtual time in tests)
//! ```
//!
//! # Design Decisions
//! - Clock is injected, never read from ambient globals
//! - Pacing limits the issue rate, not the completion rate

pub mod clock;
pub mod pacer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use pacer::Pacer;
