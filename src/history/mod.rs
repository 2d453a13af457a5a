//! Attempt history.
//!
//! # Data Flow
//! ```text
//! pipeline attempt
//!     → failure_log.rs ring buffer (all attempts, bounded, oldest evicted)
//!     → JsonlSink queue (failures only) → writer thread → append-only file
//!
//! /logs and /status
//!     → failure_log.rs page()/recent(), newest first
//! ```
//!
//! Rotation and retention of the sink file are left to the host.

pub mod failure_log;

pub use failure_log::{FailureLog, FailureRecord, JsonlSink};
