//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline attempts
//!     → aggregator.rs (reset at batch start, record per call, snapshot at end)
//!     → exporter.rs (publish whole snapshot, render Prometheus text once)
//!     → /metrics, /status readers
//!
//! All subsystems:
//!     → logging.rs (structured tracing events, batch span with run_id)
//! ```
//!
//! # Design Decisions
//! - No global metric state: the aggregator is an explicit instance
//! - Readers see the last completed run, never a partial one
//! - Exposition uses a local recorder per snapshot

pub mod aggregator;
pub mod exporter;
pub mod logging;

pub use aggregator::{EndpointSnapshot, MetricsAggregator, MetricsSnapshot};
pub use exporter::MetricsExporter;
