//! Probe subsystem.
//!
//! # Data Flow
//! ```text
//! batch.rs (one run)
//!     → pacer wait
//!     → invoice.rs (next correlation id)
//!     → pipeline.rs
//!         POST token endpoint → classify → record
//!         GET  <redirect>/<token> (or PhaseSkipped) → classify → record
//!     → aggregator snapshot when every probe has finished
//! ```
//!
//! # Design Decisions
//! - Probes may overlap; the pacer limits issue rate, a semaphore caps overlap
//! - Invoice order across concurrent probes is not preserved

pub mod batch;
pub mod invoice;
pub mod pipeline;
pub mod types;

pub use batch::Prober;
pub use invoice::{InvoiceId, InvoiceIdGenerator};
pub use pipeline::RequestPipeline;
pub use types::{Endpoint, Outcome, ProbeAttempt, ProbeResult};
