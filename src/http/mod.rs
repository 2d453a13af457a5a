//! Inbound HTTP surface.
//!
//! # Data Flow
//! ```text
//! Request
//!     → TraceLayer, TimeoutLayer
//!     → auth.rs (access token gate, skipped for `/`)
//!     → handlers.rs
//!         /metrics   → exporter (last published snapshot)
//!         /force-run → scheduler.trigger()
//!         /status    → schedule state + snapshot counters + recent failures
//!         /logs      → failure log pages
//! ```

pub mod auth;
pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer};
