//! Synthetic monitoring agent for a two-phase payment API.

pub mod config;
pub mod error;
pub mod history;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pacing;
pub mod probe;
pub mod scheduler;

pub use config::schema::AgentConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
