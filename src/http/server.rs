//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the management handlers
//! - Wire up middleware (tracing, timeout, access gate)
//! - Serve until the shutdown signal fires

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{AccessConfig, AgentConfig};
use crate::history::FailureLog;
use crate::http::auth::require_access;
use crate::http::handlers;
use crate::lifecycle::ShutdownSignal;
use crate::observability::MetricsExporter;
use crate::pacing::Clock;
use crate::scheduler::Scheduler;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub exporter: Arc<MetricsExporter>,
    pub history: Arc<FailureLog>,
    pub access: AccessConfig,
    pub clock: Arc<dyn Clock>,
}

/// Inbound management server.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState, config: &AgentConfig) -> Self {
        let router = Self::build_router(state, Duration::from_secs(config.timeouts.request_secs));
        Self { router }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
        Router::new()
            .route("/metrics", get(handlers::metrics))
            .route("/force-run", post(handlers::force_run))
            .route("/status", get(handlers::status))
            .route("/logs", get(handlers::logs))
            .route_layer(middleware::from_fn_with_state(state.clone(), require_access))
            .route("/", get(handlers::root))
            .with_state(state)
            .layer(TimeoutLayer::new(request_timeout))
            .layer(TraceLayer::new_for_http())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
