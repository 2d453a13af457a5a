//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration
//! - Build every subsystem in dependency order
//! - Hand back an [`Agent`] ready to spawn and serve
//!
//! Binding the listener and spawning the loop are left to the caller so
//! tests can assemble an agent without sockets or timers.

use std::sync::Arc;
use thiserror::Error;

use crate::config::validation::validate_config;
use crate::config::{AgentConfig, ConfigError};
use crate::error::ProbeFault;
use crate::history::{FailureLog, JsonlSink};
use crate::http::server::AppState;
use crate::observability::{MetricsAggregator, MetricsExporter};
use crate::pacing::{Clock, SystemClock};
use crate::probe::pipeline::build_client;
use crate::probe::{InvoiceIdGenerator, Prober, RequestPipeline};
use crate::scheduler::Scheduler;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("probe setup failed: {0}")]
    Probe(#[from] ProbeFault),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fully wired agent.
pub struct Agent {
    pub config: Arc<AgentConfig>,
    pub clock: Arc<dyn Clock>,
    pub exporter: Arc<MetricsExporter>,
    pub history: Arc<FailureLog>,
    pub scheduler: Arc<Scheduler>,
}

impl Agent {
    /// Shared state for the inbound HTTP surface.
    pub fn app_state(&self) -> AppState {
        AppState {
            scheduler: self.scheduler.clone(),
            exporter: self.exporter.clone(),
            history: self.history.clone(),
            access: self.config.access.clone(),
            clock: self.clock.clone(),
        }
    }
}

/// Assemble the agent against the wall clock.
pub fn build(config: AgentConfig) -> Result<Agent, StartupError> {
    build_with_clock(config, Arc::new(SystemClock))
}

/// Assemble the agent against an arbitrary clock.
pub fn build_with_clock(config: AgentConfig, clock: Arc<dyn Clock>) -> Result<Agent, StartupError> {
    validate_config(&config).map_err(ConfigError::Validation)?;

    let sink = match &config.history.failure_log_path {
        Some(path) => {
            let sink = JsonlSink::open(path)?;
            tracing::info!(path = %sink.path().display(), "Persisting failures");
            Some(sink)
        }
        None => None,
    };
    let history = Arc::new(FailureLog::with_sink(config.history.capacity, sink));

    let aggregator = Arc::new(MetricsAggregator::new());
    let client = build_client(&config.timeouts)?;
    let pipeline = Arc::new(RequestPipeline::new(
        client,
        config.target.clone(),
        clock.clone(),
        aggregator.clone(),
        history.clone(),
    )?);

    let ids = Arc::new(InvoiceIdGenerator::seeded_from(clock.now()));
    let prober = Arc::new(Prober::new(
        pipeline,
        ids,
        aggregator,
        clock.clone(),
        config.load.clone(),
    ));

    let exporter = Arc::new(MetricsExporter::new());
    let scheduler = Arc::new(Scheduler::new(
        prober,
        exporter.clone(),
        clock.clone(),
        config.schedule.clone(),
    ));

    tracing::info!(
        token_url = %config.target.token_url,
        requests_per_interval = config.load.requests_per_interval,
        interval_secs = config.load.interval_secs,
        period_secs = config.schedule.period_secs,
        "Agent assembled"
    );

    Ok(Agent {
        config: Arc::new(config),
        clock,
        exporter,
        history,
        scheduler,
    })
}
