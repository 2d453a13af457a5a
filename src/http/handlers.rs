use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::history::FailureRecord;
use crate::http::server::AppState;
use crate::observability::exporter::CONTENT_TYPE;
use crate::probe::Endpoint;
use crate::scheduler::ScheduleState;

pub const RECENT_FAILURES: usize = 10;
pub const DEFAULT_PAGE: usize = 50;
pub const MAX_PAGE: usize = 1000;

#[derive(Serialize)]
pub struct Liveness {
    pub service: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct EndpointCounters {
    pub success_count: u64,
    pub failure_count: u64,
    pub skipped_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub schedule: ScheduleState,
    pub success_rate: f64,
    pub last_run_timestamp: Option<u64>,
    pub endpoints: BTreeMap<Endpoint, EndpointCounters>,
    pub recent_failures: Vec<FailureRecord>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogsQuery {
    pub offset: usize,
    pub limit: Option<usize>,
    pub failed_only: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsPage {
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub records: Vec<FailureRecord>,
}

pub async fn root() -> Json<Liveness> {
    Json(Liveness {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
    })
}

/// Serve the last published snapshot; nudge the scheduler when it is stale.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let period = state.scheduler.period();
    if state.exporter.is_stale(state.clock.now(), period) {
        match state.scheduler.trigger() {
            Ok(()) => tracing::info!("Stale snapshot on scrape; batch triggered"),
            Err(e) => {
                tracing::debug!(error = %e, "Stale snapshot on scrape; batch already running")
            }
        }
    }

    ([(header::CONTENT_TYPE, CONTENT_TYPE)], state.exporter.export())
}

pub async fn force_run(State(state): State<AppState>) -> impl IntoResponse {
    match state.scheduler.trigger() {
        Ok(()) => {
            tracing::info!("Manual batch accepted");
            (
                StatusCode::ACCEPTED,
                Json(TriggerResponse {
                    accepted: true,
                    reason: None,
                }),
            )
        }
        Err(e) => {
            tracing::info!(error = %e, "Manual batch rejected");
            (
                StatusCode::CONFLICT,
                Json(TriggerResponse {
                    accepted: false,
                    reason: Some(e.to_string()),
                }),
            )
        }
    }
}

pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.exporter.latest();
    let endpoints = Endpoint::ALL
        .iter()
        .map(|&endpoint| {
            let e = snapshot.endpoint(endpoint);
            (
                endpoint,
                EndpointCounters {
                    success_count: e.success_count,
                    failure_count: e.failure_count,
                    skipped_count: e.skipped_count,
                },
            )
        })
        .collect();

    Json(StatusResponse {
        schedule: state.scheduler.state(),
        success_rate: snapshot.success_rate,
        last_run_timestamp: snapshot.last_run_timestamp,
        endpoints,
        recent_failures: state.history.recent(RECENT_FAILURES, true),
    })
}

pub async fn logs(State(state): State<AppState>, Query(query): Query<LogsQuery>) -> Json<LogsPage> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).min(MAX_PAGE);
    Json(LogsPage {
        total: state.history.count(query.failed_only),
        offset: query.offset,
        limit,
        records: state.history.page(query.offset, limit, query.failed_only),
    })
}
