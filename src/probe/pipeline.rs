//! Two-phase probe execution.
//!
//! # Responsibilities
//! - Phase 1: `POST` the invoice to the token endpoint, extract `data.token`
//! - Phase 2: `GET <redirect>/<token>`, only when phase 1 produced a token
//! - Classify each phase into an [`Outcome`] and record it
//!
//! # Design Decisions
//! - Request failures are data: `run` returns a [`ProbeResult`], never an error
//! - Every attempt goes to the aggregator and the history; failures carry
//!   a response excerpt or error text as diagnostics
//! - Only misconfiguration surfaces as a [`ProbeFault`], at construction

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::config::{TargetConfig, TimeoutConfig};
use crate::error::{FaultResult, ProbeFault};
use crate::history::{FailureLog, FailureRecord};
use crate::observability::MetricsAggregator;
use crate::pacing::clock::{unix_millis, Clock};
use crate::probe::invoice::InvoiceId;
use crate::probe::types::{Endpoint, Outcome, ProbeAttempt, ProbeResult};

/// Token request body. Field order and names are fixed by the provider API.
#[derive(Debug, Clone, Serialize)]
pub struct TokenRequest<'a> {
    pub token: &'a str,
    #[serde(rename = "invoiceNumber")]
    pub invoice_number: &'a str,
    #[serde(rename = "invoiceDate")]
    pub invoice_date: &'a str,
    pub amount: u64,
    pub callback: &'a str,
    #[serde(rename = "IpAddressNotAllowed")]
    pub ip_address_not_allowed: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    success: bool,
    data: Option<TokenData>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: Option<String>,
}

/// Extract the redemption token from a 200 response body.
pub fn parse_token(body: &str) -> Result<String, String> {
    let parsed: TokenResponse =
        serde_json::from_str(body).map_err(|e| format!("invalid token response: {}", e))?;
    if !parsed.success {
        return Err("response success flag is not true".to_string());
    }
    match parsed.data.and_then(|d| d.token) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err("response is missing data.token".to_string()),
    }
}

/// Build the shared outbound client.
pub fn build_client(timeouts: &TimeoutConfig) -> FaultResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(timeouts.connect_secs))
        .timeout(Duration::from_secs(timeouts.request_secs))
        .build()?;
    Ok(client)
}

fn parse_base(url: &str) -> FaultResult<Url> {
    let parsed = Url::parse(url).map_err(|source| ProbeFault::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    if parsed.cannot_be_a_base() {
        return Err(ProbeFault::CannotBeABase(url.to_string()));
    }
    Ok(parsed)
}

/// Executes probes against the payment API.
pub struct RequestPipeline {
    client: reqwest::Client,
    target: TargetConfig,
    token_url: Url,
    redirect_base: Url,
    clock: Arc<dyn Clock>,
    aggregator: Arc<MetricsAggregator>,
    history: Arc<FailureLog>,
}

impl RequestPipeline {
    pub fn new(
        client: reqwest::Client,
        target: TargetConfig,
        clock: Arc<dyn Clock>,
        aggregator: Arc<MetricsAggregator>,
        history: Arc<FailureLog>,
    ) -> FaultResult<Self> {
        let token_url = parse_base(&target.token_url)?;
        let redirect_base = parse_base(&target.redirect_url)?;
        Ok(Self {
            client,
            target,
            token_url,
            redirect_base,
            clock,
            aggregator,
            history,
        })
    }

    /// `<redirect>/<token>`, with the token percent-encoded as one segment.
    pub fn redeem_url(&self, token: &str) -> Url {
        let mut url = self.redirect_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(token);
        }
        url
    }

    /// Run both phases for one invoice.
    pub async fn run(&self, invoice_id: InvoiceId) -> ProbeResult {
        let (token_attempt, token) = self.acquire_token(&invoice_id).await;

        let redeem_attempt = match token {
            Some(token) => self.redeem(&invoice_id, &token).await,
            None => {
                let now_ms = unix_millis(self.clock.now());
                let attempt = ProbeAttempt::skipped(invoice_id.clone(), now_ms);
                self.emit(FailureRecord::new(attempt.clone()));
                attempt
            }
        };

        ProbeResult {
            invoice_id,
            token: token_attempt,
            redeem: redeem_attempt,
        }
    }

    async fn acquire_token(&self, invoice_id: &InvoiceId) -> (ProbeAttempt, Option<String>) {
        let body = TokenRequest {
            token: &self.target.credential_token,
            invoice_number: invoice_id.as_str(),
            invoice_date: &self.target.invoice_date,
            amount: self.target.amount,
            callback: &self.target.callback_url,
            ip_address_not_allowed: "",
        };

        let started_at_ms = unix_millis(self.clock.now());
        let start = Instant::now();
        let sent = self
            .client
            .post(self.token_url.clone())
            .json(&body)
            .send()
            .await;
        let duration = start.elapsed();

        let mut attempt = ProbeAttempt {
            invoice_id: invoice_id.clone(),
            endpoint: Endpoint::Token,
            started_at_ms,
            duration,
            outcome: Outcome::Success,
            http_status: None,
            error: None,
        };

        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                attempt.outcome = Outcome::NetworkError;
                attempt.error = Some(transport_error(&e));
                self.emit(FailureRecord::new(attempt.clone()).with_detail(e.to_string()));
                return (attempt, None);
            }
        };

        let status = response.status();
        attempt.http_status = Some(status.as_u16());

        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                attempt.outcome = Outcome::NetworkError;
                attempt.error = Some(transport_error(&e));
                self.emit(FailureRecord::new(attempt.clone()).with_detail(e.to_string()));
                return (attempt, None);
            }
        };

        if status != reqwest::StatusCode::OK {
            attempt.outcome = Outcome::ProtocolError;
            attempt.error = Some(format!("unexpected status {}", status.as_u16()));
            self.emit(FailureRecord::new(attempt.clone()).with_excerpt(&text));
            return (attempt, None);
        }

        match parse_token(&text) {
            Ok(token) => {
                self.emit(FailureRecord::new(attempt.clone()));
                (attempt, Some(token))
            }
            Err(reason) => {
                attempt.outcome = Outcome::ParseError;
                attempt.error = Some(reason.clone());
                self.emit(
                    FailureRecord::new(attempt.clone())
                        .with_excerpt(&text)
                        .with_detail(reason),
                );
                (attempt, None)
            }
        }
    }

    async fn redeem(&self, invoice_id: &InvoiceId, token: &str) -> ProbeAttempt {
        let url = self.redeem_url(token);

        let started_at_ms = unix_millis(self.clock.now());
        let start = Instant::now();
        let sent = self.client.get(url).send().await;
        let duration = start.elapsed();

        let mut attempt = ProbeAttempt {
            invoice_id: invoice_id.clone(),
            endpoint: Endpoint::Redeem,
            started_at_ms,
            duration,
            outcome: Outcome::Success,
            http_status: None,
            error: None,
        };

        match sent {
            Err(e) => {
                attempt.outcome = Outcome::NetworkError;
                attempt.error = Some(transport_error(&e));
                self.emit(FailureRecord::new(attempt.clone()).with_detail(e.to_string()));
            }
            Ok(response) => {
                let status = response.status();
                attempt.http_status = Some(status.as_u16());
                if status == reqwest::StatusCode::OK {
                    self.emit(FailureRecord::new(attempt.clone()));
                } else {
                    attempt.outcome = Outcome::ProtocolError;
                    attempt.error = Some(format!("unexpected status {}", status.as_u16()));
                    let text = response.text().await.unwrap_or_default();
                    self.emit(FailureRecord::new(attempt.clone()).with_excerpt(&text));
                }
            }
        }

        attempt
    }

    fn emit(&self, record: FailureRecord) {
        let attempt = &record.attempt;
        if attempt.is_failure() {
            tracing::warn!(
                invoice_id = %attempt.invoice_id,
                endpoint = %attempt.endpoint,
                outcome = %attempt.outcome,
                status = ?attempt.http_status,
                error = attempt.error.as_deref().unwrap_or(""),
                "Probe phase failed"
            );
        } else {
            tracing::debug!(
                invoice_id = %attempt.invoice_id,
                endpoint = %attempt.endpoint,
                duration_ms = attempt.duration.as_millis() as u64,
                "Probe phase succeeded"
            );
        }
        self.aggregator.record(attempt);
        self.history.append(record);
    }
}

fn transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timeout".to_string()
    } else if e.is_connect() {
        "connect failed".to_string()
    } else {
        "transport error".to_string()
    }
}
