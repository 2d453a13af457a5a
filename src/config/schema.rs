//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the agent.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the probe agent.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Inbound listener (metrics, status, force-run).
    pub listener: ListenerConfig,

    /// Payment API under test.
    pub target: TargetConfig,

    /// Batch size and pacing.
    pub load: LoadConfig,

    /// Periodic cadence and fault backoff.
    pub schedule: ScheduleConfig,

    /// Outbound call timeouts.
    pub timeouts: TimeoutConfig,

    /// Inbound shared secret.
    pub access: AccessConfig,

    /// Attempt history and failure log file.
    pub history: HistoryConfig,

    /// Logging settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9090").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// The two-phase payment API being probed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetConfig {
    /// `POST` endpoint returning `{success, data: {token}}`.
    pub token_url: String,

    /// Base of the `GET <redirect_url>/<token>` endpoint.
    pub redirect_url: String,

    /// Provider credential sent as `token` in the token request.
    pub credential_token: String,

    /// Callback URL sent with each invoice.
    pub callback_url: String,

    /// Invoice amount.
    pub amount: u64,

    /// Invoice date, passed through verbatim.
    pub invoice_date: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            token_url: "https://ipg.gardeshpay.ir/v1/provider/payment/getToken".to_string(),
            redirect_url: "https://ipg.gardeshpay.ir/v1/provider/payment/redirect".to_string(),
            credential_token: String::new(),
            callback_url: "https://www.google.com".to_string(),
            amount: 10_000,
            invoice_date: "1403-11-30".to_string(),
        }
    }
}

/// How probes within a batch are issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Pace issues, let calls overlap.
    #[default]
    Concurrent,
    /// Pace, call, await, repeat.
    Sequential,
}

/// Load shape of one batch.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadConfig {
    /// Probes per batch window.
    pub requests_per_interval: u32,

    /// Batch window in seconds.
    pub interval_secs: u64,

    pub mode: BatchMode,

    /// Upper bound on overlapping probes in concurrent mode.
    pub max_in_flight: usize,
}

impl LoadConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            requests_per_interval: 600,
            interval_secs: 60,
            mode: BatchMode::Concurrent,
            max_in_flight: 64,
        }
    }
}

/// Periodic scheduling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Seconds between aligned batch starts.
    pub period_secs: u64,

    /// Pause after a faulted batch before resuming the loop.
    pub fault_backoff_secs: u64,

    /// Run one batch immediately at startup.
    pub run_on_start: bool,
}

impl ScheduleConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn fault_backoff(&self) -> Duration {
        Duration::from_secs(self.fault_backoff_secs)
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            period_secs: 3600,
            fault_backoff_secs: 10,
            run_on_start: true,
        }
    }
}

/// Timeout configuration for outbound calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Inbound access gate.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AccessConfig {
    /// Shared secret; empty disables the gate.
    pub token: String,
}

impl AccessConfig {
    pub fn is_enabled(&self) -> bool {
        !self.token.is_empty()
    }
}

/// Attempt history settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Records kept in memory.
    pub capacity: usize,

    /// Append-only JSON-lines file for failures.
    pub failure_log_path: Option<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            failure_log_path: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml() {
        let config: AgentConfig = toml::from_str(
            r#"
            [target]
            credential_token = "abc"

            [load]
            requests_per_interval = 10
            mode = "sequential"
            "#,
        )
        .unwrap();

        assert_eq!(config.target.credential_token, "abc");
        assert_eq!(config.target.amount, 10_000);
        assert_eq!(config.load.requests_per_interval, 10);
        assert_eq!(config.load.interval_secs, 60);
        assert_eq!(config.load.mode, BatchMode::Sequential);
        assert_eq!(config.schedule.fault_backoff(), Duration::from_secs(10));
        assert!(!config.access.is_enabled());
    }
}
