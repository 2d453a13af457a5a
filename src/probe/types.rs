//! Probe data model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::probe::invoice::InvoiceId;

/// One of the two calls composing a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// `POST` token acquisition.
    Token,
    /// `GET` redemption at `<redirect>/<token>`.
    Redeem,
}

impl Endpoint {
    pub const ALL: [Endpoint; 2] = [Endpoint::Token, Endpoint::Redeem];

    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Token => "token",
            Endpoint::Redeem => "redeem",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classified result of a single call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// Transport failure: connect, timeout, reset, body read.
    NetworkError,
    /// The endpoint answered with an unexpected status.
    ProtocolError,
    /// HTTP 200 but the body lacked the expected success/token fields.
    ParseError,
    /// Redemption not attempted because no token was obtained.
    PhaseSkipped,
}

impl Outcome {
    pub const ALL: [Outcome; 5] = [
        Outcome::Success,
        Outcome::NetworkError,
        Outcome::ProtocolError,
        Outcome::ParseError,
        Outcome::PhaseSkipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::NetworkError => "network_error",
            Outcome::ProtocolError => "protocol_error",
            Outcome::ParseError => "parse_error",
            Outcome::PhaseSkipped => "phase_skipped",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// True when the endpoint produced an HTTP response we could time.
    pub fn is_completed(&self) -> bool {
        matches!(
            self,
            Outcome::Success | Outcome::ProtocolError | Outcome::ParseError
        )
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one call within a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeAttempt {
    pub invoice_id: InvoiceId,
    pub endpoint: Endpoint,
    /// Start time in milliseconds since the Unix epoch.
    pub started_at_ms: u64,
    #[serde(rename = "duration_secs", with = "duration_secs")]
    pub duration: Duration,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// Short error description for failed outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProbeAttempt {
    /// Redemption placeholder recorded when the token phase yields nothing.
    pub fn skipped(invoice_id: InvoiceId, started_at_ms: u64) -> Self {
        Self {
            invoice_id,
            endpoint: Endpoint::Redeem,
            started_at_ms,
            duration: Duration::ZERO,
            outcome: Outcome::PhaseSkipped,
            http_status: None,
            error: Some("no token".to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        !self.outcome.is_success()
    }
}

/// Both phases of one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub invoice_id: InvoiceId,
    pub token: ProbeAttempt,
    pub redeem: ProbeAttempt,
}

impl ProbeResult {
    /// A probe succeeds only when redemption succeeded.
    pub fn is_success(&self) -> bool {
        self.token.outcome.is_success() && self.redeem.outcome.is_success()
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_classes() {
        assert!(Outcome::Success.is_completed());
        assert!(Outcome::ParseError.is_completed());
        assert!(!Outcome::NetworkError.is_completed());
        assert!(!Outcome::PhaseSkipped.is_completed());
        assert_eq!(Outcome::PhaseSkipped.to_string(), "phase_skipped");
    }

    #[test]
    fn test_attempt_json_shape() {
        let attempt = ProbeAttempt {
            invoice_id: InvoiceId::from("1700000000"),
            endpoint: Endpoint::Token,
            started_at_ms: 42,
            duration: Duration::from_millis(250),
            outcome: Outcome::ProtocolError,
            http_status: Some(500),
            error: None,
        };
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["endpoint"], "token");
        assert_eq!(json["outcome"], "protocol_error");
        assert_eq!(json["duration_secs"], 0.25);
        assert_eq!(json["http_status"], 500);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_skipped_redeem() {
        let attempt = ProbeAttempt::skipped(InvoiceId::from("1"), 0);
        assert_eq!(attempt.endpoint, Endpoint::Redeem);
        assert!(attempt.is_failure());
        assert_eq!(attempt.error.as_deref(), Some("no token"));
    }
}
