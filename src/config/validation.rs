//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and that every URL
//! and address actually parses. All problems are returned, not just the first.

use std::fmt;
use std::net::SocketAddr;
use url::Url;

use crate::config::schema::AgentConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_http_url(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && !url.cannot_be_a_base() => {}
        Ok(url) => errors.push(ValidationError::new(
            field,
            format!("'{}' must be an http(s) url, got scheme '{}'", value, url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new(field, format!("'{}': {}", value, e))),
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    check_http_url("target.token_url", &config.target.token_url, &mut errors);
    check_http_url("target.redirect_url", &config.target.redirect_url, &mut errors);

    if config.load.requests_per_interval == 0 {
        errors.push(ValidationError::new("load.requests_per_interval", "must be > 0"));
    }
    if config.load.interval_secs == 0 {
        errors.push(ValidationError::new("load.interval_secs", "must be > 0"));
    }
    if config.load.max_in_flight == 0 {
        errors.push(ValidationError::new("load.max_in_flight", "must be > 0"));
    }
    if config.schedule.period_secs == 0 {
        errors.push(ValidationError::new("schedule.period_secs", "must be > 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.history.capacity == 0 {
        errors.push(ValidationError::new("history.capacity", "must be > 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
