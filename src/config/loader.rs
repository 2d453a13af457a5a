//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::config::schema::AgentConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: '{value}'")]
    Env { var: &'static str, value: String },

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub const ENV_CREDENTIAL_TOKEN: &str = "PROBE_CREDENTIAL_TOKEN";
pub const ENV_ACCESS_TOKEN: &str = "PROBE_ACCESS_TOKEN";
pub const ENV_REQUESTS_PER_INTERVAL: &str = "PROBE_REQUESTS_PER_INTERVAL";
pub const ENV_INTERVAL_SECONDS: &str = "PROBE_INTERVAL_SECONDS";
pub const ENV_CALLBACK_URL: &str = "PROBE_CALLBACK_URL";
pub const ENV_AMOUNT: &str = "PROBE_AMOUNT";
pub const ENV_INVOICE_DATE: &str = "PROBE_INVOICE_DATE";
pub const ENV_BIND_ADDRESS: &str = "PROBE_BIND_ADDRESS";

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

/// Overlay environment values onto `config`.
///
/// `lookup` abstracts `std::env::var` so overrides can be tested without
/// touching process state.
pub fn apply_env_overrides<F>(config: &mut AgentConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(ENV_CREDENTIAL_TOKEN) {
        config.target.credential_token = v;
    }
    if let Some(v) = lookup(ENV_ACCESS_TOKEN) {
        config.access.token = v;
    }
    if let Some(v) = lookup(ENV_REQUESTS_PER_INTERVAL) {
        config.load.requests_per_interval = parse_env(ENV_REQUESTS_PER_INTERVAL, v)?;
    }
    if let Some(v) = lookup(ENV_INTERVAL_SECONDS) {
        config.load.interval_secs = parse_env(ENV_INTERVAL_SECONDS, v)?;
    }
    if let Some(v) = lookup(ENV_CALLBACK_URL) {
        config.target.callback_url = v;
    }
    if let Some(v) = lookup(ENV_AMOUNT) {
        config.target.amount = parse_env(ENV_AMOUNT, v)?;
    }
    if let Some(v) = lookup(ENV_INVOICE_DATE) {
        config.target.invoice_date = v;
    }
    if let Some(v) = lookup(ENV_BIND_ADDRESS) {
        config.listener.bind_address = v;
    }
    Ok(())
}

/// Parse a TOML document into a configuration (unvalidated).
pub fn parse_config(content: &str) -> Result<AgentConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Load the file at `path` (or defaults), apply environment overrides, validate.
pub fn load_config(path: Option<&Path>) -> Result<AgentConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse_config(&fs::read_to_string(path)?)?,
        None => AgentConfig::default(),
    };

    apply_env_overrides(&mut config, |k| std::env::var(k).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}
