//! Fault-level error types.
//!
//! Ordinary request failures are not errors here: they travel as
//! [`Outcome`](crate::probe::Outcome) values on each recorded attempt. The
//! types below cover conditions that abort a batch or reject a trigger.

use thiserror::Error;

/// Misconfiguration or internal failure inside the probe pipeline.
#[derive(Debug, Error)]
pub enum ProbeFault {
    /// Configured endpoint URL did not parse.
    #[error("invalid endpoint url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Endpoint URL cannot carry a path segment (e.g. `mailto:`).
    #[error("endpoint url '{0}' cannot be used as a base for redemption paths")]
    CannotBeABase(String),

    /// The outbound HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),

    /// A probe task panicked or was cancelled.
    #[error("probe task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for pipeline and batch operations.
pub type FaultResult<T> = Result<T, ProbeFault>;

/// Errors surfaced by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// A trigger arrived while a batch was already running.
    #[error("a batch is already running; trigger rejected")]
    ConcurrentRunRejected,

    /// A batch failed unexpectedly; the loop backs off and continues.
    #[error("scheduler fault: {0}")]
    SchedulerFault(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScheduleError::ConcurrentRunRejected;
        assert!(err.to_string().contains("already running"));

        let err = ScheduleError::SchedulerFault("boom".into());
        assert_eq!(err.to_string(), "scheduler fault: boom");

        let err = ProbeFault::CannotBeABase("mailto:x".into());
        assert!(err.to_string().contains("mailto:x"));
    }
}
