//! Error types for the observer agent.
//!

use crate::config::ConfigurationError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ObserverError {
    /// An observer body returned an error or panicked. Never fatal to future runs.
    #[error("Observer {observer} faulted: {reason}")]
    ObserverFault { observer: String, reason: String },
    #[error("Observer {observer} exceeded its execution budget of {budget_ms}ms")]
    Timeout { observer: String, budget_ms: u64 },
    #[error("Operation cancelled: {0}")]
    Cancelled(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    /// Invariant violation inside the engine itself. Fatal to the process.
    #[error("Scheduler fault: {0}")]
    SchedulerFault(String),
    #[error("Health reporting error: {0}")]
    ReportingError(String),
    #[error("Collector error: {0}")]
    CollectorError(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ObserverError {
    pub fn observer_fault<O: Into<String>, R: std::fmt::Display>(observer: O, reason: R) -> Self {
        Self::ObserverFault {
            observer: observer.into(),
            reason: reason.to_string(),
        }
    }

    pub fn collector<E: std::fmt::Display>(error: E) -> Self {
        Self::CollectorError(error.to_string())
    }

    /// Cancellation is a benign stop condition and must never be logged as an error.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ObserverError::Cancelled(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ObserverError::SchedulerFault(_))
    }
}

impl From<ConfigurationError> for ObserverError {
    fn from(error: ConfigurationError) -> Self {
        ObserverError::ConfigurationError(error.to_string())
    }
}

impl From<serde_json::Error> for ObserverError {
    fn from(error: serde_json::Error) -> Self {
        ObserverError::Internal(format!("JSON serialization error: {error}"))
    }
}

impl From<std::io::Error> for ObserverError {
    fn from(error: std::io::Error) -> Self {
        ObserverError::CollectorError(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ObserverError>;
