//! Error types for the relay engine.
//!
//! Only [`EngineError::QueueFull`] and [`EngineError::ShuttingDown`] ever cross the
//! public `enqueue` boundary. Dispatch failures are classified into [`SendError`] by
//! the collaborator and summarised as [`DispatchError`] by the dispatch client; both
//! are handled inside the engine and surface only through health, metrics and the
//! dead-letter log.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ConfigurationError;
use crate::constants::Tier;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Queue full: {tier} tier is at capacity ({capacity})")]
    QueueFull { tier: Tier, capacity: usize },
    #[error("Shutting down: {tier} tier no longer accepts work")]
    ShuttingDown { tier: Tier },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Worker {worker_id} crashed: {reason}")]
    WorkerCrashed { worker_id: String, reason: String },
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Whether the caller of `enqueue` can act on this error (back off, reroute, stop).
    pub fn is_caller_actionable(&self) -> bool {
        matches!(
            self,
            EngineError::QueueFull { .. } | EngineError::ShuttingDown { .. }
        )
    }
}

impl From<ConfigurationError> for EngineError {
    fn from(error: ConfigurationError) -> Self {
        EngineError::Configuration(error.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::Internal(format!("JSON serialization error: {error}"))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::Internal(format!("I/O error: {error}"))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Outcome classification a [`Dispatcher`](crate::dispatch::Dispatcher) reports for one send.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum SendError {
    /// Timeout, connection failure, 5xx-equivalent. Retried.
    #[error("transient: {0}")]
    Transient(String),
    /// The collaborator rejected the payload as invalid. Never retried.
    #[error("permanent: {0}")]
    Permanent(String),
}

impl SendError {
    pub fn transient(message: impl Into<String>) -> Self {
        SendError::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        SendError::Permanent(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SendError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            SendError::Transient(msg) | SendError::Permanent(msg) => msg,
        }
    }
}

/// Result of a whole dispatch call across all endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DispatchError {
    #[error("all endpoints exhausted after {attempts} attempts: {last_error}")]
    Transient { attempts: u32, last_error: String },
    #[error("payload rejected by {endpoint}: {reason}")]
    Permanent { endpoint: String, reason: String },
}

impl DispatchError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, DispatchError::Permanent { .. })
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}
