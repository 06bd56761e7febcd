//! # Dispatch Client
//!
//! Delivers an opaque payload to one of several ranked endpoints through a
//! collaborator-supplied [`Dispatcher`].
//!
//! ## Delivery rules
//!
//! - Available endpoints are tried in rank order, then unavailable ones in rank order
//! - Each endpoint gets up to `max_retries_per_endpoint` attempts with exponential backoff
//! - Every attempt is bounded by the call timeout; a timeout counts as a transient failure
//! - A permanent error aborts the whole call immediately
//! - The whole call never outlives its deadline

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::DispatchConfig;
use crate::error::{DispatchError, EngineError, Result, SendError};
use crate::models::Payload;
use crate::resilience::{EndpointSnapshot, EndpointTarget, RetryFailure, RetryPolicy};

/// Collaborator that performs the actual send. The engine never inspects the payload.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn send(&self, endpoint: &str, payload: &Payload) -> std::result::Result<(), SendError>;
}

/// Successful delivery
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReceipt {
    pub endpoint: String,
    /// Sends made during this call, including the successful one
    pub attempts: u32,
    pub elapsed: Duration,
}

pub struct DispatchClient {
    dispatcher: Arc<dyn Dispatcher>,
    endpoints: Vec<Arc<EndpointTarget>>,
    endpoint_policy: RetryPolicy,
    call_timeout: Duration,
    default_deadline: Duration,
}

impl fmt::Debug for DispatchClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchClient")
            .field("endpoints", &self.endpoints)
            .field("endpoint_policy", &self.endpoint_policy)
            .field("call_timeout", &self.call_timeout)
            .field("default_deadline", &self.default_deadline)
            .finish_non_exhaustive()
    }
}

impl DispatchClient {
    pub fn new(config: &DispatchConfig, dispatcher: Arc<dyn Dispatcher>) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(EngineError::Configuration(
                "dispatch.endpoints must list at least one endpoint".to_string(),
            ));
        }

        let endpoints = config
            .endpoints
            .iter()
            .enumerate()
            .map(|(rank, address)| {
                Arc::new(EndpointTarget::new(
                    address.clone(),
                    rank,
                    config.failure_threshold,
                    config.recovery_threshold,
                ))
            })
            .collect();

        Ok(Self {
            dispatcher,
            endpoints,
            endpoint_policy: config.endpoint_policy(),
            call_timeout: config.call_timeout(),
            default_deadline: config.deadline(),
        })
    }

    /// Configured ceiling for one dispatch call
    pub fn default_deadline(&self) -> Duration {
        self.default_deadline
    }

    pub fn endpoints(&self) -> Vec<EndpointSnapshot> {
        self.endpoints.iter().map(|e| e.snapshot()).collect()
    }

    /// Available endpoints by rank, then unavailable ones by rank
    fn attempt_order(&self) -> Vec<&Arc<EndpointTarget>> {
        let (mut order, unavailable): (Vec<_>, Vec<_>) =
            self.endpoints.iter().partition(|e| e.is_available());
        order.extend(unavailable);
        order
    }

    /// Deliver `payload` within `deadline`
    pub async fn dispatch(
        &self,
        payload: &Payload,
        deadline: Duration,
    ) -> std::result::Result<DispatchReceipt, DispatchError> {
        let started = Instant::now();
        let deadline_at = started + deadline;
        let mut attempts = 0;
        let mut last_error = String::from("dispatch deadline expired before any attempt");

        for target in self.attempt_order() {
            if Instant::now() >= deadline_at {
                break;
            }

            let mut sends = 0;
            let outcome = self
                .endpoint_policy
                .retry(
                    Some(deadline_at),
                    |attempt| {
                        sends = attempt + 1;
                        self.send_once(target, payload, deadline_at, attempt)
                    },
                    SendError::is_transient,
                )
                .await;
            attempts += sends;

            match outcome {
                Ok(()) => {
                    return Ok(DispatchReceipt {
                        endpoint: target.address().to_string(),
                        attempts,
                        elapsed: started.elapsed(),
                    });
                }
                Err(RetryFailure {
                    error: SendError::Permanent(reason),
                    ..
                }) => {
                    warn!(
                        endpoint = %target.address(),
                        reason = %reason,
                        "⛔ Payload rejected permanently - not retrying"
                    );
                    return Err(DispatchError::Permanent {
                        endpoint: target.address().to_string(),
                        reason,
                    });
                }
                Err(failure) => {
                    debug!(
                        endpoint = %target.address(),
                        rank = target.rank(),
                        attempts = failure.attempts,
                        error = %failure.error,
                        "Endpoint exhausted - failing over"
                    );
                    last_error = failure.error.message().to_string();
                }
            }
        }

        Err(DispatchError::Transient {
            attempts,
            last_error,
        })
    }

    async fn send_once(
        &self,
        target: &EndpointTarget,
        payload: &Payload,
        deadline_at: Instant,
        attempt: u32,
    ) -> std::result::Result<(), SendError> {
        let remaining = deadline_at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SendError::transient("dispatch deadline expired"));
        }
        let budget = self.call_timeout.min(remaining);

        match tokio::time::timeout(budget, self.dispatcher.send(target.address(), payload)).await {
            Ok(Ok(())) => {
                target.record_success();
                Ok(())
            }
            Ok(Err(error)) => {
                if error.is_transient() {
                    target.record_failure();
                }
                debug!(
                    endpoint = %target.address(),
                    attempt = attempt + 1,
                    error = %error,
                    "Send failed"
                );
                Err(error)
            }
            Err(_) => {
                target.record_failure();
                Err(SendError::transient(format!(
                    "call to {} timed out after {}ms",
                    target.address(),
                    budget.as_millis()
                )))
            }
        }
    }
}
