//! Scripted dispatcher standing in for downstream endpoints.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_engine::{Dispatcher, Payload, SendError};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tokio::time::Instant;

/// What one send call does
#[derive(Debug, Clone, PartialEq)]
pub enum Scripted {
    Deliver,
    Transient(&'static str),
    Permanent(&'static str),
    /// Panic inside the calling worker loop
    Panic,
    /// Never complete
    Hang,
}

/// One observed send call
#[derive(Debug, Clone)]
pub struct Call {
    pub at: Instant,
    pub endpoint: String,
    pub payload: Payload,
}

/// Plays back a script of outcomes, then falls back to a fixed outcome.
///
/// Endpoints marked down always fail transiently without consuming the script.
#[derive(Debug)]
pub struct MockDispatcher {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    latency: Duration,
    down: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
}

impl MockDispatcher {
    pub fn delivering() -> Self {
        Self::scripted(Vec::new(), Scripted::Deliver)
    }

    pub fn scripted(script: Vec<Scripted>, fallback: Scripted) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            latency: Duration::ZERO,
            down: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_endpoint_down(self, endpoint: &str) -> Self {
        self.down.lock().insert(endpoint.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Gaps between consecutive calls
    pub fn call_gaps(&self) -> Vec<Duration> {
        let calls = self.calls.lock();
        calls.windows(2).map(|pair| pair[1].at - pair[0].at).collect()
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn send(&self, endpoint: &str, payload: &Payload) -> Result<(), SendError> {
        self.calls.lock().push(Call {
            at: Instant::now(),
            endpoint: endpoint.to_string(),
            payload: payload.clone(),
        });

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let endpoint_down = self.down.lock().contains(endpoint);
        if endpoint_down {
            return Err(SendError::Transient(format!("{endpoint} unreachable")));
        }

        let next = self.script.lock().pop_front();
        match next.unwrap_or_else(|| self.fallback.clone()) {
            Scripted::Deliver => Ok(()),
            Scripted::Transient(reason) => Err(SendError::Transient(reason.to_string())),
            Scripted::Permanent(reason) => Err(SendError::Permanent(reason.to_string())),
            Scripted::Panic => panic!("scripted dispatcher panic"),
            Scripted::Hang => std::future::pending().await,
        }
    }
}
