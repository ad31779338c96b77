//! Model-chain failover with per-model circuit breakers.
//!
//! Provides resilient role execution by:
//! - Trying chain entries in priority order, each only after the previous failed
//! - Deferring models whose circuit breaker is open to the end of the chain
//! - Recovering deferred models via a half-open call after a timeout
//!
//! Breaker state lives in one [`ChainInvoker`]; build one per session so a
//! burst of failures in one analysis does not shape the next.

use super::ModelBackend;
use crate::error::LlmError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Circuit Breaker
// ---------------------------------------------------------------------------

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CircuitState {
    /// Normal operation: calls are permitted.
    Closed,
    /// Too many failures: calls are blocked.
    Open { since: Instant },
    /// Recovering: one call is permitted to test the model.
    HalfOpen,
}

/// A circuit breaker that trips after consecutive failures and recovers
/// after a timeout.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    failure_count: usize,
    failure_threshold: usize,
    recovery_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: usize, recovery_timeout: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
        }
    }

    /// Whether a call is currently permitted.
    pub fn is_call_permitted(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open { since } => {
                if since.elapsed() >= self.recovery_timeout {
                    debug!("Circuit breaker transitioning to half-open");
                    self.state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&mut self) {
        self.failure_count = 0;
        self.state = CircuitState::Closed;
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
        if self.state == CircuitState::HalfOpen || self.failure_count >= self.failure_threshold {
            warn!(
                failures = self.failure_count,
                threshold = self.failure_threshold,
                "Circuit breaker opening"
            );
            self.state = CircuitState::Open {
                since: Instant::now(),
            };
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }
}

// ---------------------------------------------------------------------------
// ModelInvoker
// ---------------------------------------------------------------------------

/// Runs a prompt over an ordered model chain.
#[async_trait]
pub trait ModelInvoker: Send + Sync {
    /// Try `model_chain` in order and return the first success.
    ///
    /// Raises only after every entry has failed.
    async fn invoke(
        &self,
        role_id: &str,
        system_prompt: &str,
        user_message: &str,
        model_chain: &[String],
    ) -> Result<String, LlmError>;
}

/// The default [`ModelInvoker`]: priority-order failover over one backend.
pub struct ChainInvoker {
    backend: Arc<dyn ModelBackend>,
    breakers: DashMap<String, CircuitBreaker>,
    failure_threshold: usize,
    recovery_timeout: Duration,
}

impl ChainInvoker {
    pub fn new(
        backend: Arc<dyn ModelBackend>,
        failure_threshold: usize,
        recovery_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            breakers: DashMap::new(),
            failure_threshold,
            recovery_timeout,
        }
    }

    fn permitted(&self, model: &str) -> bool {
        self.breakers
            .entry(model.to_string())
            .or_insert_with(|| CircuitBreaker::new(self.failure_threshold, self.recovery_timeout))
            .is_call_permitted()
    }

    fn record(&self, model: &str, success: bool) {
        if let Some(mut breaker) = self.breakers.get_mut(model) {
            if success {
                breaker.record_success();
            } else {
                breaker.record_failure();
            }
        }
    }

    /// Current breaker state for `model`, if it has been called.
    pub fn circuit_state(&self, model: &str) -> Option<CircuitState> {
        self.breakers.get(model).map(|b| b.state())
    }

    async fn attempt(
        &self,
        role_id: &str,
        model: &str,
        position: usize,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, LlmError> {
        let outcome = match self
            .backend
            .complete(model, system_prompt, user_message)
            .await
        {
            Ok(text) if text.trim().is_empty() => Err(LlmError::EmptyResponse {
                model: model.to_string(),
            }),
            other => other,
        };

        match &outcome {
            Ok(_) => {
                self.record(model, true);
                if position > 0 {
                    info!(role = role_id, model, position, "Fallback model succeeded");
                }
            }
            Err(e) => {
                self.record(model, false);
                warn!(
                    role = role_id,
                    model,
                    error = %e,
                    "Model call failed, trying next in chain"
                );
            }
        }
        outcome
    }
}

#[async_trait]
impl ModelInvoker for ChainInvoker {
    async fn invoke(
        &self,
        role_id: &str,
        system_prompt: &str,
        user_message: &str,
        model_chain: &[String],
    ) -> Result<String, LlmError> {
        let mut last_error = String::from("empty model chain");
        let mut deferred = Vec::new();

        for (position, model) in model_chain.iter().enumerate() {
            if !self.permitted(model) {
                debug!(role = role_id, model = model.as_str(), "Deferring model with open circuit");
                deferred.push((position, model));
                continue;
            }
            match self
                .attempt(role_id, model, position, system_prompt, user_message)
                .await
            {
                Ok(text) => return Ok(text),
                Err(e) => last_error = e.to_string(),
            }
        }

        // Open circuits reorder the chain but never remove a model from it.
        for (position, model) in deferred {
            match self
                .attempt(role_id, model, position, system_prompt, user_message)
                .await
            {
                Ok(text) => return Ok(text),
                Err(e) => last_error = e.to_string(),
            }
        }

        Err(LlmError::ChainExhausted {
            role: role_id.to_string(),
            attempts: model_chain.len(),
            last_error,
        })
    }
}
