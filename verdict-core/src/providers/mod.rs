//! Model backends and the failover chain built on top of them.
//!
//! A [`ModelBackend`] answers one prompt with one model id. The
//! [`ModelInvoker`] walks a role's ordered model chain over a backend and
//! only raises once every entry has failed.

pub mod failover;
pub mod openai_compat;

pub use failover::{ChainInvoker, CircuitBreaker, CircuitState, ModelInvoker};
pub use openai_compat::{ModelEndpoint, OpenAiCompatBackend};

use crate::config::VerdictConfig;
use crate::error::{ConfigError, LlmError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A single model endpoint family.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Run one completion against `model` and return the text.
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, LlmError>;
}

/// Create the HTTP backend described by the configuration.
pub fn create_backend(config: &VerdictConfig) -> Result<Arc<dyn ModelBackend>, ConfigError> {
    let backend = OpenAiCompatBackend::new(
        &config.models,
        Duration::from_secs(config.failover.request_timeout_secs),
    )?;
    Ok(Arc::new(backend))
}

/// A scripted backend for tests and offline runs.
///
/// Responses are chosen by the first rule whose needle appears in the system
/// prompt or user message, then by per-model defaults, then by the global
/// default. Models registered with [`MockModelBackend::fail_model`] always error.
pub struct MockModelBackend {
    rules: Vec<(String, String)>,
    model_defaults: HashMap<String, String>,
    default_response: Option<String>,
    failing: HashSet<String>,
    outage_calls: usize,
    calls: Mutex<Vec<String>>,
}

impl MockModelBackend {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            model_defaults: HashMap::new(),
            default_response: None,
            failing: HashSet::new(),
            outage_calls: 0,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A backend that always answers with `text`.
    pub fn with_response(text: &str) -> Self {
        Self::new().default_response(text)
    }

    pub fn default_response(mut self, text: &str) -> Self {
        self.default_response = Some(text.to_string());
        self
    }

    /// Answer `text` whenever `needle` appears in the prompt or message.
    pub fn respond_when(mut self, needle: &str, text: &str) -> Self {
        self.rules.push((needle.to_string(), text.to_string()));
        self
    }

    /// Answer `text` for every call to `model` that matches no rule.
    pub fn respond_for_model(mut self, model: &str, text: &str) -> Self {
        self.model_defaults
            .insert(model.to_string(), text.to_string());
        self
    }

    pub fn fail_model(mut self, model: &str) -> Self {
        self.failing.insert(model.to_string());
        self
    }

    /// Fail the first `n` calls regardless of model, then answer normally.
    pub fn fail_first(mut self, n: usize) -> Self {
        self.outage_calls = n;
        self
    }

    /// Models called so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

impl Default for MockModelBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelBackend for MockModelBackend {
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, LlmError> {
        let call_index = {
            let mut calls = self
                .calls
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            calls.push(model.to_string());
            calls.len() - 1
        };

        if call_index < self.outage_calls {
            return Err(LlmError::Connection {
                message: format!("mock outage on call {}", call_index + 1),
            });
        }

        if self.failing.contains(model) {
            return Err(LlmError::Connection {
                message: format!("mock model {model} is down"),
            });
        }

        let matched = self
            .rules
            .iter()
            .find(|(needle, _)| system_prompt.contains(needle) || user_message.contains(needle))
            .map(|(_, text)| text.clone());

        matched
            .or_else(|| self.model_defaults.get(model).cloned())
            .or_else(|| self.default_response.clone())
            .ok_or_else(|| LlmError::UnsupportedModel {
                model: model.to_string(),
            })
    }
}
