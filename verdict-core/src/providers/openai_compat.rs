//! OpenAI-compatible chat completions backend.
//!
//! DeepSeek, DashScope (Qwen) and Zhipu (GLM) all expose the
//! `/chat/completions` shape, so one backend serves every endpoint in a
//! role's model chain. Each chain entry is an endpoint id.

use super::ModelBackend;
use crate::error::{ConfigError, LlmError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// One addressable model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelEndpoint {
    /// The id used in role model chains.
    pub id: String,
    pub base_url: String,
    /// Environment variable holding the bearer token.
    pub api_key_env: String,
    /// Model name sent upstream.
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

/// The three endpoints the built-in model chains refer to.
pub fn default_endpoints() -> Vec<ModelEndpoint> {
    vec![
        ModelEndpoint {
            id: "deepseek-chat".to_string(),
            base_url: "https://api.deepseek.com/v1".to_string(),
            api_key_env: "DEEPSEEK_API_KEY".to_string(),
            model: "deepseek-chat".to_string(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        },
        ModelEndpoint {
            id: "qwen-plus".to_string(),
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            api_key_env: "DASHSCOPE_API_KEY".to_string(),
            model: "qwen-plus".to_string(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        },
        ModelEndpoint {
            id: "glm-4-flash".to_string(),
            base_url: "https://open.bigmodel.cn/api/paas/v4".to_string(),
            api_key_env: "ZHIPU_API_KEY".to_string(),
            model: "glm-4-flash".to_string(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        },
    ]
}

pub struct OpenAiCompatBackend {
    client: Client,
    endpoints: HashMap<String, ModelEndpoint>,
    timeout: Duration,
}

impl OpenAiCompatBackend {
    pub fn new(endpoints: &[ModelEndpoint], timeout: Duration) -> Result<Self, ConfigError> {
        let mut by_id = HashMap::with_capacity(endpoints.len());
        for endpoint in endpoints {
            url::Url::parse(&endpoint.base_url).map_err(|e| ConfigError::Invalid {
                message: format!("model '{}' has an invalid base_url: {e}", endpoint.id),
            })?;
            if by_id
                .insert(endpoint.id.clone(), endpoint.clone())
                .is_some()
            {
                return Err(ConfigError::Invalid {
                    message: format!("duplicate model id '{}'", endpoint.id),
                });
            }
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            endpoints: by_id,
            timeout,
        })
    }

    fn api_key(endpoint: &ModelEndpoint) -> Result<String, LlmError> {
        let is_local =
            endpoint.base_url.contains("localhost") || endpoint.base_url.contains("127.0.0.1");
        match std::env::var(&endpoint.api_key_env) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ if is_local => Ok("local".to_string()),
            _ => Err(LlmError::AuthFailed {
                provider: format!("{}: env var '{}' not set", endpoint.id, endpoint.api_key_env),
            }),
        }
    }

    /// Map an HTTP status code to the appropriate LlmError.
    fn map_http_error(status: reqwest::StatusCode, body: &str, provider: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed");
                LlmError::AuthFailed {
                    provider: provider.to_string(),
                }
            }
            429 => LlmError::RateLimited {
                retry_after_secs: 5,
            },
            code if code >= 500 => LlmError::ApiRequest {
                message: format!("Server error ({code}): {body}"),
            },
            code => LlmError::ApiRequest {
                message: format!("HTTP {code}: {body}"),
            },
        }
    }

    /// Pull `choices[0].message.content` out of a completion response.
    fn parse_response(json: &Value, model: &str) -> Result<String, LlmError> {
        let content = json
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| LlmError::ResponseParse {
                message: "missing choices[0].message.content".to_string(),
            })?;

        if content.trim().is_empty() {
            return Err(LlmError::EmptyResponse {
                model: model.to_string(),
            });
        }
        Ok(content.to_string())
    }
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend {
    async fn complete(
        &self,
        model: &str,
        system_prompt: &str,
        user_message: &str,
    ) -> Result<String, LlmError> {
        let endpoint = self
            .endpoints
            .get(model)
            .ok_or_else(|| LlmError::UnsupportedModel {
                model: model.to_string(),
            })?;
        let api_key = Self::api_key(endpoint)?;
        let url = format!("{}/chat/completions", endpoint.base_url.trim_end_matches('/'));

        let body = json!({
            "model": endpoint.model,
            "messages": [
                { "role": "system", "content": system_prompt },
                { "role": "user", "content": user_message },
            ],
            "temperature": endpoint.temperature,
            "max_tokens": endpoint.max_tokens,
            "stream": false,
        });

        debug!(url = %url, model = %endpoint.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else if e.is_connect() {
                    LlmError::Connection {
                        message: e.to_string(),
                    }
                } else {
                    LlmError::ApiRequest {
                        message: format!("Request failed: {e}"),
                    }
                }
            })?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| LlmError::ApiRequest {
            message: format!("Failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body, &endpoint.id));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON: {e}"),
            })?;

        Self::parse_response(&json, model)
    }
}
