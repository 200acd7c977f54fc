//! OpenAI-compatible chat completions client.
//!
//! Sends a system + user message pair with a `json_schema` response format and
//! returns `choices[0].message.content`. Works against Groq, OpenAI and any
//! server speaking the same protocol.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use tracing::{debug, warn};

use bazaar_core::config::LlmConfig;

use crate::{LlmError, StructuredRequest, TextGenerator};

pub struct ChatCompletionsClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: Option<String>,
}

impl ChatCompletionsClient {
    /// Build a client from configuration, reading the API key from the
    /// configured environment variable.
    ///
    /// A missing key is not an error here so the server can still start; every
    /// generation call then fails with [`LlmError::NotConfigured`].
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!(
                env = %config.api_key_env,
                "LLM API key not set; chat turns will fail until it is provided"
            );
        }
        Self::new(config, api_key)
    }

    pub fn new(config: &LlmConfig, api_key: Option<String>) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            endpoint: config.base_url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
        })
    }

    fn request_body(&self, request: &StructuredRequest) -> Value {
        json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                { "role": "system", "content": request.system },
                { "role": "user", "content": request.user }
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": request.schema_name,
                    "strict": true,
                    "schema": request.schema
                }
            }
        })
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionsClient {
    async fn generate(&self, request: &StructuredRequest) -> Result<String, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::NotConfigured("missing API key".to_string()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .map_err(|e| LlmError::NotConfigured(format!("invalid auth header: {e}")))?,
        );

        debug!(schema = %request.schema_name, model = %self.model, "Sending completion request");
        let resp = self
            .http
            .post(&self.endpoint)
            .headers(headers)
            .json(&self.request_body(request))
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        extract_content(&body)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Pull `choices[0].message.content` out of a completions response body.
fn extract_content(body: &str) -> Result<String, LlmError> {
    let json: Value = serde_json::from_str(body)?;
    json.get("choices")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|v| v.get("message"))
        .and_then(|v| v.get("content"))
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
        .ok_or_else(|| {
            LlmError::MalformedResponse("missing choices[0].message.content".to_string())
        })
}
