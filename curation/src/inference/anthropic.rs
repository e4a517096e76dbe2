//! Anthropic provider client (`messages` API).
//!
//! Claude does not expose a JSON response mode, so callers parse its output
//! through `extract_json_object` when they asked for structured data.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Completion, GenerateOptions, InferenceError, InferenceService, Usage};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Anthropic inference client bound to one model.
pub struct AnthropicClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub fn new(api_key: String, model: &str) -> Result<Self, InferenceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InferenceError::RequestFailed(e.to_string()))?;
        Ok(Self {
            api_key,
            model: model.to_string(),
            client,
        })
    }

    /// Build from the `ANTHROPIC_API_KEY` environment variable.
    pub fn from_env(model: &str) -> Result<Self, InferenceError> {
        let key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| InferenceError::MissingApiKey("anthropic".to_string()))?;
        Self::new(key, model)
    }
}

#[async_trait]
impl InferenceService for AnthropicClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
        options: &GenerateOptions,
    ) -> Result<Completion, InferenceError> {
        let mut body = json!({
            "model": self.model,
            "max_tokens": options.max_output_units,
            "temperature": options.temperature,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(system) = system_instruction {
            body["system"] = json!(system);
        }

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| InferenceError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::RequestFailed(format!(
                "Anthropic API error ({status}): {body}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| InferenceError::ParseError(e.to_string()))?;

        let text = payload["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or(InferenceError::EmptyResponse)?;

        let usage = match (
            payload["usage"]["input_tokens"].as_u64(),
            payload["usage"]["output_tokens"].as_u64(),
        ) {
            (Some(input_units), Some(output_units)) => Some(Usage {
                input_units,
                output_units,
            }),
            _ => None,
        };

        Ok(Completion { text, usage })
    }
}
