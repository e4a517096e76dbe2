//! Gemini provider client (`generateContent` API).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Completion, GenerateOptions, InferenceError, InferenceService, Usage};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// Larger models can take minutes on long ranking contexts.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Gemini inference client bound to one model.
pub struct GeminiClient {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GeminiClient {
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

    /// Build from the `GEMINI_API_KEY` environment variable.
    pub fn from_env(model: &str) -> Result<Self, InferenceError> {
        let key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| InferenceError::MissingApiKey("gemini".to_string()))?;
        Self::new(key, model)
    }

    fn request_body(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
        options: &GenerateOptions,
    ) -> Value {
        let mut generation_config = json!({
            "temperature": options.temperature,
            "maxOutputTokens": options.max_output_units,
        });
        if options.json_response {
            generation_config["responseMimeType"] = json!("application/json");
        }
        let mut body = json!({
            "contents": [{"parts": [{"text": prompt}]}],
            "generationConfig": generation_config,
        });
        if let Some(system) = system_instruction {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        body
    }
}

#[async_trait]
impl InferenceService for GeminiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
        options: &GenerateOptions,
    ) -> Result<Completion, InferenceError> {
        let url = format!(
            "{API_BASE}/{}:generateContent?key={}",
            self.model, self.api_key
        );
        let response = self
            .client
            .post(&url)
            .json(&self.request_body(prompt, system_instruction, options))
            .send()
            .await
            .map_err(|e| InferenceError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(InferenceError::RequestFailed(format!(
                "Gemini API error ({status}): {body}"
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| InferenceError::ParseError(e.to_string()))?;

        let text = payload["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or(InferenceError::EmptyResponse)?;

        let usage = match (
            payload["usageMetadata"]["promptTokenCount"].as_u64(),
            payload["usageMetadata"]["candidatesTokenCount"].as_u64(),
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
