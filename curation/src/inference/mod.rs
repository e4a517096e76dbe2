//! Abstract AI inference service and response hygiene helpers.
//!
//! Providers differ only in wire shape; the engine sees one contract:
//! `generate(prompt, system_instruction, options) -> text + optional usage`.
//! Structured output from generative models is routinely wrapped in code
//! fences, prose, or corrupted by raw control characters, so the parsing
//! helpers here scrub a response before any `serde_json` pass.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub mod anthropic;
pub mod gemini;
pub mod testing;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;

/// Provider-reported token accounting for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_units: u64,
    pub output_units: u64,
}

/// One inference call's result.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Raw response text.
    pub text: String,
    /// Usage metadata, when the provider reports it.
    pub usage: Option<Usage>,
}

/// Per-call generation knobs.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    /// Ask the provider for a JSON-leaning response mode where supported.
    pub json_response: bool,
    /// Output cap, in provider units.
    pub max_output_units: u32,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            json_response: true,
            max_output_units: 4096,
        }
    }
}

impl GenerateOptions {
    /// Deterministic structured output, used by the consensus stage.
    pub fn deterministic() -> Self {
        Self {
            temperature: 0.0,
            ..Self::default()
        }
    }
}

/// Errors from an inference provider.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("response parse error: {0}")]
    ParseError(String),

    #[error("API key not configured for {0}")]
    MissingApiKey(String),

    #[error("no provider available for model '{0}'")]
    UnknownModel(String),
}

/// One AI inference provider, bound to a concrete model.
#[async_trait]
pub trait InferenceService: Send + Sync {
    /// Model identifier, used for pricing lookups and diagnostics.
    fn model_id(&self) -> &str;

    /// Submit one prompt and return the completion.
    async fn generate(
        &self,
        prompt: &str,
        system_instruction: Option<&str>,
        options: &GenerateOptions,
    ) -> Result<Completion, InferenceError>;
}

/// Maps model identifiers to concrete inference clients.
///
/// The pipeline resolves every configured model at construction time, so a
/// missing credential fails the run before any stage starts.
pub trait ClientResolver: Send + Sync {
    fn resolve(&self, model: &str) -> Result<std::sync::Arc<dyn InferenceService>, InferenceError>;
}

/// Env-keyed resolver routing by model-id prefix.
#[derive(Debug, Default)]
pub struct ProviderRegistry;

impl ClientResolver for ProviderRegistry {
    fn resolve(&self, model: &str) -> Result<std::sync::Arc<dyn InferenceService>, InferenceError> {
        if model.starts_with("gemini") {
            Ok(std::sync::Arc::new(GeminiClient::from_env(model)?))
        } else if model.starts_with("claude") {
            Ok(std::sync::Arc::new(AnthropicClient::from_env(model)?))
        } else {
            Err(InferenceError::UnknownModel(model.to_string()))
        }
    }
}

/// Strip code-fence markers and raw control characters that commonly
/// corrupt structured output from generative models.
pub fn sanitize_response(raw: &str) -> String {
    raw.replace("```json", "")
        .replace("```", "")
        .chars()
        .filter(|c| !matches!(c, '\u{0000}'..='\u{001f}' | '\u{007f}'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Pull the first `{...}` span out of a response that wraps JSON in prose.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}
