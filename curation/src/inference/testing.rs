//! Scripted inference doubles for exercising the engine without a provider.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Completion, GenerateOptions, InferenceError, InferenceService, Usage};

type Responder = Box<dyn Fn(&str) -> Result<Completion, InferenceError> + Send + Sync>;

enum Script {
    /// Fixed responses consumed in order; exhaustion fails the call.
    Queue(Mutex<VecDeque<Result<Completion, InferenceError>>>),
    /// Computes a response from the prompt.
    Dynamic(Responder),
}

/// An [`InferenceService`] that replays a script and records every prompt.
pub struct ScriptedService {
    model: String,
    script: Script,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedService {
    /// Always answer with the same text, no usage metadata.
    pub fn always(model: &str, text: &str) -> Self {
        let text = text.to_string();
        Self::respond_with(model, move |_| {
            Ok(Completion {
                text: text.clone(),
                usage: None,
            })
        })
    }

    /// Replay a fixed sequence of outcomes, then fail.
    pub fn sequence(model: &str, outcomes: Vec<Result<Completion, InferenceError>>) -> Self {
        Self {
            model: model.to_string(),
            script: Script::Queue(Mutex::new(outcomes.into())),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Fail every call with a transient-looking error.
    pub fn always_failing(model: &str) -> Self {
        Self::respond_with(model, |_| {
            Err(InferenceError::RequestFailed("simulated outage".to_string()))
        })
    }

    /// Compute each response from the incoming prompt.
    pub fn respond_with<F>(model: &str, responder: F) -> Self
    where
        F: Fn(&str) -> Result<Completion, InferenceError> + Send + Sync + 'static,
    {
        Self {
            model: model.to_string(),
            script: Script::Dynamic(Box::new(responder)),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Convenience: a successful completion with no usage metadata.
    pub fn ok(text: impl Into<String>) -> Result<Completion, InferenceError> {
        Ok(Completion {
            text: text.into(),
            usage: None,
        })
    }

    /// Convenience: a successful completion with usage metadata.
    pub fn ok_with_usage(
        text: impl Into<String>,
        input_units: u64,
        output_units: u64,
    ) -> Result<Completion, InferenceError> {
        Ok(Completion {
            text: text.into(),
            usage: Some(Usage {
                input_units,
                output_units,
            }),
        })
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log poisoned").clone()
    }

    /// Number of calls made.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().expect("prompt log poisoned").len()
    }
}

#[async_trait]
impl InferenceService for ScriptedService {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        _system_instruction: Option<&str>,
        _options: &GenerateOptions,
    ) -> Result<Completion, InferenceError> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push(prompt.to_string());
        match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .expect("script poisoned")
                .pop_front()
                .unwrap_or_else(|| {
                    Err(InferenceError::RequestFailed(
                        "script exhausted".to_string(),
                    ))
                }),
            Script::Dynamic(responder) => responder(prompt),
        }
    }
}
