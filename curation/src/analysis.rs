//! Deep-analysis stage — per-candidate strategic briefs.
//!
//! For each shortlisted candidate the analyst fetches the long-form body
//! (falling back to the stored summary), asks the analyst model for a dense
//! brief, and writes it into the candidate's annotations. A candidate whose
//! analysis fails keeps its summary; the stage never aborts the run.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::corpus::{annotation, Corpus};
use crate::cost::{CostMeter, PricingTable};
use crate::inference::{GenerateOptions, InferenceService};
use crate::prompts;
use crate::retry::RetryPolicy;
use crate::sources::FullTextProvider;

pub struct Analyst {
    client: Arc<dyn InferenceService>,
    fulltext: Option<Arc<dyn FullTextProvider>>,
    retry: RetryPolicy,
    meter: CostMeter,
}

impl Analyst {
    pub fn new(client: Arc<dyn InferenceService>) -> Self {
        Self {
            client,
            fulltext: None,
            retry: RetryPolicy::default(),
            meter: CostMeter::new(PricingTable::standard()),
        }
    }

    pub fn with_full_text(mut self, provider: Arc<dyn FullTextProvider>) -> Self {
        self.fulltext = Some(provider);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.meter = CostMeter::new(pricing);
        self
    }

    /// Annotate every candidate in place; returns the stage's total cost.
    pub async fn annotate_corpus(&mut self, corpus: &mut Corpus) -> f64 {
        info!(candidates = corpus.len(), "deep analysis starting");
        for candidate in corpus.iter_mut() {
            let body = match self.resolve_body(&candidate.link).await {
                Some(text) => {
                    candidate.full_text = Some(text.clone());
                    text
                }
                None => candidate.summary.clone(),
            };

            let prompt = prompts::analysis_prompt(&candidate.title, &body);
            // Prose output; no JSON response mode.
            let options = GenerateOptions {
                json_response: false,
                ..GenerateOptions::default()
            };
            let outcome = self
                .retry
                .execute("deep analysis", || {
                    self.client.generate(&prompt, None, &options)
                })
                .await;

            match outcome {
                Ok(completion) => {
                    self.meter
                        .record_completion(self.client.model_id(), &prompt, &completion);
                    let brief = completion.text.trim().to_string();
                    if brief.is_empty() {
                        warn!(link = %candidate.link, "empty analysis, keeping summary");
                    } else {
                        debug!(link = %candidate.link, chars = brief.len(), "brief attached");
                        candidate.annotate(annotation::DEEP_ANALYSIS, json!(brief));
                    }
                }
                Err(err) => {
                    warn!(link = %candidate.link, error = %err, "analysis failed, keeping summary");
                }
            }
        }
        info!(cost = self.meter.total(), "deep analysis complete");
        self.meter.total()
    }

    /// Long-form body for a link, or `None` to fall back to the summary.
    async fn resolve_body(&self, link: &str) -> Option<String> {
        let provider = self.fulltext.as_ref()?;
        match provider.full_text(link).await {
            Ok(text) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(err) => {
                warn!(link, error = %err, "full text unavailable, using summary");
                None
            }
        }
    }
}
