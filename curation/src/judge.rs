//! Scoring agents — one evaluation persona applied across all batches.
//!
//! A judge submits each batch as a single structured-output inference call
//! and folds the parsed entries into a verdict keyed by normalized URL. Two
//! retry layers apply: the provider-level [`RetryPolicy`] absorbs transient
//! transport failures, and a logical parse-retry loop re-asks a batch whose
//! response did not parse. A batch that survives neither layer contributes
//! nothing — judge silence is a zero, never an abort.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::corpus::{normalize_url, Corpus};
use crate::cost::{CostMeter, PricingTable};
use crate::inference::{sanitize_response, GenerateOptions, InferenceError, InferenceService};
use crate::prompts;
use crate::retry::{NoopSleeper, RetryPolicy, Sleeper, TokioSleeper};

/// Logical parse retries per batch, on top of provider-level retries.
pub const PARSE_ATTEMPTS: u32 = 3;
/// Backoff unit between parse retries.
const PARSE_BACKOFF: Duration = Duration::from_secs(2);

/// One judge's opinion on one candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredEntry {
    pub title: String,
    /// Original link as the judge echoed it.
    pub link: String,
    /// Importance score in [0, 100].
    pub score: f64,
    pub rationale: String,
}

/// One judge's complete scored output, keyed by normalized URL.
///
/// When batcher redundancy shows a candidate to the same judge twice, the
/// later batch overwrites the earlier entry (last-write-wins).
pub type JudgeVerdict = HashMap<String, ScoredEntry>;

/// Wire shape of one element of the ranking response array.
#[derive(Debug, Deserialize)]
struct RankedItem {
    title: Option<String>,
    link: Option<String>,
    #[serde(default)]
    score: f64,
    rationale: Option<String>,
}

/// One evaluation persona bound to an inference client.
pub struct ScoringAgent {
    name: String,
    persona: String,
    client: Arc<dyn InferenceService>,
    retry: RetryPolicy,
    meter: CostMeter,
    sleeper: Arc<dyn Sleeper>,
}

impl ScoringAgent {
    pub fn new(
        name: &str,
        persona: &str,
        client: Arc<dyn InferenceService>,
        retry: RetryPolicy,
        pricing: PricingTable,
    ) -> Self {
        Self {
            name: name.to_string(),
            persona: persona.to_string(),
            client,
            retry,
            meter: CostMeter::new(pricing),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Skip parse-retry backoff sleeps; used in tests.
    pub fn without_backoff(mut self) -> Self {
        self.sleeper = Arc::new(NoopSleeper);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cost accumulated across every call this agent has made.
    pub fn cost(&self) -> f64 {
        self.meter.total()
    }

    /// Apply this persona to every batch and return the merged verdict.
    pub async fn evaluate(&mut self, corpus: &Corpus, batches: &[Vec<usize>]) -> JudgeVerdict {
        let mut verdict = JudgeVerdict::new();
        info!(judge = %self.name, batches = batches.len(), "judge deliberating");

        for (batch_no, batch) in batches.iter().enumerate() {
            let prompt = render_batch_prompt(corpus, batch);
            match self.score_batch(&prompt, batch_no).await {
                Some(entries) => {
                    debug!(judge = %self.name, batch_no, entries = entries.len(), "batch scored");
                    for entry in entries {
                        verdict.insert(normalize_url(&entry.link), entry);
                    }
                }
                None => {
                    warn!(
                        judge = %self.name,
                        batch_no,
                        "batch dropped after exhausting parse attempts"
                    );
                }
            }
        }

        info!(
            judge = %self.name,
            entries = verdict.len(),
            cost = self.meter.total(),
            "judge verdict complete"
        );
        verdict
    }

    /// One batch through both retry layers; `None` means the batch is lost.
    async fn score_batch(&mut self, prompt: &str, batch_no: usize) -> Option<Vec<ScoredEntry>> {
        let options = GenerateOptions::default();
        for attempt in 1..=PARSE_ATTEMPTS {
            let outcome = self
                .retry
                .execute("judge batch", || {
                    self.client.generate(prompt, Some(&self.persona), &options)
                })
                .await;

            match outcome {
                Ok(completion) => {
                    self.meter
                        .record_completion(self.client.model_id(), prompt, &completion);
                    match parse_ranked(&completion.text) {
                        Ok(entries) => return Some(entries),
                        Err(err) => {
                            warn!(
                                judge = %self.name,
                                batch_no,
                                attempt,
                                error = %err,
                                "unparsable batch response"
                            );
                        }
                    }
                }
                Err(err) => {
                    warn!(judge = %self.name, batch_no, attempt, error = %err, "batch call failed");
                }
            }
            if attempt < PARSE_ATTEMPTS {
                self.sleeper.sleep(PARSE_BACKOFF * attempt).await;
            }
        }
        None
    }
}

/// Render one batch of candidates into the ranking prompt.
fn render_batch_prompt(corpus: &Corpus, batch: &[usize]) -> String {
    let blocks: Vec<String> = batch
        .iter()
        .enumerate()
        .filter_map(|(anchor, &idx)| corpus.get(idx).map(|c| c.context_block(anchor + 1)))
        .collect();
    prompts::ranking_prompt(&blocks.join("\n\n"))
}

/// Sanitize and parse the strict 4-field ranking array.
fn parse_ranked(raw: &str) -> Result<Vec<ScoredEntry>, InferenceError> {
    let clean = sanitize_response(raw);
    if clean.is_empty() {
        return Err(InferenceError::EmptyResponse);
    }
    let items: Vec<RankedItem> =
        serde_json::from_str(&clean).map_err(|e| InferenceError::ParseError(e.to_string()))?;
    Ok(items
        .into_iter()
        .filter_map(|item| {
            let link = item.link.filter(|l| !l.is_empty())?;
            Some(ScoredEntry {
                title: item.title.unwrap_or_default(),
                link,
                score: item.score.clamp(0.0, 100.0),
                rationale: item.rationale.unwrap_or_else(|| "N/A".to_string()),
            })
        })
        .collect())
}
