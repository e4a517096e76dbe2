//! End-to-end curation pipeline.
//!
//! One run walks every configured job through the stage-one trial, merges
//! the per-job shortlists, optionally enriches them with deep analysis,
//! persists survivors, and finishes with the cross-provider consensus vote.
//! Every model the config names is resolved up front; a missing credential
//! fails construction, not the middle of a run.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::analysis::Analyst;
use crate::config::EngineConfig;
use crate::consensus::{ConsensusVoter, RankedPick};
use crate::corpus::{annotation, normalize_title, Candidate, Corpus};
use crate::cost::PricingTable;
use crate::inference::{ClientResolver, InferenceService};
use crate::report::DebugReporter;
use crate::retry::RetryPolicy;
use crate::sources::{CandidateSource, FullTextProvider, PersistenceSink, StoreError};
use crate::trial::{Trial, WinnerAudit};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("source error: {0}")]
    Source(#[from] StoreError),
}

/// Result of one full pipeline run.
#[derive(Debug, Default, Serialize)]
pub struct DigestOutcome {
    /// Consensus winners in vote order, annotated with their vote counts.
    pub picks: Vec<Candidate>,
    /// The merged stage-one shortlist the vote ran over.
    pub shortlist: Vec<Candidate>,
    /// Stage-one audit records across all jobs.
    pub audit: Vec<WinnerAudit>,
    /// Final vote standing, indices into `shortlist`.
    pub tally: Vec<RankedPick>,
    /// Total inference cost across every stage.
    pub total_cost: f64,
}

/// The assembled engine: config, storage seams, and resolved clients.
pub struct Pipeline {
    config: EngineConfig,
    source: Arc<dyn CandidateSource>,
    sink: Option<Arc<dyn PersistenceSink>>,
    fulltext: Option<Arc<dyn FullTextProvider>>,
    clients: HashMap<String, Arc<dyn InferenceService>>,
    retry: RetryPolicy,
    pricing: PricingTable,
    reporter: Option<DebugReporter>,
    skip_backoff: bool,
}

impl Pipeline {
    /// Validate the config and resolve a client for every model it names.
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn CandidateSource>,
        resolver: &dyn ClientResolver,
    ) -> Result<Self, PipelineError> {
        config
            .validate()
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;

        let mut clients = HashMap::new();
        for model in config.required_models() {
            let client = resolver
                .resolve(&model)
                .map_err(|e| PipelineError::Configuration(e.to_string()))?;
            clients.insert(model, client);
        }

        Ok(Self {
            retry: config.retry.policy(),
            config,
            source,
            sink: None,
            fulltext: None,
            clients,
            pricing: PricingTable::standard(),
            reporter: None,
            skip_backoff: false,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn PersistenceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_full_text(mut self, provider: Arc<dyn FullTextProvider>) -> Self {
        self.fulltext = Some(provider);
        self
    }

    pub fn with_reporter(mut self, reporter: DebugReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    /// Disable parse-retry backoff sleeps; used in tests.
    pub fn without_backoff(mut self) -> Self {
        self.skip_backoff = true;
        self
    }

    /// Run every stage and return the digest.
    pub async fn run(&self) -> Result<DigestOutcome, PipelineError> {
        let mut total_cost = 0.0;
        let mut shortlist: Vec<Candidate> = Vec::new();
        let mut audit: Vec<WinnerAudit> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut seen_titles: HashSet<String> = HashSet::new();

        for job in &self.config.jobs {
            let candidates = match self.source.fetch(&job.query).await {
                Ok(candidates) => candidates,
                Err(err) => {
                    warn!(job = %job.name, error = %err, "fetch failed, skipping job");
                    continue;
                }
            };
            if candidates.is_empty() {
                info!(job = %job.name, "no candidates, skipping job");
                continue;
            }

            let corpus: Corpus = candidates.into();
            if let Some(reporter) = &self.reporter {
                reporter.dump(
                    &format!("candidates_{}", job.name),
                    "fetched candidate pool",
                    &corpus.as_slice(),
                );
            }
            // Resolution happened in new(); every job model is present.
            let client = match self.clients.get(&job.model) {
                Some(client) => client.clone(),
                None => {
                    return Err(PipelineError::Configuration(format!(
                        "no client for model '{}'",
                        job.model
                    )))
                }
            };
            let mut trial = Trial::new(job.winners_count, job.panel.clone(), client)
                .with_batcher(self.config.batching.batcher())
                .with_retry(self.retry.clone())
                .with_pricing(self.pricing.clone());
            if self.skip_backoff {
                trial = trial.without_backoff();
            }
            if let Some(reporter) = &self.reporter {
                trial = trial.with_reporter(reporter.clone());
            }

            match trial.convene(&corpus).await {
                Ok(outcome) => {
                    info!(
                        job = %job.name,
                        winners = outcome.winners.len(),
                        cost = outcome.cost,
                        "job trial complete"
                    );
                    total_cost += outcome.cost;
                    audit.extend(outcome.audit);
                    for winner in outcome.winners {
                        // Jobs can overlap; the first job to select wins.
                        if !seen.insert(winner.identity()) {
                            continue;
                        }
                        // The same story often arrives under several links.
                        let title_key = normalize_title(&winner.title);
                        if !title_key.is_empty() && !seen_titles.insert(title_key) {
                            continue;
                        }
                        shortlist.push(winner);
                    }
                }
                Err(err) => {
                    warn!(job = %job.name, error = %err, "trial failed, skipping job");
                }
            }
        }

        if let Some(reporter) = &self.reporter {
            reporter.dump("shortlist", "merged stage-one winners", &shortlist);
        }

        if shortlist.is_empty() {
            info!("no shortlist survivors, ending run");
            return Ok(DigestOutcome {
                total_cost,
                ..DigestOutcome::default()
            });
        }

        if let Some(model) = &self.config.analyst_model {
            if let Some(client) = self.clients.get(model) {
                let mut analyst = Analyst::new(client.clone())
                    .with_retry(self.retry.clone())
                    .with_pricing(self.pricing.clone());
                if let Some(provider) = &self.fulltext {
                    analyst = analyst.with_full_text(provider.clone());
                }
                let mut corpus: Corpus = std::mem::take(&mut shortlist).into();
                total_cost += analyst.annotate_corpus(&mut corpus).await;
                shortlist = corpus.into_candidates();
            }
        }

        if let Some(sink) = &self.sink {
            for candidate in &shortlist {
                if let Err(err) = sink.save(candidate).await {
                    warn!(link = %candidate.link, error = %err, "save failed, continuing");
                }
            }
        }

        let voters: Vec<Arc<dyn InferenceService>> = self
            .config
            .consensus
            .voters
            .iter()
            .filter_map(|model| self.clients.get(model).cloned())
            .collect();
        let mut consensus = ConsensusVoter::new(voters)
            .with_picks(self.config.consensus.picks)
            .with_retry(self.retry.clone())
            .with_pricing(self.pricing.clone());
        let tally = consensus
            .tally(&shortlist)
            .await
            .map_err(|e| PipelineError::Configuration(e.to_string()))?;
        total_cost += tally.cost;
        if let Some(reporter) = &self.reporter {
            reporter.dump("tally", "consensus vote standing", &tally.ranked);
        }

        let mut picks = Vec::with_capacity(tally.ranked.len());
        for pick in &tally.ranked {
            if let Some(candidate) = shortlist.get(pick.index) {
                let mut winner = candidate.clone();
                winner.annotate(annotation::ENSEMBLE_SCORE, json!(pick.votes));
                picks.push(winner);
            }
        }

        if let Some(reporter) = &self.reporter {
            reporter.dump("digest", "final consensus picks", &picks);
        }

        info!(
            picks = picks.len(),
            shortlist = shortlist.len(),
            total_cost,
            "pipeline run complete"
        );
        Ok(DigestOutcome {
            picks,
            shortlist,
            audit,
            tally: tally.ranked,
            total_cost,
        })
    }
}
