//! Stage-two consensus — a cross-provider popularity vote.
//!
//! Every voter receives the identical ballot prompt and returns up to
//! `picks` citations. Citations are reconciled to shortlist entries by
//! [`fuzzy::match_citation`], deduplicated per voter, and tallied. A voter
//! that fails or returns garbage is dropped from the electorate; the vote
//! proceeds with whoever answered.

pub mod fuzzy;

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::corpus::Candidate;
use crate::cost::{CostMeter, PricingTable};
use crate::inference::{
    extract_json_object, sanitize_response, GenerateOptions, InferenceError, InferenceService,
};
use crate::prompts;
use crate::retry::RetryPolicy;

/// Default number of winners each voter is asked to pick.
pub const DEFAULT_PICKS: usize = 6;

/// Wire shape of a voter's ballot.
#[derive(Debug, Deserialize)]
struct Ballot {
    #[serde(default)]
    winners: Vec<CitationItem>,
}

/// One cited winner as the voter wrote it.
#[derive(Debug, Deserialize)]
struct CitationItem {
    title: Option<String>,
    link: Option<String>,
}

/// One shortlist entry's final standing.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RankedPick {
    /// Index into the shortlist the tally ran over.
    pub index: usize,
    /// Number of voters who cited this entry.
    pub votes: usize,
}

/// Result of a consensus tally.
#[derive(Debug, Default)]
pub struct TallyOutcome {
    /// Picks with at least one vote, ordered by votes descending.
    /// Ties keep shortlist order.
    pub ranked: Vec<RankedPick>,
    /// Total inference cost across all voters.
    pub cost: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum TallyError {
    #[error("consensus requires at least one voter")]
    NoVoters,
}

/// A fixed electorate of inference clients voting over one shortlist.
pub struct ConsensusVoter {
    voters: Vec<Arc<dyn InferenceService>>,
    picks: usize,
    retry: RetryPolicy,
    meter: CostMeter,
}

impl ConsensusVoter {
    pub fn new(voters: Vec<Arc<dyn InferenceService>>) -> Self {
        Self {
            voters,
            picks: DEFAULT_PICKS,
            retry: RetryPolicy::default(),
            meter: CostMeter::new(PricingTable::standard()),
        }
    }

    pub fn with_picks(mut self, picks: usize) -> Self {
        self.picks = picks;
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

    /// Poll every voter over the shortlist and tally the matched citations.
    ///
    /// An empty shortlist short-circuits to an empty outcome without any
    /// provider calls.
    pub async fn tally(&mut self, shortlist: &[Candidate]) -> Result<TallyOutcome, TallyError> {
        if self.voters.is_empty() {
            return Err(TallyError::NoVoters);
        }
        if shortlist.is_empty() {
            return Ok(TallyOutcome::default());
        }

        // Every voter sees the exact same ballot.
        let prompt = prompts::voting_prompt(shortlist, self.picks);
        let options = GenerateOptions::deterministic();
        let mut votes = vec![0usize; shortlist.len()];
        let mut turnout = 0usize;

        for voter in &self.voters {
            let model = voter.model_id().to_string();
            let outcome = self
                .retry
                .execute("consensus ballot", || {
                    voter.generate(&prompt, None, &options)
                })
                .await
                .map_err(|e| e.into_source());

            let completion = match outcome {
                Ok(completion) => completion,
                Err(err) => {
                    warn!(voter = %model, error = %err, "voter dropped from electorate");
                    continue;
                }
            };
            self.meter.record_completion(&model, &prompt, &completion);

            match parse_ballot(&completion.text) {
                Ok(ballot) => {
                    let picked = resolve_ballot(&model, &ballot, shortlist);
                    debug!(voter = %model, picks = picked.len(), "ballot counted");
                    for index in picked {
                        votes[index] += 1;
                    }
                    turnout += 1;
                }
                Err(err) => {
                    warn!(voter = %model, error = %err, "unparsable ballot, voter dropped");
                }
            }
        }

        let mut ranked: Vec<RankedPick> = votes
            .into_iter()
            .enumerate()
            .filter(|&(_, votes)| votes > 0)
            .map(|(index, votes)| RankedPick { index, votes })
            .collect();
        ranked.sort_by(|a, b| b.votes.cmp(&a.votes));

        info!(
            turnout,
            electorate = self.voters.len(),
            ranked = ranked.len(),
            cost = self.meter.total(),
            "consensus tally complete"
        );
        Ok(TallyOutcome {
            ranked,
            cost: self.meter.total(),
        })
    }

    /// Cost accumulated across every ballot collected so far.
    pub fn cost(&self) -> f64 {
        self.meter.total()
    }
}

/// Sanitize a ballot response and parse the `winners` object.
fn parse_ballot(raw: &str) -> Result<Ballot, InferenceError> {
    let clean = sanitize_response(raw);
    let payload = extract_json_object(&clean).ok_or(InferenceError::EmptyResponse)?;
    serde_json::from_str(payload).map_err(|e| InferenceError::ParseError(e.to_string()))
}

/// Match each citation to a shortlist index, deduplicated per voter.
fn resolve_ballot(voter: &str, ballot: &Ballot, shortlist: &[Candidate]) -> Vec<usize> {
    let mut seen = HashSet::new();
    let mut picked = Vec::new();
    for citation in &ballot.winners {
        let title = citation.title.as_deref().unwrap_or("");
        let link = citation.link.as_deref().unwrap_or("");
        match fuzzy::match_citation(title, link, shortlist) {
            Some(index) => {
                if seen.insert(index) {
                    picked.push(index);
                }
            }
            None => {
                warn!(voter, title, link, "citation matched nothing on the shortlist");
            }
        }
    }
    picked
}
