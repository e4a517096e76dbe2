//! Ranking and consensus engine for candidate document curation.
//!
//! The engine turns a noisy pool of candidate documents into a small ranked
//! digest in two stages. Stage one convenes a panel of weighted judge
//! personas over anti-repetition batches and aggregates their scores into a
//! shortlist. Stage two polls an electorate of independent models over the
//! shortlist and tallies fuzzy-matched citations into the final picks. Cost
//! is metered per stage against an injected pricing table, and every
//! provider call sits behind bounded linear-backoff retries.

pub mod analysis;
pub mod batching;
pub mod config;
pub mod consensus;
pub mod corpus;
pub mod cost;
pub mod inference;
pub mod judge;
pub mod pipeline;
pub mod prompts;
pub mod report;
pub mod retry;
pub mod sources;
pub mod trial;

pub use batching::ContextBatcher;
pub use config::EngineConfig;
pub use consensus::{ConsensusVoter, TallyOutcome};
pub use corpus::{Candidate, Corpus};
pub use cost::{CostMeter, PricingTable};
pub use inference::{ClientResolver, InferenceService, ProviderRegistry};
pub use pipeline::{DigestOutcome, Pipeline};
pub use retry::RetryPolicy;
pub use trial::{JudgeSpec, Trial, TrialOutcome};
