//! Stage-one trial — weighted multi-judge aggregation.
//!
//! A trial runs a panel of scoring agents over one shared batch plan, joins
//! their verdicts on normalized URL identity, and selects the top-K
//! candidates by weighted score. Absence from a verdict contributes zero to
//! the sum; it never excludes a judge from the weighting.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::batching::ContextBatcher;
use crate::corpus::{annotation, normalize_url, Candidate, Corpus};
use crate::cost::PricingTable;
use crate::inference::InferenceService;
use crate::judge::{JudgeVerdict, ScoringAgent};
use crate::report::DebugReporter;
use crate::retry::RetryPolicy;

/// One configured judge: a persona with a name and an aggregation weight.
///
/// Weights are used as-is; they need not sum to one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeSpec {
    pub name: String,
    pub persona: String,
    pub weight: f64,
}

/// Audit record for one selected winner.
#[derive(Debug, Clone, Serialize)]
pub struct WinnerAudit {
    pub title: String,
    pub link: String,
    pub weighted_score: f64,
    /// Raw per-judge scores that produced the weighted score.
    pub breakdown: HashMap<String, f64>,
}

/// Result of convening a trial.
#[derive(Debug, Default)]
pub struct TrialOutcome {
    /// Winning candidates in rank order, annotated with their scores.
    pub winners: Vec<Candidate>,
    /// Parallel audit records, one per winner.
    pub audit: Vec<WinnerAudit>,
    /// Total inference cost across all judges.
    pub cost: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum TrialError {
    #[error("trial requires at least one judge")]
    NoJudges,
}

/// A panel of judges sharing one inference client and one batch plan.
pub struct Trial {
    winners_count: usize,
    judges: Vec<JudgeSpec>,
    client: Arc<dyn InferenceService>,
    batcher: ContextBatcher,
    retry: RetryPolicy,
    pricing: PricingTable,
    reporter: Option<DebugReporter>,
    skip_backoff: bool,
}

impl Trial {
    pub fn new(
        winners_count: usize,
        judges: Vec<JudgeSpec>,
        client: Arc<dyn InferenceService>,
    ) -> Self {
        Self {
            winners_count,
            judges,
            client,
            batcher: ContextBatcher::default(),
            retry: RetryPolicy::default(),
            pricing: PricingTable::standard(),
            reporter: None,
            skip_backoff: false,
        }
    }

    pub fn with_batcher(mut self, batcher: ContextBatcher) -> Self {
        self.batcher = batcher;
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

    /// Dump the batch plan, each verdict, and the aggregation audit.
    pub fn with_reporter(mut self, reporter: DebugReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Disable parse-retry backoff sleeps; used in tests.
    pub fn without_backoff(mut self) -> Self {
        self.skip_backoff = true;
        self
    }

    /// Run every judge, aggregate weighted scores, and select winners.
    ///
    /// If fewer distinct identities were scored than `winners_count`, all of
    /// them are returned; that is a small result, not an error.
    pub async fn convene(&self, corpus: &Corpus) -> Result<TrialOutcome, TrialError> {
        if self.judges.is_empty() {
            return Err(TrialError::NoJudges);
        }
        if corpus.is_empty() {
            return Ok(TrialOutcome::default());
        }

        let batches = self.batcher.plan(corpus.len());
        info!(
            candidates = corpus.len(),
            batches = batches.len(),
            judges = self.judges.len(),
            "convening trial"
        );
        if let Some(reporter) = &self.reporter {
            reporter.dump("batch_plan", "planned candidate index batches", &batches);
        }

        let mut verdicts: Vec<(JudgeSpec, JudgeVerdict)> = Vec::with_capacity(self.judges.len());
        let mut cost = 0.0;
        for spec in &self.judges {
            let mut agent = ScoringAgent::new(
                &spec.name,
                &spec.persona,
                self.client.clone(),
                self.retry.clone(),
                self.pricing.clone(),
            );
            if self.skip_backoff {
                agent = agent.without_backoff();
            }
            let verdict = agent.evaluate(corpus, &batches).await;
            cost += agent.cost();
            if let Some(reporter) = &self.reporter {
                reporter.dump(
                    &format!("verdict_{}", spec.name),
                    "one judge's merged scored output",
                    &verdict,
                );
            }
            verdicts.push((spec.clone(), verdict));
        }

        let scored = aggregate(corpus, &verdicts);
        let (winners, audit) = select_winners(corpus, scored, self.winners_count);
        if let Some(reporter) = &self.reporter {
            reporter.dump("aggregation", "weighted scores and per-judge breakdown", &audit);
        }
        info!(winners = winners.len(), cost, "trial complete");
        Ok(TrialOutcome {
            winners,
            audit,
            cost,
        })
    }
}

/// Weighted aggregation over the union of identities any verdict references.
///
/// Returned in a deterministic encounter order: corpus order first, then
/// verdict-only identities sorted lexicographically. Ties in the later sort
/// keep this order (the sort is stable).
fn aggregate(
    corpus: &Corpus,
    verdicts: &[(JudgeSpec, JudgeVerdict)],
) -> Vec<(String, f64, HashMap<String, f64>)> {
    let mut order: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for candidate in corpus.iter() {
        let key = candidate.identity();
        if seen.insert(key.clone()) {
            order.push(key);
        }
    }
    let mut extras: Vec<String> = verdicts
        .iter()
        .flat_map(|(_, verdict)| verdict.keys())
        .filter(|key| !seen.contains(*key))
        .cloned()
        .collect();
    extras.sort();
    extras.dedup();
    order.extend(extras);

    let mut scored = Vec::new();
    for key in order {
        let mut referenced = false;
        let mut weighted = 0.0;
        let mut breakdown = HashMap::new();
        for (spec, verdict) in verdicts {
            let raw = match verdict.get(&key) {
                Some(entry) => {
                    referenced = true;
                    entry.score
                }
                // Absent from this verdict: counts as zero, stays in the sum.
                None => 0.0,
            };
            weighted += raw * spec.weight;
            breakdown.insert(spec.name.clone(), raw);
        }
        if referenced {
            scored.push((key, weighted, breakdown));
        }
    }

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored
}

/// Take the top-K identities and re-associate them with corpus candidates.
/// First match wins when duplicate links exist in the source set.
fn select_winners(
    corpus: &Corpus,
    scored: Vec<(String, f64, HashMap<String, f64>)>,
    winners_count: usize,
) -> (Vec<Candidate>, Vec<WinnerAudit>) {
    let mut winners = Vec::new();
    let mut audit = Vec::new();
    for (key, weighted, breakdown) in scored.into_iter().take(winners_count) {
        match corpus.iter().find(|c| normalize_url(&c.link) == key) {
            Some(candidate) => {
                let mut winner = candidate.clone();
                winner.annotate(annotation::STAGE1_SCORE, json!(weighted));
                winner.annotate(
                    annotation::STAGE1_BREAKDOWN,
                    serde_json::to_value(&breakdown).unwrap_or(Value::Null),
                );
                debug!(link = %winner.link, weighted, "winner selected");
                audit.push(WinnerAudit {
                    title: winner.title.clone(),
                    link: winner.link.clone(),
                    weighted_score: weighted,
                    breakdown,
                });
                winners.push(winner);
            }
            None => {
                // A judge cited a link outside the working set.
                warn!(identity = %key, "scored identity has no corpus candidate, skipping");
            }
        }
    }
    (winners, audit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::ScoredEntry;

    fn spec(name: &str, weight: f64) -> JudgeSpec {
        JudgeSpec {
            name: name.to_string(),
            persona: "p".to_string(),
            weight,
        }
    }

    fn entry(link: &str, score: f64) -> (String, ScoredEntry) {
        (
            normalize_url(link),
            ScoredEntry {
                title: "t".to_string(),
                link: link.to_string(),
                score,
                rationale: "r".to_string(),
            },
        )
    }

    fn corpus(links: &[&str]) -> Corpus {
        links
            .iter()
            .map(|l| Candidate::new(*l, format!("title {l}"), "s"))
            .collect::<Vec<_>>()
            .into()
    }

    #[test]
    fn test_equal_weights_average_scores() {
        let corpus = corpus(&["https://a.com/x"]);
        let verdicts: Vec<(JudgeSpec, JudgeVerdict)> = vec![
            (spec("j1", 0.5), [entry("https://a.com/x", 80.0)].into()),
            (spec("j2", 0.5), [entry("https://a.com/x", 40.0)].into()),
        ];
        let scored = aggregate(&corpus, &verdicts);
        assert_eq!(scored.len(), 1);
        assert!((scored[0].1 - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_absence_counts_as_zero() {
        let corpus = corpus(&["https://a.com/x"]);
        let verdicts: Vec<(JudgeSpec, JudgeVerdict)> = vec![
            (spec("j1", 0.6), [entry("https://a.com/x", 50.0)].into()),
            (spec("j2", 0.4), JudgeVerdict::new()),
        ];
        let scored = aggregate(&corpus, &verdicts);
        assert_eq!(scored.len(), 1);
        assert!((scored[0].1 - 30.0).abs() < 1e-9);
        assert!((scored[0].2["j2"] - 0.0).abs() < 1e-9);
    }

    #[test]
    fn test_url_variants_join_on_one_identity() {
        let corpus = corpus(&["https://www.a.com/x/"]);
        let verdicts: Vec<(JudgeSpec, JudgeVerdict)> = vec![
            (spec("j1", 1.0), [entry("https://www.a.com/x/", 10.0)].into()),
            (spec("j2", 1.0), [entry("http://a.com/x", 20.0)].into()),
        ];
        let scored = aggregate(&corpus, &verdicts);
        assert_eq!(scored.len(), 1, "variants must not fragment the identity");
        assert!((scored[0].1 - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_ties_keep_corpus_order() {
        let corpus = corpus(&["https://a.com/1", "https://a.com/2"]);
        let verdicts: Vec<(JudgeSpec, JudgeVerdict)> = vec![(
            spec("j1", 1.0),
            [
                entry("https://a.com/1", 50.0),
                entry("https://a.com/2", 50.0),
            ]
            .into(),
        )];
        let scored = aggregate(&corpus, &verdicts);
        assert_eq!(scored[0].0, "a.com/1");
        assert_eq!(scored[1].0, "a.com/2");
    }

    #[test]
    fn test_select_fewer_than_k_when_short() {
        let corpus = corpus(&["https://a.com/1"]);
        let verdicts: Vec<(JudgeSpec, JudgeVerdict)> = vec![(spec("j1", 1.0), [entry("https://a.com/1", 10.0)].into())];
        let scored = aggregate(&corpus, &verdicts);
        let (winners, audit) = select_winners(&corpus, scored, 5);
        assert_eq!(winners.len(), 1);
        assert_eq!(audit.len(), 1);
    }

    #[test]
    fn test_winners_carry_score_annotations() {
        let corpus = corpus(&["https://a.com/1"]);
        let verdicts: Vec<(JudgeSpec, JudgeVerdict)> = vec![(spec("j1", 2.0), [entry("https://a.com/1", 10.0)].into())];
        let scored = aggregate(&corpus, &verdicts);
        let (winners, _) = select_winners(&corpus, scored, 1);
        assert_eq!(
            winners[0].annotation(annotation::STAGE1_SCORE),
            Some(&json!(20.0))
        );
    }

    #[test]
    fn test_hallucinated_identity_skipped_on_reassociation() {
        let corpus = corpus(&["https://a.com/1"]);
        let verdicts: Vec<(JudgeSpec, JudgeVerdict)> = vec![(
            spec("j1", 1.0),
            [
                entry("https://nowhere.com/ghost", 99.0),
                entry("https://a.com/1", 10.0),
            ]
            .into(),
        )];
        let scored = aggregate(&corpus, &verdicts);
        let (winners, _) = select_winners(&corpus, scored, 2);
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].link, "https://a.com/1");
    }

    #[tokio::test]
    async fn test_convene_rejects_empty_panel() {
        use crate::inference::testing::ScriptedService;
        let trial = Trial::new(
            3,
            Vec::new(),
            Arc::new(ScriptedService::always("m", "[]")),
        );
        assert!(matches!(
            trial.convene(&corpus(&["https://a.com/1"])).await,
            Err(TrialError::NoJudges)
        ));
    }

    #[tokio::test]
    async fn test_convene_dumps_stage_snapshots() {
        use crate::inference::testing::ScriptedService;
        let dir = tempfile::tempdir().unwrap();
        let trial = Trial::new(
            1,
            vec![spec("j1", 1.0), spec("j2", 1.0)],
            Arc::new(ScriptedService::always(
                "m",
                r#"[{"title":"t","link":"https://a.com/1","score":50,"rationale":"r"}]"#,
            )),
        )
        .with_reporter(DebugReporter::new(dir.path()))
        .without_backoff();
        trial.convene(&corpus(&["https://a.com/1"])).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        for suffix in [
            "batch_plan.json",
            "verdict_j1.json",
            "verdict_j2.json",
            "aggregation.json",
        ] {
            assert!(
                names.iter().any(|n| n.ends_with(suffix)),
                "missing {suffix} in {names:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_convene_empty_corpus_is_empty_outcome() {
        use crate::inference::testing::ScriptedService;
        let trial = Trial::new(
            3,
            vec![spec("j1", 1.0)],
            Arc::new(ScriptedService::always("m", "[]")),
        );
        let outcome = trial.convene(&Corpus::new()).await.unwrap();
        assert!(outcome.winners.is_empty());
        assert_eq!(outcome.cost, 0.0);
    }
}
