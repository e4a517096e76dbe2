//! Candidate corpus — the working set of documents under evaluation.
//!
//! A [`Candidate`] is one evaluable document. It is immutable except for its
//! annotations map, which the scoring, aggregation, and consensus stages
//! write into by key. Identity is the canonical link; all cross-stage joins
//! go through [`normalize_url`] so minor formatting differences do not
//! fragment one document into several entries.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Upper bound on the summary excerpt carried into prompts.
pub const SUMMARY_MAX_CHARS: usize = 1500;

/// Annotation keys written by the engine stages.
pub mod annotation {
    /// Weighted stage-one score, written by the trial aggregator.
    pub const STAGE1_SCORE: &str = "stage1_score";
    /// Per-judge raw score breakdown, written alongside the weighted score.
    pub const STAGE1_BREAKDOWN: &str = "stage1_breakdown";
    /// Dense per-candidate brief, written by the deep-analysis stage.
    pub const DEEP_ANALYSIS: &str = "deep_analysis";
    /// Cross-provider vote count, written by the consensus stage.
    pub const ENSEMBLE_SCORE: &str = "ensemble_score";
}

/// One evaluable document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Canonical URL, the primary key within a working set.
    pub link: String,
    /// Document title.
    pub title: String,
    /// Bounded-length text excerpt.
    #[serde(default)]
    pub summary: String,
    /// Author list, when the upstream feed supplies one.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Feed label the document was ingested under, if any.
    #[serde(default)]
    pub label: Option<String>,
    /// Full article text, populated later by the deep-analysis stage.
    #[serde(default)]
    pub full_text: Option<String>,
    /// Additive key-value annotations; overwritten by key, never deleted.
    #[serde(default)]
    pub annotations: HashMap<String, Value>,
}

impl Candidate {
    /// Create a candidate, truncating the summary to [`SUMMARY_MAX_CHARS`].
    pub fn new(link: impl Into<String>, title: impl Into<String>, summary: &str) -> Self {
        Self {
            link: link.into(),
            title: title.into(),
            summary: truncate_chars(summary, SUMMARY_MAX_CHARS),
            authors: Vec::new(),
            label: None,
            full_text: None,
            annotations: HashMap::new(),
        }
    }

    /// Attach an author list.
    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }

    /// Attach a feed label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Write an annotation, overwriting any previous value under the key.
    pub fn annotate(&mut self, key: &str, value: Value) {
        self.annotations.insert(key.to_string(), value);
    }

    /// Read an annotation.
    pub fn annotation(&self, key: &str) -> Option<&Value> {
        self.annotations.get(key)
    }

    /// The normalized join key for this candidate.
    pub fn identity(&self) -> String {
        normalize_url(&self.link)
    }

    /// The deep-analysis brief when present, otherwise the raw summary.
    pub fn analysis_or_summary(&self) -> &str {
        self.annotation(annotation::DEEP_ANALYSIS)
            .and_then(Value::as_str)
            .unwrap_or(&self.summary)
    }

    /// Render the candidate as one block of batch-prompt context.
    ///
    /// Only fields with data are emitted, keeping the context window slim.
    pub fn context_block(&self, anchor: usize) -> String {
        let mut lines = vec![
            format!("ID: {anchor}"),
            format!("Title: {}", self.title),
            format!("Link: {}", self.link),
        ];
        if !self.authors.is_empty() {
            lines.push(format!("Authors: {}", self.authors.join(", ")));
        }
        lines.push(format!("Summary: {}", self.summary));
        lines.join("\n")
    }
}

/// Ordered working set of candidates.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    candidates: Vec<Candidate>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }

    pub fn extend(&mut self, candidates: impl IntoIterator<Item = Candidate>) {
        self.candidates.extend(candidates);
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candidate> {
        self.candidates.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candidate> {
        self.candidates.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Candidate> {
        self.candidates.iter_mut()
    }

    pub fn as_slice(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn into_candidates(self) -> Vec<Candidate> {
        self.candidates
    }
}

impl From<Vec<Candidate>> for Corpus {
    fn from(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }
}

/// Normalize a URL into the canonical join key.
///
/// Lower-cases, strips the scheme, a leading `www.`, and trailing slashes.
/// Idempotent: normalizing an already-normalized key is a no-op.
pub fn normalize_url(url: &str) -> String {
    let lower = url.trim().to_lowercase();
    let rest = lower
        .split_once("://")
        .map(|(_, tail)| tail)
        .unwrap_or(&lower);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    rest.trim_end_matches('/').to_string()
}

static BRACKET_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]").expect("valid literal regex"));

/// Deep title normalization: drops bracketed tags (e.g. `[R]`, `[P]`) and
/// everything non-alphanumeric, then lower-cases.
pub fn normalize_title(title: &str) -> String {
    let stripped = BRACKET_TAGS.replace_all(title, "");
    stripped
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect::<String>()
        .to_lowercase()
}

fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
