//! Candidate ingestion and persistence seams.
//!
//! The engine is storage-agnostic: candidates arrive through a
//! [`CandidateSource`], survivors leave through an optional
//! [`PersistenceSink`], and long-form bodies come from an optional
//! [`FullTextProvider`]. The file-backed implementations here cover local
//! runs and tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::corpus::Candidate;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed candidate data: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("no content available for {0}")]
    NotFound(String),
}

/// Supplies candidate documents for a query label.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn fetch(&self, query: &str) -> Result<Vec<Candidate>, StoreError>;
}

/// Receives selected candidates for durable storage.
///
/// Saves are opportunistic; callers log and continue on failure.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn save(&self, candidate: &Candidate) -> Result<(), StoreError>;
}

/// Fetches the long-form body behind a candidate's link.
#[async_trait]
pub trait FullTextProvider: Send + Sync {
    async fn full_text(&self, link: &str) -> Result<String, StoreError>;
}

/// File-backed source reading a JSON array of candidates.
///
/// When candidates carry a `label`, a fetch returns only those whose label
/// matches the query; unlabeled candidates always match.
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl CandidateSource for JsonFileSource {
    async fn fetch(&self, query: &str) -> Result<Vec<Candidate>, StoreError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let all: Vec<Candidate> = serde_json::from_str(&raw)?;
        let matched: Vec<Candidate> = all
            .into_iter()
            .filter(|c| c.label.as_deref().map_or(true, |label| label == query))
            .collect();
        debug!(path = %self.path.display(), query, matched = matched.len(), "candidates loaded");
        Ok(matched)
    }
}

/// Stores candidates in a JSON-lines file, upserting by link.
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl PersistenceSink for JsonLinesSink {
    async fn save(&self, candidate: &Candidate) -> Result<(), StoreError> {
        let existing = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err.into()),
        };
        // Re-saving a link replaces the stored record; lines that no longer
        // parse are kept as-is rather than silently erased.
        let mut lines: Vec<String> = existing
            .lines()
            .filter(|line| match serde_json::from_str::<Candidate>(line) {
                Ok(stored) => stored.link != candidate.link,
                Err(err) => {
                    warn!(path = %self.path.display(), error = %err, "unparsable stored record kept");
                    true
                }
            })
            .map(str::to_string)
            .collect();
        lines.push(serde_json::to_string(candidate)?);
        tokio::fs::write(&self.path, lines.join("\n") + "\n").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_json_source_filters_by_label() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("candidates.json");
        let candidates = vec![
            Candidate::new("https://a.com/1", "One", "s").with_label("ai"),
            Candidate::new("https://a.com/2", "Two", "s").with_label("biotech"),
            Candidate::new("https://a.com/3", "Three", "s"),
        ];
        tokio::fs::write(&path, serde_json::to_string(&candidates).unwrap())
            .await
            .unwrap();

        let source = JsonFileSource::new(&path);
        let fetched = source.fetch("ai").await.unwrap();
        let links: Vec<&str> = fetched.iter().map(|c| c.link.as_str()).collect();
        // Labeled matches plus the unlabeled candidate.
        assert_eq!(links, vec!["https://a.com/1", "https://a.com/3"]);
    }

    #[tokio::test]
    async fn test_json_source_missing_file_is_io_error() {
        let source = JsonFileSource::new("/nonexistent/candidates.json");
        assert!(matches!(
            source.fetch("ai").await,
            Err(StoreError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_json_lines_sink_upserts_by_link() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.jsonl");
        let sink = JsonLinesSink::new(&path);
        sink.save(&Candidate::new("https://a.com/1", "One", "s"))
            .await
            .unwrap();
        sink.save(&Candidate::new("https://a.com/2", "Two", "s"))
            .await
            .unwrap();
        sink.save(&Candidate::new("https://a.com/1", "One updated", "s"))
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("One updated"));
        assert!(!content.contains("\"title\":\"One\""));
    }

    #[tokio::test]
    async fn test_json_lines_sink_keeps_unparsable_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saved.jsonl");
        tokio::fs::write(&path, "not valid json\n").await.unwrap();

        let sink = JsonLinesSink::new(&path);
        sink.save(&Candidate::new("https://a.com/1", "One", "s"))
            .await
            .unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("not valid json"));
        assert!(content.contains("https://a.com/1"));
    }
}
