//! Engine configuration, loaded from TOML.
//!
//! One config describes the full run: the batching shape, one or more
//! curation jobs (each a query, a judge panel, and a model), the consensus
//! electorate, and retry tuning. Validation runs up front so a bad panel or
//! an empty electorate fails before any provider call.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batching::{ContextBatcher, DEFAULT_BATCH_SIZE, DEFAULT_REDUNDANCY};
use crate::prompts;
use crate::retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::trial::JudgeSpec;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Batch planning shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub batch_size: usize,
    pub redundancy: usize,
    pub window: usize,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            redundancy: DEFAULT_REDUNDANCY,
            window: DEFAULT_BATCH_SIZE,
        }
    }
}

impl BatchingConfig {
    pub fn batcher(&self) -> ContextBatcher {
        ContextBatcher::new(self.batch_size)
            .with_redundancy(self.redundancy)
            .with_window(self.window)
    }
}

/// One curation job: a query, a judge panel, and the model that runs it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    /// Query label passed to the candidate source.
    pub query: String,
    /// Model identifier the panel's judges run on.
    pub model: String,
    /// Shortlist size this job contributes.
    pub winners_count: usize,
    pub panel: Vec<JudgeSpec>,
}

/// Cross-provider consensus electorate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Model identifiers, one voter each.
    pub voters: Vec<String>,
    /// Winners each voter is asked to pick.
    pub picks: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            voters: Vec::new(),
            picks: crate::consensus::DEFAULT_PICKS,
        }
    }
}

/// Retry tuning shared by every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_secs: 2,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.base_delay_secs))
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Model running the deep-analysis stage; omit to skip the stage.
    #[serde(default)]
    pub analyst_model: Option<String>,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    pub jobs: Vec<JobConfig>,
}

impl EngineConfig {
    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs.is_empty() {
            return Err(ConfigError::Invalid("at least one job is required".into()));
        }
        for job in &self.jobs {
            if job.panel.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "job '{}' has an empty judge panel",
                    job.name
                )));
            }
            if job.winners_count == 0 {
                return Err(ConfigError::Invalid(format!(
                    "job '{}' has winners_count of zero",
                    job.name
                )));
            }
            for judge in &job.panel {
                if !judge.weight.is_finite() || judge.weight < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "judge '{}' in job '{}' has a bad weight",
                        judge.name, job.name
                    )));
                }
            }
        }
        if self.consensus.voters.is_empty() {
            return Err(ConfigError::Invalid(
                "consensus requires at least one voter".into(),
            ));
        }
        if self.consensus.picks == 0 {
            return Err(ConfigError::Invalid("consensus picks must be positive".into()));
        }
        if self.batching.batch_size == 0 {
            return Err(ConfigError::Invalid("batch_size must be positive".into()));
        }
        Ok(())
    }

    /// Every model identifier the run needs a client for.
    pub fn required_models(&self) -> BTreeSet<String> {
        let mut models: BTreeSet<String> =
            self.jobs.iter().map(|job| job.model.clone()).collect();
        models.extend(self.consensus.voters.iter().cloned());
        if let Some(model) = &self.analyst_model {
            models.insert(model.clone());
        }
        models
    }
}

impl Default for EngineConfig {
    /// A working single-job default mirroring the stock personas.
    fn default() -> Self {
        let panel = vec![
            JudgeSpec {
                name: "Industry Strategist".into(),
                persona: prompts::INDUSTRY_STRATEGIST.into(),
                weight: 0.25,
            },
            JudgeSpec {
                name: "Research Frontiersman".into(),
                persona: prompts::RESEARCH_FRONTIERSMAN.into(),
                weight: 0.25,
            },
            JudgeSpec {
                name: "Pragmatic Engineer".into(),
                persona: prompts::PRAGMATIC_ENGINEER.into(),
                weight: 0.25,
            },
            JudgeSpec {
                name: "Civilizational Engineer".into(),
                persona: prompts::CIVILIZATIONAL_ENGINEER.into(),
                weight: 0.25,
            },
        ];
        Self {
            batching: BatchingConfig::default(),
            jobs: vec![JobConfig {
                name: "ai-news".into(),
                query: "ai".into(),
                model: "gemini-2.5-flash".into(),
                winners_count: 12,
                panel,
            }],
            consensus: ConsensusConfig {
                voters: vec!["gemini-2.5-pro".into(), "claude-opus-4-6".into()],
                picks: crate::consensus::DEFAULT_PICKS,
            },
            analyst_model: Some("gemini-2.5-flash".into()),
            retry: RetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_toml_round_trip() {
        let config = EngineConfig::default();
        let rendered = toml::to_string(&config).unwrap();
        let parsed: EngineConfig = toml::from_str(&rendered).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.jobs.len(), config.jobs.len());
    }

    #[test]
    fn test_minimal_toml_fills_defaults() {
        let raw = r#"
            [[jobs]]
            name = "news"
            query = "ai"
            model = "gemini-2.5-flash"
            winners_count = 5

            [[jobs.panel]]
            name = "J"
            persona = "p"
            weight = 1.0

            [consensus]
            voters = ["gemini-2.5-pro"]
        "#;
        let config: EngineConfig = toml::from_str(raw).unwrap();
        config.validate().unwrap();
        assert_eq!(config.batching.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.retry.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert!(config.analyst_model.is_none());
    }

    #[test]
    fn test_empty_panel_rejected() {
        let mut config = EngineConfig::default();
        config.jobs[0].panel.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_weight_rejected() {
        let mut config = EngineConfig::default();
        config.jobs[0].panel[0].weight = f64::NAN;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_no_voters_rejected() {
        let mut config = EngineConfig::default();
        config.consensus.voters.clear();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_required_models_deduplicates() {
        let config = EngineConfig::default();
        let models = config.required_models();
        assert!(models.contains("gemini-2.5-flash"));
        assert!(models.contains("gemini-2.5-pro"));
        assert!(models.contains("claude-opus-4-6"));
        assert_eq!(models.len(), 3);
    }
}
