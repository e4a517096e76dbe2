//! Timestamped JSON debug dumps of intermediate pipeline state.
//!
//! Each dump is one self-describing file; a failed write is logged and
//! swallowed so diagnostics can never take down a run.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

/// Writes labeled snapshots into a debug directory.
#[derive(Debug, Clone)]
pub struct DebugReporter {
    dir: PathBuf,
}

impl DebugReporter {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Dump one labeled snapshot. Write failures are logged, never raised.
    pub fn dump<T: Serialize>(&self, label: &str, description: &str, data: &T) {
        let timestamp = Utc::now();
        let name = format!(
            "{}_{}.json",
            timestamp.format("%Y%m%d_%H%M%S"),
            sanitize_label(label)
        );
        let path = self.dir.join(name);
        let payload = json!({
            "timestamp": timestamp.to_rfc3339(),
            "description": description,
            "data": data,
        });

        let result = std::fs::create_dir_all(&self.dir).and_then(|_| {
            let rendered = serde_json::to_string_pretty(&payload)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(&path, rendered)
        });
        match result {
            Ok(()) => debug!(path = %path.display(), "debug snapshot written"),
            Err(err) => warn!(label, error = %err, "debug snapshot dropped"),
        }
    }
}

/// Restrict a label to filename-safe characters.
fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
