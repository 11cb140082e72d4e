//! Target enumeration

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use muster_exec::ActionParams;

use crate::error::CoreError;

/// One managed endpoint acted upon during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    /// Hostname or address used by the probe and the action
    pub host: String,
    /// Per-target parameter overrides, applied on top of the run parameters
    #[serde(default)]
    pub params: ActionParams,
}

impl Target {
    /// Create a target with no parameter overrides
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            params: ActionParams::new(),
        }
    }

    /// Add a per-target parameter override
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }
}

/// Parse targets from newline-delimited text.
///
/// Blank lines and lines starting with `#` are skipped. Exact duplicate
/// hosts are dropped, keeping the first occurrence, so a run produces
/// exactly one outcome per listed host.
pub fn parse_targets(input: &str) -> Vec<Target> {
    let mut seen = HashSet::new();
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter(|host| seen.insert(host.to_string()))
        .map(Target::new)
        .collect()
}

/// Read targets from a newline-delimited file.
///
/// # Errors
/// Returns `CoreError::TargetSource` when the file cannot be read.
pub async fn targets_from_file(path: impl AsRef<Path>) -> Result<Vec<Target>, CoreError> {
    let path = path.as_ref();
    let contents =
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CoreError::TargetSource {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
    Ok(parse_targets(&contents))
}
