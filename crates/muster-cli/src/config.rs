//! Configuration file loading

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use muster_exec::ActionParams;

/// Top-level configuration for the muster CLI.
///
/// Every field is optional; command-line flags override anything set here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    /// Run engine settings
    #[serde(default)]
    pub run: RunSection,
    /// Report destination settings
    #[serde(default)]
    pub report: ReportSection,
    /// SSH action settings
    #[serde(default)]
    pub ssh: SshSection,
    /// Action parameters passed to every target
    #[serde(default)]
    pub params: BTreeMap<String, toml::Value>,
}

/// `[run]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSection {
    /// Maximum actions in flight at once
    pub max_concurrent: Option<usize>,
    /// Per-action timeout in seconds
    pub task_timeout: Option<u64>,
    /// Whole-run deadline in seconds
    pub run_timeout: Option<u64>,
    /// TCP port probed before dispatch
    pub probe_port: Option<u16>,
    /// Probe timeout in seconds
    pub probe_timeout: Option<u64>,
}

/// `[report]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportSection {
    /// Report destination path
    pub path: Option<PathBuf>,
    /// Report format, `csv` or `jsonl`
    pub format: Option<String>,
    /// Append outcomes as they complete
    pub stream: Option<bool>,
    /// Report write attempts before giving up
    pub retry_attempts: Option<u32>,
    /// Delay between report write attempts in seconds
    pub retry_delay: Option<u64>,
}

/// `[ssh]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshSection {
    /// Remote user
    pub user: Option<String>,
    /// Remote port
    pub port: Option<u16>,
    /// Private key path
    pub key: Option<PathBuf>,
}

impl FileConfig {
    /// Load configuration from a file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: &PathBuf) -> eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: FileConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from default paths or fall back to defaults
    pub fn load_default() -> eyre::Result<Self> {
        if let Ok(path) = std::env::var("MUSTER_CONFIG") {
            return Self::load(&PathBuf::from(path));
        }

        let paths = [
            PathBuf::from("muster.toml"),
            PathBuf::from("/etc/muster/muster.toml"),
            dirs::config_dir()
                .map(|p| p.join("muster/config.toml"))
                .unwrap_or_default(),
        ];

        for path in paths {
            if path.exists() {
                return Self::load(&path);
            }
        }

        tracing::debug!("no config file found, using defaults");
        Ok(FileConfig::default())
    }

    /// Convert the `[params]` table into action parameters
    ///
    /// # Errors
    /// Returns an error for TOML values with no JSON equivalent
    pub fn action_params(&self) -> eyre::Result<ActionParams> {
        let mut params = ActionParams::new();
        for (key, value) in &self.params {
            params.insert(key.clone(), serde_json::to_value(value)?);
        }
        Ok(params)
    }
}
