//! Command execution results shared by the local and SSH actions

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Longest message carried into a report row; longer output is truncated.
const MAX_SUMMARY_LEN: usize = 2048;

/// Result of one command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    /// Exit status code (0 for success)
    pub status: i32,
    /// stdout output
    pub stdout: String,
    /// stderr output
    pub stderr: String,
    /// Time taken to execute
    pub duration: Duration,
}

impl CommandResult {
    /// Check if the command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// One-line description suitable for a report row.
    ///
    /// Successful commands report their trimmed stdout (or `exit 0` when
    /// silent); failures report the exit status plus whichever stream had
    /// something to say. Output is truncated to keep report rows bounded.
    #[must_use]
    pub fn summary(&self) -> String {
        let text = if self.success() {
            let out = self.stdout.trim();
            if out.is_empty() {
                return "exit 0".to_string();
            }
            out.to_string()
        } else {
            let detail = if self.stderr.trim().is_empty() {
                self.stdout.trim()
            } else {
                self.stderr.trim()
            };
            if detail.is_empty() {
                format!("exit {}", self.status)
            } else {
                format!("exit {}: {detail}", self.status)
            }
        };
        truncate(&text, MAX_SUMMARY_LEN)
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.to_string();
    }
    let mut cut = limit;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... [truncated]", &text[..cut])
}
