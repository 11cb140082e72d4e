//! Outcome and report types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal status of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Action ran and reported success
    Succeeded,
    /// Action ran and reported failure
    Failed,
    /// Probe found the target unreachable; action never ran
    Unreachable,
    /// Action exceeded its timeout, or the run deadline abandoned the task
    TimedOut,
    /// Action panicked; outcome synthesized from the join error
    Panicked,
}

impl TaskStatus {
    /// True only for [`TaskStatus::Succeeded`]
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, TaskStatus::Succeeded)
    }
}

/// Result of one task against one target.
///
/// Every dispatched target produces exactly one of these, including targets
/// whose action panicked, timed out, or was never started because the probe
/// failed. Outcomes are append-only once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    /// Target this outcome belongs to
    pub target: String,
    /// Action name as reported by the `HostAction`
    pub action: String,
    /// Terminal status
    pub status: TaskStatus,
    /// Human-readable result message
    pub message: String,
    /// When the task started (or when it was abandoned, for tasks that
    /// never ran)
    pub started_at: DateTime<Utc>,
    /// When the task finished
    pub finished_at: DateTime<Utc>,
}

impl Outcome {
    /// True when the action ran and reported success
    #[must_use]
    pub fn success(&self) -> bool {
        self.status.is_success()
    }

    /// Wall-clock time from start to finish
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Outcome counts grouped by terminal status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Outcomes recorded in total
    pub total: usize,
    /// Actions that reported success
    pub succeeded: usize,
    /// Actions that reported failure
    pub failed: usize,
    /// Targets the probe skipped
    pub unreachable: usize,
    /// Tasks abandoned by a timeout
    pub timed_out: usize,
    /// Tasks whose action panicked
    pub panicked: usize,
}

impl RunSummary {
    /// Count outcomes by status
    #[must_use]
    pub fn tally(outcomes: &[Outcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.total += 1;
            match outcome.status {
                TaskStatus::Succeeded => summary.succeeded += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Unreachable => summary.unreachable += 1,
                TaskStatus::TimedOut => summary.timed_out += 1,
                TaskStatus::Panicked => summary.panicked += 1,
            }
        }
        summary
    }

    /// Everything that is not a success
    #[must_use]
    pub fn failures(&self) -> usize {
        self.total - self.succeeded
    }
}

/// All outcomes for one run, ordered by completion time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Outcomes in the order they completed
    pub outcomes: Vec<Outcome>,
    /// Counts by terminal status
    pub summary: RunSummary,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Set when an internal invariant check failed; the outcome list may be
    /// incomplete and callers should treat the run as broken
    pub degraded: bool,
}

impl RunReport {
    /// True when any target did not succeed
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.summary.failures() > 0
    }
}
