//! Run lifecycle events

use serde::{Deserialize, Serialize};

use crate::outcome::{Outcome, RunSummary};

/// Event broadcast while a run progresses.
///
/// Emitted on a best-effort channel: the dispatcher never waits for
/// listeners and drops events when nobody subscribed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    /// An action started against a target
    TaskStarted { target: String },
    /// A task reached a terminal state
    TaskCompleted { outcome: Outcome },
    /// The run finished and the report is final
    RunCompleted { summary: RunSummary },
}
