//! Bounded fan-out of one action across many targets

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use muster_exec::{ActionParams, HostAction};

use crate::aggregator::Aggregator;
use crate::config::RunConfig;
use crate::error::CoreError;
use crate::events::RunEvent;
use crate::limiter::{Slot, SlotPool};
use crate::outcome::{Outcome, RunReport, RunSummary, TaskStatus};
use crate::probe::ReachabilityProbe;
use crate::progress::{NullProgress, ProgressObserver};
use crate::target::Target;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Runs one action against every target with bounded concurrency.
///
/// Each target becomes its own task: probe, take a slot, run the action,
/// record the outcome. Targets never wait on each other beyond the slot
/// pool, and completion order is whatever the network gives us. Every
/// dispatched target ends up with exactly one outcome in the report, no
/// matter how its task ends.
pub struct Dispatcher {
    action: Arc<dyn HostAction>,
    probe: Arc<dyn ReachabilityProbe>,
    config: RunConfig,
    params: ActionParams,
    progress: Arc<dyn ProgressObserver>,
    events: broadcast::Sender<RunEvent>,
}

impl Dispatcher {
    /// Create a dispatcher for one action/probe pairing
    pub fn new(
        action: Arc<dyn HostAction>,
        probe: Arc<dyn ReachabilityProbe>,
        config: RunConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            action,
            probe,
            config,
            params: ActionParams::new(),
            progress: Arc::new(NullProgress),
            events,
        }
    }

    /// Set run-wide action parameters
    #[must_use]
    pub fn with_params(mut self, params: ActionParams) -> Self {
        self.params = params;
        self
    }

    /// Set the progress observer
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    /// Subscribe to run events.
    ///
    /// Best effort: late subscribers miss earlier events and slow readers
    /// lose the oldest buffered ones.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Run the action against every target and return the finished report.
    ///
    /// Per-target failures never fail the run; they become failure outcomes
    /// in the report. The returned report is marked degraded when an
    /// end-of-run accounting check fails.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidConfig` when the configuration cannot
    /// drive a run. Nothing is dispatched in that case.
    pub async fn run(&self, targets: Vec<Target>) -> Result<RunReport, CoreError> {
        self.config.validate()?;

        let started_at = Utc::now();
        let total = targets.len();
        if total == 0 {
            warn!("run started with an empty target list");
        }

        let cancel = CancellationToken::new();
        if let Some(limit) = self.config.overall_timeout {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        warn!(limit = ?limit, "run deadline reached, abandoning remaining tasks");
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            });
        }

        let aggregator = Arc::new(Aggregator::new());
        let pool = Arc::new(SlotPool::new(self.config.max_concurrent));
        let mut tasks = JoinSet::new();
        let mut task_targets: HashMap<tokio::task::Id, String> = HashMap::with_capacity(total);

        info!(
            targets = total,
            max_concurrent = self.config.max_concurrent,
            action = self.action.name(),
            "starting run"
        );

        for target in targets {
            let host = target.host.clone();
            let ctx = TaskContext {
                params: self.params_for(&target),
                host: target.host,
                action: Arc::clone(&self.action),
                probe: Arc::clone(&self.probe),
                pool: Arc::clone(&pool),
                aggregator: Arc::clone(&aggregator),
                events: self.events.clone(),
                progress: Arc::clone(&self.progress),
                cancel: cancel.clone(),
                per_task_timeout: self.config.per_task_timeout,
                total,
            };
            let handle = tasks.spawn(ctx.run());
            task_targets.insert(handle.id(), host);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, ())) => {
                    task_targets.remove(&id);
                }
                Err(err) => {
                    let target = task_targets
                        .remove(&err.id())
                        .unwrap_or_else(|| "unknown".to_string());
                    warn!(host = %target, error = %err, "task ended abnormally");
                    let now = Utc::now();
                    let outcome = Outcome {
                        target,
                        action: self.action.name().to_string(),
                        status: TaskStatus::Panicked,
                        message: err.to_string(),
                        started_at: now,
                        finished_at: now,
                    };
                    aggregator.record(outcome.clone());
                    let _ = self.events.send(RunEvent::TaskCompleted { outcome });
                    self.progress.on_progress(aggregator.completed(), total);
                }
            }
        }
        cancel.cancel();

        let outcomes = match Arc::try_unwrap(aggregator) {
            Ok(aggregator) => aggregator.finalize(),
            Err(shared) => shared.snapshot(),
        };

        let degraded = match Self::verify(outcomes.len(), total, &pool) {
            Ok(()) => false,
            Err(e) => {
                error!(error = %e, "run degraded");
                true
            }
        };

        let summary = RunSummary::tally(&outcomes);
        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failures = summary.failures(),
            degraded = degraded,
            "run complete"
        );
        let _ = self.events.send(RunEvent::RunCompleted {
            summary: summary.clone(),
        });

        Ok(RunReport {
            outcomes,
            summary,
            started_at,
            finished_at: Utc::now(),
            degraded,
        })
    }

    /// End-of-run accounting: every target has exactly one outcome and
    /// every slot that was handed out came back.
    fn verify(recorded: usize, expected: usize, pool: &SlotPool) -> Result<(), CoreError> {
        if recorded != expected {
            return Err(CoreError::OutcomeCountMismatch { recorded, expected });
        }
        if !pool.is_balanced() {
            return Err(CoreError::SlotAccounting {
                acquired: pool.acquired(),
                released: pool.released(),
            });
        }
        Ok(())
    }

    fn params_for(&self, target: &Target) -> ActionParams {
        if target.params.is_empty() {
            return self.params.clone();
        }
        let mut merged = self.params.clone();
        merged.extend(target.params.clone());
        merged
    }
}

/// Everything one task needs, moved into its future
struct TaskContext {
    host: String,
    params: ActionParams,
    action: Arc<dyn HostAction>,
    probe: Arc<dyn ReachabilityProbe>,
    pool: Arc<SlotPool>,
    aggregator: Arc<Aggregator>,
    events: broadcast::Sender<RunEvent>,
    progress: Arc<dyn ProgressObserver>,
    cancel: CancellationToken,
    per_task_timeout: Duration,
    total: usize,
}

impl TaskContext {
    async fn run(self) {
        let (outcome, slot) = self.execute().await;
        self.aggregator.record(outcome.clone());
        // The slot is held until the outcome is recorded
        drop(slot);
        let _ = self.events.send(RunEvent::TaskCompleted { outcome });
        self.progress.on_progress(self.aggregator.completed(), self.total);
    }

    /// Walk one target through probe, slot wait, and action.
    ///
    /// Every path returns exactly one outcome. Paths that never acquired a
    /// slot return `None` for it.
    async fn execute(&self) -> (Outcome, Option<Slot>) {
        let queued_at = Utc::now();

        let reachable = tokio::select! {
            _ = self.cancel.cancelled() => {
                return (
                    self.outcome(
                        TaskStatus::TimedOut,
                        "run deadline exceeded before start",
                        queued_at,
                    ),
                    None,
                );
            }
            reachable = self.probe.probe(&self.host) => reachable,
        };
        if !reachable {
            debug!(host = %self.host, "target unreachable, skipping");
            return (
                self.outcome(TaskStatus::Unreachable, "target unreachable", queued_at),
                None,
            );
        }

        let slot = tokio::select! {
            _ = self.cancel.cancelled() => {
                return (
                    self.outcome(
                        TaskStatus::TimedOut,
                        "run deadline exceeded while waiting for a slot",
                        queued_at,
                    ),
                    None,
                );
            }
            slot = self.pool.acquire() => slot,
        };

        let _ = self.events.send(RunEvent::TaskStarted {
            target: self.host.clone(),
        });
        let started_at = Utc::now();
        debug!(host = %self.host, action = self.action.name(), "task started");

        let invocation =
            tokio::time::timeout(self.per_task_timeout, self.action.invoke(&self.host, &self.params));
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => {
                self.outcome(TaskStatus::TimedOut, "run deadline exceeded mid-action", started_at)
            }
            invoked = invocation => match invoked {
                Ok(output) => {
                    let status = if output.success {
                        TaskStatus::Succeeded
                    } else {
                        TaskStatus::Failed
                    };
                    self.outcome(status, output.message, started_at)
                }
                Err(_) => self.outcome(
                    TaskStatus::TimedOut,
                    format!("action timed out after {:?}", self.per_task_timeout),
                    started_at,
                ),
            },
        };
        (outcome, Some(slot))
    }

    fn outcome(
        &self,
        status: TaskStatus,
        message: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Outcome {
        Outcome {
            target: self.host.clone(),
            action: self.action.name().to_string(),
            status,
            message: message.into(),
            started_at,
            finished_at: Utc::now(),
        }
    }
}
