//! Completion-ordered outcome collection

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::outcome::{Outcome, RunSummary};

/// Collects outcomes from completing tasks.
///
/// `record` may be called from many tasks at once; the store serializes
/// writes so outcomes land whole and in completion order. The completed
/// counter is readable without taking the lock, which keeps progress
/// reporting off the write path.
#[derive(Debug, Default)]
pub struct Aggregator {
    outcomes: Mutex<Vec<Outcome>>,
    completed: AtomicUsize,
}

impl Aggregator {
    /// Create an empty aggregator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one outcome.
    ///
    /// The counter is bumped after the push, so a progress read never runs
    /// ahead of the store.
    pub fn record(&self, outcome: Outcome) {
        let mut store = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
        store.push(outcome);
        drop(store);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    /// Outcomes recorded so far
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Copy of the outcomes recorded so far, in completion order
    #[must_use]
    pub fn snapshot(&self) -> Vec<Outcome> {
        self.outcomes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Status counts over the outcomes recorded so far
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        let store = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
        RunSummary::tally(&store)
    }

    /// Consume the aggregator and take the outcomes without copying
    #[must_use]
    pub fn finalize(self) -> Vec<Outcome> {
        self.outcomes
            .into_inner()
            .unwrap_or_else(|e| e.into_inner())
    }
}
