//! Progress observer surface

use tracing::info;

/// Receives `(completed, total)` updates as outcomes land.
///
/// Purely informational. Implementations must return quickly; a slow
/// observer delays its own task's exit but never another target's work.
pub trait ProgressObserver: Send + Sync {
    /// Called after each outcome is recorded
    fn on_progress(&self, completed: usize, total: usize);
}

/// Observer that discards updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressObserver for NullProgress {
    fn on_progress(&self, _completed: usize, _total: usize) {}
}

/// Observer that logs each update
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressObserver for LogProgress {
    fn on_progress(&self, completed: usize, total: usize) {
        info!(completed = completed, total = total, "run progress");
    }
}
