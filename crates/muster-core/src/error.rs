//! Core error types for muster-core

use thiserror::Error;

/// Errors that can occur while planning or running a sweep
#[derive(Error, Debug, Clone)]
pub enum CoreError {
    /// Configuration value rejected by validation
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Target source could not be read
    #[error("failed to read targets from {path}: {reason}")]
    TargetSource {
        /// Source path (or `-` for stdin)
        path: String,
        /// Underlying failure
        reason: String,
    },

    /// Report write failed after exhausting retries
    #[error("report write to {path} failed after {attempts} attempts: {reason}")]
    WriteFailed {
        /// Report destination
        path: String,
        /// Attempts made before giving up
        attempts: u32,
        /// Last write error
        reason: String,
    },

    /// Recorded outcome count does not match the dispatched target count
    #[error("outcome count mismatch: {recorded} outcomes for {expected} targets")]
    OutcomeCountMismatch {
        /// Outcomes the aggregator holds
        recorded: usize,
        /// Targets that were dispatched
        expected: usize,
    },

    /// Slot acquire/release accounting does not balance
    #[error("slot accounting mismatch: {acquired} acquired, {released} released")]
    SlotAccounting {
        /// Slots handed out
        acquired: usize,
        /// Slots given back
        released: usize,
    },

    /// Outcome serialization failed
    #[error("serialization error: {0}")]
    Serialize(String),

    /// Filesystem error outside the retry path
    #[error("io error: {0}")]
    Io(String),
}
