//! Run configuration

use std::time::Duration;

use crate::error::CoreError;

/// Configuration for one dispatcher run
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Maximum number of actions in flight at once
    pub max_concurrent: usize,
    /// How long the reachability probe may take per target
    pub probe_timeout: Duration,
    /// How long a single action may run before it is abandoned
    pub per_task_timeout: Duration,
    /// Deadline for the whole run; `None` means the run may take as long as
    /// its slowest target
    pub overall_timeout: Option<Duration>,
    /// Total report write attempts before giving up
    pub retry_attempts: u32,
    /// Fixed delay between report write attempts
    pub retry_delay: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 25,
            probe_timeout: Duration::from_secs(1),
            per_task_timeout: Duration::from_secs(60),
            overall_timeout: None,
            retry_attempts: 5,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl RunConfig {
    /// Check that the configuration can actually drive a run.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidConfig` for values that would stall the
    /// dispatcher or disable the report entirely.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.max_concurrent == 0 {
            return Err(CoreError::InvalidConfig(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(CoreError::InvalidConfig(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.per_task_timeout.is_zero() {
            return Err(CoreError::InvalidConfig(
                "per_task_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
