//! Error types for muster-exec
//!
//! These stay internal to action implementations: at the `HostAction`
//! boundary every error is folded into a failure `ActionOutput`.

use thiserror::Error;

/// Errors that can occur inside an action implementation
#[derive(Error, Debug, Clone)]
pub enum ExecError {
    /// Failed to connect to the target
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Authentication was rejected
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Process could not be spawned
    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),

    /// SSH key could not be resolved
    #[error("key resolution failed: {0}")]
    KeyResolution(String),

    /// I/O error during execution
    #[error("I/O error: {0}")]
    Io(String),
}
