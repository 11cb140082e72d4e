//! muster-exec: pluggable per-target actions
//!
//! Defines the `HostAction` contract the dispatcher runs against each target,
//! plus the two shipped transports: local command execution and SSH.

pub mod error;
pub mod keys;
pub mod local;
pub mod result;
pub mod ssh;
pub mod traits;

pub use error::ExecError;
pub use keys::{KeySource, ResolvedKey};
pub use local::CommandAction;
pub use result::CommandResult;
pub use ssh::SshAction;
pub use traits::{ActionOutput, ActionParams, HostAction, render_command};
