//! Action and probe construction from resolved settings

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;

use muster_core::{AlwaysReachable, ReachabilityProbe, TcpProbe};
use muster_exec::{ActionOutput, ActionParams, CommandAction, HostAction, KeySource, SshAction};

/// Environment variable holding a base64-encoded private key, used when no
/// key path is configured
pub const SSH_KEY_ENV: &str = "MUSTER_SSH_KEY";

/// Build the local shell command action
pub fn local_action(template: &str) -> Arc<dyn HostAction> {
    Arc::new(CommandAction::new(template))
}

/// Build the SSH command action.
///
/// Falls back to a base64 key in `MUSTER_SSH_KEY` when no key path is given.
///
/// # Errors
/// Returns an error when the key cannot be resolved or parsed.
pub fn ssh_action(
    user: &str,
    port: u16,
    key: Option<&Path>,
    template: &str,
) -> Result<Arc<dyn HostAction>> {
    let key_source = match key {
        Some(path) => KeySource::Path(path.to_path_buf()),
        None => KeySource::Env(SSH_KEY_ENV.to_string()),
    };
    let action = SshAction::new(user, &key_source, template)
        .map_err(|e| eyre::eyre!("failed to prepare SSH action: {e}"))?
        .with_port(port);
    Ok(Arc::new(action))
}

/// Build the pre-dispatch probe.
///
/// No port means probing is off, local actions have nothing useful to
/// probe. `disabled` wins over everything.
pub fn probe(port: Option<u16>, timeout: Duration, disabled: bool) -> Arc<dyn ReachabilityProbe> {
    if disabled {
        return Arc::new(AlwaysReachable);
    }
    match port {
        Some(port) => Arc::new(TcpProbe::new(port, timeout)),
        None => Arc::new(AlwaysReachable),
    }
}

/// Parse one `--param key=value` argument.
///
/// The value side is parsed as JSON when possible, so numbers, booleans,
/// and arrays come through typed; anything else stays a string.
///
/// # Errors
/// Returns an error when the argument has no `=`.
pub fn parse_param(raw: &str) -> Result<(String, serde_json::Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| eyre::eyre!("parameter must be key=value, got {raw:?}"))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Turns a reachability probe into the action itself, for probe-only sweeps
pub struct ProbeAction {
    probe: Arc<dyn ReachabilityProbe>,
}

impl std::fmt::Debug for ProbeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeAction").finish_non_exhaustive()
    }
}

impl ProbeAction {
    /// Wrap a probe as the per-target action
    pub fn new(probe: Arc<dyn ReachabilityProbe>) -> Self {
        Self { probe }
    }
}

#[async_trait]
impl HostAction for ProbeAction {
    async fn invoke(&self, target: &str, _params: &ActionParams) -> ActionOutput {
        if self.probe.probe(target).await {
            ActionOutput::ok("reachable")
        } else {
            ActionOutput::failed("unreachable")
        }
    }

    fn name(&self) -> &str {
        "probe"
    }
}
