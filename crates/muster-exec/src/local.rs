//! Local command action using `tokio::process`

use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::error::ExecError;
use crate::result::CommandResult;
use crate::traits::{ActionOutput, ActionParams, HostAction, render_command};

/// Runs a shell command on the local machine for each target.
///
/// The command is a template: `{target}` expands to the target identifier and
/// `{<param>}` to the matching resolved parameter, so one action instance
/// serves the whole fleet (`rename-sweep //{target}/share`, for example,
/// works against a mounted path per host without any remote transport).
#[derive(Debug, Clone)]
pub struct CommandAction {
    template: String,
    label: String,
}

impl CommandAction {
    /// Create an action from a command template
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            label: "command".to_string(),
        }
    }

    /// Override the action name recorded in the report
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    #[instrument(skip(self), level = "debug")]
    async fn execute(&self, cmd: &str) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        debug!(command = %cmd, "executing local command");

        // Use a shell so templates can carry pipes and redirections
        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(|e| ExecError::SpawnFailed(e.to_string()))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        let duration = start.elapsed();
        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        debug!(
            command = %cmd,
            status = status,
            duration = ?duration,
            "command completed"
        );

        if !output.status.success() {
            warn!(
                command = %cmd,
                status = status,
                stderr = %stderr.trim(),
                "command failed"
            );
        }

        Ok(CommandResult {
            status,
            stdout,
            stderr,
            duration,
        })
    }
}

#[async_trait]
impl HostAction for CommandAction {
    async fn invoke(&self, target: &str, params: &ActionParams) -> ActionOutput {
        let cmd = render_command(&self.template, target, params);
        match self.execute(&cmd).await {
            Ok(result) => ActionOutput {
                success: result.success(),
                message: result.summary(),
            },
            Err(e) => ActionOutput::failed(e.to_string()),
        }
    }

    fn name(&self) -> &str {
        &self.label
    }
}
