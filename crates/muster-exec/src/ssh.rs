//! SSH command action using the russh crate

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use russh::keys::ssh_key;
use russh::keys::{PrivateKeyWithHashAlg, load_secret_key};
use russh::{ChannelMsg, Disconnect, client};
use tracing::{debug, instrument};

use crate::error::ExecError;
use crate::keys::KeySource;
use crate::result::CommandResult;
use crate::traits::{ActionOutput, ActionParams, HostAction, render_command};

/// SSH client handler for russh
#[derive(Debug)]
struct TrustingHandler;

impl client::Handler for TrustingHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Fleet runs land on freshly imaged hosts; known_hosts pinning
        // would turn every reinstall into a failure row
        Ok(true)
    }
}

/// Runs a templated command on each target over SSH.
///
/// A fleet action talks to a different host on every invocation, so unlike a
/// per-host executor there is no session to cache: each `invoke` opens a
/// connection to `target:port`, authenticates, runs the command, and
/// disconnects. The private key is loaded once at construction and shared
/// across concurrent invocations.
pub struct SshAction {
    user: String,
    port: u16,
    key: Arc<russh::keys::PrivateKey>,
    template: String,
    label: String,
}

impl std::fmt::Debug for SshAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshAction")
            .field("user", &self.user)
            .field("port", &self.port)
            .field("template", &self.template)
            .finish_non_exhaustive()
    }
}

impl SshAction {
    /// Create an SSH action.
    ///
    /// # Errors
    /// Returns `ExecError::KeyResolution` if the key source cannot be
    /// resolved or the key file cannot be parsed.
    pub fn new(
        user: impl Into<String>,
        key_source: &KeySource,
        template: impl Into<String>,
    ) -> Result<Self, ExecError> {
        let resolved = key_source.resolve()?;
        let key = load_secret_key(resolved.path(), None)
            .map_err(|e| ExecError::KeyResolution(e.to_string()))?;

        Ok(Self {
            user: user.into(),
            port: 22,
            key: Arc::new(key),
            template: template.into(),
            label: "ssh".to_string(),
        })
    }

    /// Set a non-default SSH port
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Override the action name recorded in the report
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// SSH port this action connects to
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[instrument(skip(self, cmd), fields(host = %host, port = self.port))]
    async fn execute(&self, host: &str, cmd: &str) -> Result<CommandResult, ExecError> {
        let start = Instant::now();

        let config = Arc::new(client::Config::default());
        let mut session = client::connect(config, (host, self.port), TrustingHandler)
            .await
            .map_err(|e| ExecError::ConnectionFailed(e.to_string()))?;

        let hash_alg = session
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        let auth = session
            .authenticate_publickey(
                &self.user,
                PrivateKeyWithHashAlg::new(Arc::clone(&self.key), hash_alg),
            )
            .await
            .map_err(|e| ExecError::AuthenticationFailed(e.to_string()))?;
        if !auth.success() {
            return Err(ExecError::AuthenticationFailed(
                "public key rejected".to_string(),
            ));
        }

        debug!(command = %cmd, "executing remote command");

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;
        channel
            .exec(true, cmd)
            .await
            .map_err(|e| ExecError::Io(e.to_string()))?;

        let mut status = -1;
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();

        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    if ext == 1 {
                        stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    status = exit_status.cast_signed();
                }
                Some(ChannelMsg::Eof) | None => break,
                _ => {}
            }
        }

        let _ = session
            .disconnect(Disconnect::ByApplication, "", "English")
            .await;

        let duration = start.elapsed();
        debug!(status = status, duration = ?duration, "remote command completed");

        Ok(CommandResult {
            status,
            stdout: String::from_utf8_lossy(&stdout).to_string(),
            stderr: String::from_utf8_lossy(&stderr).to_string(),
            duration,
        })
    }
}

#[async_trait]
impl HostAction for SshAction {
    async fn invoke(&self, target: &str, params: &ActionParams) -> ActionOutput {
        let cmd = render_command(&self.template, target, params);
        match self.execute(target, &cmd).await {
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
