//! The `HostAction` contract consumed by the dispatcher

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Parameters resolved for a target, keyed by name.
///
/// Populated from global configuration (and `--param` flags in the CLI);
/// actions decide what, if anything, they read from it.
pub type ActionParams = serde_json::Map<String, serde_json::Value>;

/// Result of one action invocation against one target.
///
/// This is the whole contract: a success flag and a human-readable message.
/// Implementations translate every internal failure into
/// `{ success: false, message }` instead of returning an error, so the
/// dispatcher never has to distinguish "the action failed" from "the action
/// misbehaved".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutput {
    /// Whether the action succeeded on this target
    pub success: bool,
    /// Short human-readable description of what happened
    pub message: String,
}

impl ActionOutput {
    /// Successful invocation
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Failed invocation
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// One unit of work performed against a single target.
///
/// `invoke` must not panic and must not leak errors: anything that goes wrong
/// inside the action becomes a failure `ActionOutput`. The dispatcher applies
/// timeouts around `invoke` and guards against panics anyway, but a
/// well-behaved action never relies on that.
#[async_trait]
pub trait HostAction: Send + Sync + std::fmt::Debug {
    /// Run the action against `target` with the resolved `params`.
    async fn invoke(&self, target: &str, params: &ActionParams) -> ActionOutput;

    /// Name recorded in the action column of the run report.
    fn name(&self) -> &str;
}

/// Substitute `{target}` and `{<param>}` placeholders in a command template.
///
/// String parameter values are inserted verbatim; other JSON values use their
/// JSON rendering. Placeholders with no matching parameter are left as-is.
pub fn render_command(template: &str, target: &str, params: &ActionParams) -> String {
    let mut rendered = template.replace("{target}", target);
    for (key, value) in params {
        let needle = format!("{{{key}}}");
        if !rendered.contains(&needle) {
            continue;
        }
        let text = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        rendered = rendered.replace(&needle, &text);
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, serde_json::Value)]) -> ActionParams {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn render_substitutes_target() {
        let out = render_command("ping {target}", "web-01", &ActionParams::new());
        assert_eq!(out, "ping web-01");
    }

    #[test]
    fn render_substitutes_params() {
        let p = params(&[
            ("version", serde_json::json!("126.0.1")),
            ("retries", serde_json::json!(3)),
        ]);
        let out = render_command("install {target} --version {version} -r {retries}", "host", &p);
        assert_eq!(out, "install host --version 126.0.1 -r 3");
    }

    #[test]
    fn render_leaves_unknown_placeholders() {
        let out = render_command("run {mystery}", "host", &ActionParams::new());
        assert_eq!(out, "run {mystery}");
    }

    #[test]
    fn output_constructors() {
        assert!(ActionOutput::ok("done").success);
        let failed = ActionOutput::failed("no route");
        assert!(!failed.success);
        assert_eq!(failed.message, "no route");
    }
}
