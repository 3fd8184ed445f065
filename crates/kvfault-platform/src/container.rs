//! Container runtime node controller.
//!
//! Each backend node runs in its own container named `{prefix}{index}`
//! (`redis1` .. `redis4` by default). Stopping a node is `docker stop`,
//! restarting it is `docker start`; podman and nerdctl take the same
//! arguments.

use std::process::Stdio;
use std::str::FromStr;

use async_trait::async_trait;
use kvfault_core::{ControlAction, NodeIdentity, NodeState};
use tokio::process::Command;

use crate::controller::{NodeController, action_for, run_control_command};
use crate::error::{ControlError, Result};

/// Supported container runtimes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContainerRuntime {
    /// Docker runtime
    #[default]
    Docker,
    /// Podman runtime
    Podman,
    /// containerd runtime (via nerdctl)
    Containerd,
}

impl ContainerRuntime {
    /// The CLI command for this runtime.
    #[must_use]
    pub const fn cli_command(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
            Self::Containerd => "nerdctl",
        }
    }
}

impl FromStr for ContainerRuntime {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            "nerdctl" | "containerd" => Ok(Self::Containerd),
            other => Err(ControlError::unsupported(format!(
                "container runtime '{other}'"
            ))),
        }
    }
}

/// Stops and starts nodes as containers.
#[derive(Debug, Clone)]
pub struct ContainerController {
    runtime: ContainerRuntime,
    name_prefix: String,
}

impl Default for ContainerController {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerController {
    /// Docker, containers named `redis<n>`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runtime(ContainerRuntime::Docker)
    }

    /// Create with specific runtime.
    #[must_use]
    pub fn with_runtime(runtime: ContainerRuntime) -> Self {
        Self {
            runtime,
            name_prefix: "redis".to_string(),
        }
    }

    /// Set the container name prefix.
    #[must_use]
    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    /// The configured runtime.
    #[must_use]
    pub const fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// Container name for a node.
    #[must_use]
    pub fn container_name(&self, node: &NodeIdentity) -> String {
        format!("{}{}", self.name_prefix, node.index)
    }

    fn build_args(&self, action: ControlAction, node: &NodeIdentity) -> Vec<String> {
        let verb = match action {
            ControlAction::Stop => "stop",
            ControlAction::Start => "start",
        };
        vec![verb.to_string(), self.container_name(node)]
    }
}

#[async_trait]
impl NodeController for ContainerController {
    fn describe(&self) -> String {
        format!(
            "{} containers {}<n>",
            self.runtime.cli_command(),
            self.name_prefix
        )
    }

    async fn set_node_state(&self, node: &NodeIdentity, desired: NodeState) -> Result<()> {
        let action = action_for(desired);
        let mut command = Command::new(self.runtime.cli_command());
        command.args(self.build_args(action, node));

        tracing::info!(
            container = %self.container_name(node),
            %action,
            "issuing container control command"
        );
        run_control_command(command, action, node).await?;
        Ok(())
    }

    async fn observe(&self, node: &NodeIdentity) -> Result<Option<String>> {
        let cli = self.runtime.cli_command();
        let output = Command::new(cli)
            .args([
                "inspect",
                "--format",
                "{{.State.Status}}",
                &self.container_name(node),
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| ControlError::Spawn {
                command: cli.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            // Container not found
            return Ok(Some("missing".to_string()));
        }
        Ok(parse_status(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Normalizes `inspect --format {{.State.Status}}` output.
fn parse_status(output: &str) -> Option<String> {
    let status = output.trim();
    if status.is_empty() {
        None
    } else {
        Some(status.to_ascii_lowercase())
    }
}
