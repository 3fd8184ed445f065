//! Node controller trait.
//!
//! Every control mechanism follows the same contract: move a node to a
//! desired state and report success or failure.

use std::process::Stdio;

use async_trait::async_trait;
use kvfault_core::{ControlAction, NodeIdentity, NodeState};
use tokio::process::Command;

use crate::error::{ControlError, Result};

/// External control surface for backend nodes.
#[async_trait]
pub trait NodeController: Send + Sync {
    /// Short description for logs and reports.
    fn describe(&self) -> String;

    /// Moves `node` to `desired`.
    ///
    /// # Errors
    /// Returns an error if the control action could not be performed.
    async fn set_node_state(&self, node: &NodeIdentity, desired: NodeState) -> Result<()>;

    /// Reports the node's current state as the control mechanism sees it,
    /// or `None` if the mechanism cannot tell.
    ///
    /// # Errors
    /// Returns an error if the query itself failed.
    async fn observe(&self, node: &NodeIdentity) -> Result<Option<String>> {
        let _ = node;
        Ok(None)
    }

    /// Stops a node.
    ///
    /// # Errors
    /// Returns an error if the node could not be stopped.
    async fn stop(&self, node: &NodeIdentity) -> Result<()> {
        self.set_node_state(node, NodeState::Stopped).await
    }

    /// Starts a node.
    ///
    /// # Errors
    /// Returns an error if the node could not be started.
    async fn start(&self, node: &NodeIdentity) -> Result<()> {
        self.set_node_state(node, NodeState::Running).await
    }
}

/// The action that moves a node to `desired`.
pub(crate) const fn action_for(desired: NodeState) -> ControlAction {
    match desired {
        NodeState::Stopped => ControlAction::Stop,
        NodeState::Running => ControlAction::Start,
    }
}

/// Runs a control command to completion, returning trimmed stdout.
///
/// Non-zero exit is a [`ControlError::Failed`] carrying status and stderr.
pub(crate) async fn run_control_command(
    mut command: Command,
    action: ControlAction,
    node: &NodeIdentity,
) -> Result<String> {
    let program = command.as_std().get_program().to_string_lossy().to_string();
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ControlError::Spawn {
            command: program.clone(),
            reason: e.to_string(),
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ControlError::Failed {
            action,
            node: node.index,
            detail: format!("{}: {}", output.status, stderr.trim()),
        });
    }

    tracing::debug!(program, node = node.index, %action, stdout, "control command succeeded");
    Ok(stdout)
}
