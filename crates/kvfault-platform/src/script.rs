//! Shell script node controller.
//!
//! For deployments that are not one container per node: systemd units,
//! supervisors, or wrappers around a remote API. `{node}` in a template is
//! replaced with the node index and `{role}` with `master` or `replica`.

use async_trait::async_trait;
use kvfault_core::{NodeIdentity, NodeState};
use tokio::process::Command;

use crate::controller::{NodeController, action_for, run_control_command};
use crate::error::Result;

/// Runs a shell command per control action.
#[derive(Debug, Clone)]
pub struct ScriptController {
    stop: String,
    start: String,
    shell: String,
}

impl ScriptController {
    /// Creates a controller from stop and start templates, run with `sh -c`.
    #[must_use]
    pub fn new(stop: impl Into<String>, start: impl Into<String>) -> Self {
        Self {
            stop: stop.into(),
            start: start.into(),
            shell: "sh".to_string(),
        }
    }

    /// Use a different shell (must accept `-c <script>`).
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// The command line that moves `node` to `desired`.
    #[must_use]
    pub fn render(&self, node: &NodeIdentity, desired: NodeState) -> String {
        let template = match desired {
            NodeState::Stopped => &self.stop,
            NodeState::Running => &self.start,
        };
        template
            .replace("{node}", &node.index.to_string())
            .replace("{role}", &node.role.to_string())
    }
}

#[async_trait]
impl NodeController for ScriptController {
    fn describe(&self) -> String {
        format!("script (stop: `{}`, start: `{}`)", self.stop, self.start)
    }

    async fn set_node_state(&self, node: &NodeIdentity, desired: NodeState) -> Result<()> {
        let action = action_for(desired);
        let script = self.render(node, desired);
        tracing::info!(node = node.index, %action, script, "running control script");

        let mut command = Command::new(&self.shell);
        command.arg("-c").arg(&script);
        run_control_command(command, action, node).await?;
        Ok(())
    }
}
