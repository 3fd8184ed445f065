// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # kvfault-platform
//!
//! Stops and starts backend nodes on behalf of the failover harness.
//!
//! - **Container** (docker/podman/nerdctl): node `n` is container
//!   `{prefix}{n}`
//! - **Script**: arbitrary shell commands with a `{node}` placeholder
//!   (systemd units, supervisors, remote RPC wrappers)
//!
//! Every controller implements [`NodeController`]; the harness never sees
//! how a node is actually stopped.
//!
//! ## Example
//!
//! ```rust,ignore
//! use kvfault_platform::{ContainerController, NodeController};
//! use kvfault_core::NodeIdentity;
//!
//! let controller = ContainerController::new();
//! controller.stop(&NodeIdentity::replica(3)).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod container;
pub mod controller;
pub mod error;
pub mod script;

use std::sync::Arc;

use kvfault_core::ControlConfig;

pub use container::{ContainerController, ContainerRuntime};
pub use controller::NodeController;
pub use error::{ControlError, Result};
pub use script::ScriptController;

/// Builds the controller described by the configuration.
///
/// # Errors
/// Returns an error for an unknown container runtime.
pub fn from_config(config: &ControlConfig) -> Result<Arc<dyn NodeController>> {
    match config {
        ControlConfig::Container {
            runtime,
            name_prefix,
        } => {
            let runtime: ContainerRuntime = runtime.parse()?;
            Ok(Arc::new(
                ContainerController::with_runtime(runtime).with_name_prefix(name_prefix.clone()),
            ))
        }
        ControlConfig::Script { stop, start } => {
            Ok(Arc::new(ScriptController::new(stop.clone(), start.clone())))
        }
    }
}
