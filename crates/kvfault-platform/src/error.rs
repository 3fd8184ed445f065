//! Node control error types.
//!
//! A control failure is recorded in the run report and logged; it never
//! aborts a run.

use kvfault_core::ControlAction;

/// Result type alias for control operations.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Node control errors.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The control command could not be launched at all.
    #[error("failed to run '{command}': {reason}")]
    Spawn {
        /// Program that failed to launch.
        command: String,
        /// OS-level reason.
        reason: String,
    },

    /// The control command ran and reported failure.
    #[error("{action} node {node} failed: {detail}")]
    Failed {
        /// Attempted action.
        action: ControlAction,
        /// Node index.
        node: u8,
        /// Exit status and stderr.
        detail: String,
    },

    /// The controller cannot perform this request.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

impl ControlError {
    /// Creates an unsupported error.
    #[must_use]
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}
