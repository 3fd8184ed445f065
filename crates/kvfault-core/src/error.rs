//! Error types for kvfault-core.
//!
//! Only the variants here may terminate a run. Per-operation failures and
//! failed node-control actions are absorbed into counters and report events
//! by the crates that produce them.

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Errors that escape to the top level and abort a run.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// The proxy could not be reached within the connect timeout.
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Invalid configuration, including node/role combinations that violate
    /// the static topology.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A harness invariant was broken (e.g. a load worker panicked).
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Report or config (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl HarnessError {
    /// Creates a connectivity error.
    #[must_use]
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this error was raised before any side effect could
    /// have happened (nothing written, no node touched).
    #[must_use]
    pub const fn is_preflight(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Configuration(_))
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
