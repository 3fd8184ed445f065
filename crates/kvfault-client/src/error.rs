//! Per-operation error type.
//!
//! These never cross the [`ProxyConnection`](crate::ProxyConnection)
//! boundary for get/set/delete; they are logged and counted.

use std::time::Duration;

/// Failure of a single key-value operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationError {
    /// No reply within the operation timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// The proxy or the backend behind it could not serve the request.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The proxy answered with an error reply.
    #[error("error reply: {0}")]
    Response(String),

    /// Any other client-side or protocol failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl OperationError {
    /// Creates an unavailable error.
    #[must_use]
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Creates a response error.
    #[must_use]
    pub fn response(msg: impl Into<String>) -> Self {
        Self::Response(msg.into())
    }

    /// Returns true for timeouts, the only failure retried by policy.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns true if the proxy replied with an error rather than failing
    /// to reply at all.
    #[must_use]
    pub const fn is_error_reply(&self) -> bool {
        matches!(self, Self::Response(_))
    }
}
