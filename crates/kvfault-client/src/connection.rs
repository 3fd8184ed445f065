//! Proxy connection with per-operation timeout and retry policy.
//!
//! get/set/delete never raise. A failed operation is logged with its cause
//! and reported as `false` / `None`, so a test keeps sampling through
//! backend instability instead of stopping mid-phase.

use std::future::Future;
use std::time::Duration;

use kvfault_core::ProxyConfig;

use crate::backend::KvBackend;
use crate::error::OperationError;
use crate::redis_backend::RedisBackend;

/// Timeout and retry policy applied to every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationPolicy {
    /// Bound on a single attempt.
    pub timeout: Duration,
    /// Extra attempts after a timeout. Error replies are never retried.
    pub retries: u32,
}

impl Default for OperationPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retries: 1,
        }
    }
}

impl From<&ProxyConfig> for OperationPolicy {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            timeout: config.op_timeout,
            retries: config.op_retries,
        }
    }
}

/// A session with the proxy.
///
/// Clones share the backend session. Concurrent workers each open their own
/// with [`session`](Self::session).
#[derive(Debug, Clone)]
pub struct ProxyConnection<B = RedisBackend> {
    backend: B,
    policy: OperationPolicy,
}

impl ProxyConnection<RedisBackend> {
    /// Connects to the proxy described by `config`.
    ///
    /// # Errors
    /// Returns a connectivity error if the proxy cannot be reached within
    /// the connect timeout. Fatal for the whole run.
    pub async fn connect(config: &ProxyConfig) -> kvfault_core::Result<Self> {
        let backend = RedisBackend::connect(config).await?;
        tracing::info!(url = backend.url(), "connected to proxy");
        Ok(Self::new(backend, OperationPolicy::from(config)))
    }
}

impl<B: KvBackend> ProxyConnection<B> {
    /// Wraps an already connected backend.
    #[must_use]
    pub const fn new(backend: B, policy: OperationPolicy) -> Self {
        Self { backend, policy }
    }

    /// The operation policy.
    #[must_use]
    pub const fn policy(&self) -> OperationPolicy {
        self.policy
    }

    /// Opens an independent session under the same policy. If the proxy
    /// does not accept one within the operation timeout, the new connection
    /// shares this session instead.
    pub async fn session(&self) -> Self {
        match tokio::time::timeout(self.policy.timeout, self.backend.session()).await {
            Ok(Ok(backend)) => Self::new(backend, self.policy),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "could not open a new session, sharing the current one");
                self.clone()
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.policy.timeout, "timed out opening a session, sharing the current one");
                self.clone()
            }
        }
    }

    /// Round-trips a `PING`. Returns false (and logs) on failure.
    pub async fn ping(&self) -> bool {
        match self.attempt(|| self.backend.ping()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "ping failed");
                false
            }
        }
    }

    /// Writes a key. Returns false (and logs) on any failure.
    pub async fn set(&self, key: &str, value: &str) -> bool {
        match self.attempt(|| self.backend.set(key, value)).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "error setting key");
                false
            }
        }
    }

    /// Reads a key. Returns `None` when the key is absent or the read
    /// failed; failures are logged.
    pub async fn get(&self, key: &str) -> Option<String> {
        match self.attempt(|| self.backend.get(key)).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "error getting key");
                None
            }
        }
    }

    /// Deletes a key. Returns true when the command completed, whether or
    /// not the key existed; false (and logs) on failure.
    pub async fn delete(&self, key: &str) -> bool {
        match self.attempt(|| self.backend.delete(key)).await {
            Ok(removed) => {
                tracing::trace!(key, removed, "deleted key");
                true
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "error deleting key");
                false
            }
        }
    }

    /// Sends a raw command under the same policy, surfacing the error.
    ///
    /// # Errors
    /// Returns the operation error from the last attempt.
    pub async fn command(&self, args: &[&str]) -> Result<String, OperationError> {
        self.attempt(|| self.backend.command(args)).await
    }

    /// Runs `op` with the timeout, retrying only on timeout.
    async fn attempt<T, F, Fut>(&self, op: F) -> Result<T, OperationError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, OperationError>>,
    {
        let mut attempt = 0;
        loop {
            match tokio::time::timeout(self.policy.timeout, op()).await {
                Ok(result) => return result,
                Err(_) if attempt < self.policy.retries => {
                    attempt += 1;
                    tracing::debug!(attempt, timeout = ?self.policy.timeout, "operation timed out, retrying");
                }
                Err(_) => return Err(OperationError::Timeout(self.policy.timeout)),
            }
        }
    }
}
