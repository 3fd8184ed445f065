//! Key-value backend trait.
//!
//! Every backend follows the same contract: raw operations that surface
//! their errors. Policy (timeouts, retries, error absorption) lives in
//! [`ProxyConnection`](crate::ProxyConnection), not here.

use async_trait::async_trait;

use crate::error::OperationError;

/// Raw key-value operations against the proxy.
///
/// Implementations are cheap to clone. Clones share one session with the
/// proxy; [`session`](KvBackend::session) opens a separate one.
#[async_trait]
pub trait KvBackend: Clone + Send + Sync + 'static {
    /// Opens an independent session to the same proxy. Backends without
    /// per-session state hand out a clone.
    async fn session(&self) -> Result<Self, OperationError> {
        Ok(self.clone())
    }

    /// Round-trips a no-op command.
    async fn ping(&self) -> Result<(), OperationError>;

    /// Writes `value` under `key`.
    async fn set(&self, key: &str, value: &str) -> Result<(), OperationError>;

    /// Reads `key`; `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, OperationError>;

    /// Deletes `key`, returning how many keys were removed.
    async fn delete(&self, key: &str) -> Result<u64, OperationError>;

    /// Sends an arbitrary command and renders the reply as text.
    async fn command(&self, args: &[&str]) -> Result<String, OperationError>;
}
