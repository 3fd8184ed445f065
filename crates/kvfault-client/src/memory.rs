//! In-process backend.
//!
//! Stands in for the proxy when exercising the harness: a shared map with an
//! outage switch, a write switch (replicas still serving reads while the
//! master is gone), per-key eviction, optional latency, and call counters.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use crate::backend::KvBackend;
use crate::error::OperationError;

/// Snapshot of how many times each operation was called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    /// `ping` calls.
    pub ping: u64,
    /// `set` calls.
    pub set: u64,
    /// `get` calls.
    pub get: u64,
    /// `delete` calls.
    pub delete: u64,
    /// `command` calls.
    pub command: u64,
    /// Sessions opened.
    pub session: u64,
}

impl CallCounts {
    /// Sum of all calls.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.ping + self.set + self.get + self.delete + self.command + self.session
    }
}

#[derive(Default)]
struct Calls {
    ping: AtomicU64,
    set: AtomicU64,
    get: AtomicU64,
    delete: AtomicU64,
    command: AtomicU64,
    session: AtomicU64,
}

struct Inner {
    data: RwLock<HashMap<String, String>>,
    available: AtomicBool,
    writable: AtomicBool,
    latency: Mutex<Duration>,
    calls: Calls,
}

/// Shared in-memory key-value backend. Clones share state.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("keys", &self.len())
            .field("available", &self.is_available())
            .finish()
    }
}

impl MemoryBackend {
    /// Creates an empty, available backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                data: RwLock::new(HashMap::new()),
                available: AtomicBool::new(true),
                writable: AtomicBool::new(true),
                latency: Mutex::new(Duration::ZERO),
                calls: Calls::default(),
            }),
        }
    }

    /// Adds a fixed delay to every operation.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        *self.inner.latency.lock() = latency;
        self
    }

    /// Makes every operation fail (or succeed again).
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// Returns true if operations are being served.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::SeqCst)
    }

    /// Makes writes fail while reads keep working.
    pub fn set_writable(&self, writable: bool) {
        self.inner.writable.store(writable, Ordering::SeqCst);
    }

    /// Drops every key for which `lost` returns true, returning how many
    /// were dropped.
    pub fn evict_where(&self, lost: impl Fn(&str) -> bool) -> usize {
        let mut data = self.inner.data.write();
        let before = data.len();
        data.retain(|k, _| !lost(k));
        before - data.len()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.data.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.data.read().is_empty()
    }

    /// Reads a key without counting a call.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.data.read().get(key).cloned()
    }

    /// Current call counts.
    #[must_use]
    pub fn calls(&self) -> CallCounts {
        let c = &self.inner.calls;
        CallCounts {
            ping: c.ping.load(Ordering::Relaxed),
            set: c.set.load(Ordering::Relaxed),
            get: c.get.load(Ordering::Relaxed),
            delete: c.delete.load(Ordering::Relaxed),
            command: c.command.load(Ordering::Relaxed),
            session: c.session.load(Ordering::Relaxed),
        }
    }

    async fn enter(&self, counter: &AtomicU64) -> Result<(), OperationError> {
        counter.fetch_add(1, Ordering::Relaxed);
        let latency = *self.inner.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.is_available() {
            Ok(())
        } else {
            Err(OperationError::unavailable("connection refused"))
        }
    }

    fn check_writable(&self) -> Result<(), OperationError> {
        if self.inner.writable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(OperationError::response(
                "READONLY You can't write against a read only replica.",
            ))
        }
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn session(&self) -> Result<Self, OperationError> {
        self.inner.calls.session.fetch_add(1, Ordering::Relaxed);
        if self.is_available() {
            Ok(self.clone())
        } else {
            Err(OperationError::unavailable("connection refused"))
        }
    }

    async fn ping(&self) -> Result<(), OperationError> {
        self.enter(&self.inner.calls.ping).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), OperationError> {
        self.enter(&self.inner.calls.set).await?;
        self.check_writable()?;
        self.inner
            .data
            .write()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, OperationError> {
        self.enter(&self.inner.calls.get).await?;
        Ok(self.inner.data.read().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<u64, OperationError> {
        self.enter(&self.inner.calls.delete).await?;
        self.check_writable()?;
        Ok(u64::from(self.inner.data.write().remove(key).is_some()))
    }

    async fn command(&self, args: &[&str]) -> Result<String, OperationError> {
        self.enter(&self.inner.calls.command).await?;
        match args {
            [] => Err(OperationError::Backend("empty command".into())),
            [name, ..] if name.eq_ignore_ascii_case("PING") => Ok("PONG".to_string()),
            [name, _, _] if name.eq_ignore_ascii_case("HGET") => Ok("nil".to_string()),
            [name, ..] if name.eq_ignore_ascii_case("HGET") => Err(OperationError::response(
                "ERR wrong number of arguments for 'hget' command",
            )),
            [name, ..] => Err(OperationError::response(format!(
                "ERR unknown command '{name}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let backend = MemoryBackend::new();
        backend.set("k", "v").await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));
        assert_eq!(backend.delete("k").await.unwrap(), 1);
        assert_eq!(backend.delete("k").await.unwrap(), 0);
        assert_eq!(backend.get("k").await.unwrap(), None);

        let calls = backend.calls();
        assert_eq!(calls.set, 1);
        assert_eq!(calls.get, 2);
        assert_eq!(calls.delete, 2);
        assert_eq!(calls.total(), 5);
    }

    #[tokio::test]
    async fn test_outage_fails_everything() {
        let backend = MemoryBackend::new();
        backend.set("k", "v").await.unwrap();
        backend.set_available(false);
        assert!(backend.get("k").await.is_err());
        assert!(backend.set("k2", "v").await.is_err());
        backend.set_available(true);
        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_read_only_mode() {
        let backend = MemoryBackend::new();
        backend.set("k", "v").await.unwrap();
        backend.set_writable(false);
        assert!(backend.set("k2", "v").await.unwrap_err().is_error_reply());
        assert_eq!(backend.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_evict_where() {
        let backend = MemoryBackend::new();
        for i in 0..10 {
            backend.set(&format!("k:{i}"), "v").await.unwrap();
        }
        let evicted = backend.evict_where(|k| k.ends_with('1') || k.ends_with('2'));
        assert_eq!(evicted, 2);
        assert_eq!(backend.len(), 8);
        assert!(backend.peek("k:1").is_none());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let a = MemoryBackend::new();
        let b = a.clone();
        a.set("shared", "1").await.unwrap();
        assert_eq!(b.peek("shared"), Some("1".to_string()));
        assert_eq!(b.calls().set, 1);
    }

    #[tokio::test]
    async fn test_commands() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.command(&["PING"]).await.unwrap(), "PONG");
        assert!(
            backend
                .command(&["NONEXISTENT_COMMAND"])
                .await
                .unwrap_err()
                .is_error_reply()
        );
        assert!(backend.command(&["HGET"]).await.unwrap_err().is_error_reply());
        assert!(backend.command(&["HGET", "h", "f"]).await.is_ok());
    }

    #[tokio::test]
    async fn test_session_shares_data_and_counts() {
        let backend = MemoryBackend::new();
        let session = backend.session().await.unwrap();
        session.set("k", "v").await.unwrap();
        assert_eq!(backend.peek("k"), Some("v".to_string()));
        assert_eq!(backend.calls().session, 1);

        backend.set_available(false);
        assert!(backend.session().await.is_err());
        assert_eq!(backend.calls().session, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency() {
        let backend = MemoryBackend::new().with_latency(Duration::from_millis(200));
        let start = tokio::time::Instant::now();
        backend.ping().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
