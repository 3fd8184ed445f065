//! RESP backend over a reconnecting tokio connection.
//!
//! A dropped socket fails the operations in flight on it; the next
//! operation runs on a fresh connection. A proxy that closes client
//! connections while a backend node is down therefore costs errors only for
//! as long as it keeps refusing.

use std::fmt;

use async_trait::async_trait;
use kvfault_core::{HarnessError, ProxyConfig};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ErrorKind, RedisError};

use crate::backend::KvBackend;
use crate::error::OperationError;

/// Backend that talks to the proxy with the Redis protocol.
///
/// Clones share one session; [`KvBackend::session`] opens another.
#[derive(Clone)]
pub struct RedisBackend {
    client: Client,
    conn: ConnectionManager,
    url: String,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend").field("url", &self.url).finish()
    }
}

impl RedisBackend {
    /// Connects to the proxy and verifies it answers `PING`, all within
    /// `connect_timeout`. Not retried.
    ///
    /// # Errors
    /// Returns a connectivity error if the proxy is unreachable.
    pub async fn connect(config: &ProxyConfig) -> kvfault_core::Result<Self> {
        let url = config.url();
        let client = Client::open(url.as_str())
            .map_err(|e| HarnessError::connectivity(format!("invalid proxy address {url}: {e}")))?;

        let handshake = async {
            let mut conn = ConnectionManager::new(client.clone()).await?;
            redis::cmd("PING")
                .query_async::<_, String>(&mut conn)
                .await?;
            Ok::<_, RedisError>(conn)
        };

        match tokio::time::timeout(config.connect_timeout, handshake).await {
            Ok(Ok(conn)) => Ok(Self { client, conn, url }),
            Ok(Err(e)) => Err(HarnessError::connectivity(format!(
                "failed to connect to {url}: {e}"
            ))),
            Err(_) => Err(HarnessError::connectivity(format!(
                "timed out after {:?} connecting to {url}",
                config.connect_timeout
            ))),
        }
    }

    /// The proxy URL this backend is connected to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Classifies a client error.
fn classify(err: &RedisError) -> OperationError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() {
        return OperationError::unavailable(err.to_string());
    }
    match err.kind() {
        ErrorKind::ResponseError | ErrorKind::ExtensionError => {
            OperationError::response(err.to_string())
        }
        _ => OperationError::Backend(err.to_string()),
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    async fn session(&self) -> Result<Self, OperationError> {
        let conn = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|e| classify(&e))?;
        Ok(Self {
            client: self.client.clone(),
            conn,
            url: self.url.clone(),
        })
    }

    async fn ping(&self) -> Result<(), OperationError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(|e| classify(&e))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), OperationError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value)
            .await
            .map_err(|e| classify(&e))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, OperationError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| classify(&e))
    }

    async fn delete(&self, key: &str) -> Result<u64, OperationError> {
        let mut conn = self.conn.clone();
        conn.del::<_, u64>(key).await.map_err(|e| classify(&e))
    }

    async fn command(&self, args: &[&str]) -> Result<String, OperationError> {
        let Some((name, rest)) = args.split_first() else {
            return Err(OperationError::Backend("empty command".into()));
        };
        let mut cmd = redis::cmd(name);
        for arg in rest {
            cmd.arg(*arg);
        }
        let mut conn = self.conn.clone();
        cmd.query_async::<_, redis::Value>(&mut conn)
            .await
            .map(|v| format!("{v:?}"))
            .map_err(|e| classify(&e))
    }
}
