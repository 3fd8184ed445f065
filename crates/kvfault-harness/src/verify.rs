//! Data availability checks.
//!
//! Re-reads the test key set and counts how many keys still return a value.
//! Any non-absent value counts: stale or replica-served values are not
//! distinguished from fresh ones.

use std::sync::Arc;

use kvfault_client::{KvBackend, ProxyConnection, RedisBackend};
use kvfault_core::{Checkpoint, HarnessError, Result, TestKeySet};
use tokio::task::JoinSet;

/// Reads every test key and reports the fraction still retrievable.
#[derive(Debug, Clone)]
pub struct DataVerifier<B = RedisBackend> {
    conn: ProxyConnection<B>,
    concurrency: usize,
}

impl<B: KvBackend> DataVerifier<B> {
    /// Creates a sequential verifier.
    #[must_use]
    pub const fn new(conn: ProxyConnection<B>) -> Self {
        Self {
            conn,
            concurrency: 1,
        }
    }

    /// Allow up to `concurrency` reads in flight (at least 1).
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Verifies `keys`, recording the result under `name`.
    ///
    /// Read-only: never writes and never modifies the key set.
    ///
    /// # Errors
    /// Returns an internal error if a read task panicked.
    pub async fn verify(&self, name: &str, keys: &Arc<TestKeySet>) -> Result<Checkpoint> {
        let total = keys.len();
        let verified = if self.concurrency <= 1 {
            self.verify_sequential(keys).await
        } else {
            self.verify_concurrent(keys).await?
        };

        let checkpoint = Checkpoint::new(name, verified, total);
        tracing::info!(
            checkpoint = name,
            verified = checkpoint.verified,
            total,
            ratio = checkpoint.ratio(),
            "verified test keys"
        );
        Ok(checkpoint)
    }

    async fn verify_sequential(&self, keys: &TestKeySet) -> usize {
        let mut verified = 0;
        for key in keys.iter() {
            if self.conn.get(&key.key).await.is_some() {
                verified += 1;
            }
        }
        verified
    }

    async fn verify_concurrent(&self, keys: &Arc<TestKeySet>) -> Result<usize> {
        let mut verified = 0;
        let mut tasks = JoinSet::new();
        let mut next = 0;

        loop {
            while tasks.len() < self.concurrency && next < keys.len() {
                let conn = self.conn.clone();
                let keys = Arc::clone(keys);
                let index = next;
                tasks.spawn(async move {
                    let key = &keys.as_slice()[index].key;
                    conn.get(key).await.is_some()
                });
                next += 1;
            }

            match tasks.join_next().await {
                Some(Ok(true)) => verified += 1,
                Some(Ok(false)) => {}
                Some(Err(e)) => {
                    return Err(HarnessError::internal(format!(
                        "verification read task failed: {e}"
                    )));
                }
                None => break,
            }
        }
        Ok(verified)
    }
}
