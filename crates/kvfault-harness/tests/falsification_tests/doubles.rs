//! Test doubles shared by the falsification categories.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kvfault_client::{MemoryBackend, OperationPolicy, ProxyConnection};
use kvfault_core::{NodeIdentity, NodeState, RunConfig, TestKey, TestKeySet};
use kvfault_platform::{ControlError, NodeController};
use parking_lot::Mutex;

/// Controller that records every request and optionally fails them.
///
/// When `backend` is set, stopping the node takes the backend offline and
/// starting it brings it back.
pub struct RecordingController {
    pub requests: Mutex<Vec<(u8, NodeState)>>,
    pub fail: bool,
    pub backend: Option<MemoryBackend>,
}

impl RecordingController {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: false,
            backend: None,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: true,
            backend: None,
        })
    }

    pub fn driving(backend: &MemoryBackend) -> Arc<Self> {
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            fail: false,
            backend: Some(backend.clone()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl NodeController for RecordingController {
    fn describe(&self) -> String {
        "recording controller".into()
    }

    async fn set_node_state(
        &self,
        node: &NodeIdentity,
        desired: NodeState,
    ) -> kvfault_platform::Result<()> {
        self.requests.lock().push((node.index, desired));
        if self.fail {
            return Err(ControlError::unsupported("controller double always fails"));
        }
        if let Some(backend) = &self.backend {
            backend.set_available(desired == NodeState::Running);
        }
        Ok(())
    }
}

pub fn connection(backend: &MemoryBackend) -> ProxyConnection<MemoryBackend> {
    ProxyConnection::new(backend.clone(), OperationPolicy::default())
}

/// Short phases so paused-clock runs stay cheap.
pub fn short_run() -> RunConfig {
    RunConfig {
        keys: 100,
        baseline: Duration::from_secs(10),
        failure: Duration::from_secs(10),
        recovery: Duration::from_secs(10),
        pause: Duration::from_millis(10),
        seed: Some(2024),
        ..RunConfig::default()
    }
}

pub async fn populated(backend: &MemoryBackend, n: usize) -> Arc<TestKeySet> {
    let mut keys = TestKeySet::new();
    for i in 1..=n {
        let key = TestKey::new(format!("failure:test:key:{i}"), format!("test-value-{i}"));
        assert!(connection(backend).set(&key.key, &key.value).await);
        keys.push(key);
    }
    Arc::new(keys)
}
