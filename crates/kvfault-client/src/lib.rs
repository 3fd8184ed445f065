// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # kvfault-client
//!
//! The key-value side of the harness.
//!
//! - [`KvBackend`]: raw get/set/delete against the proxy, errors surfaced
//! - [`RedisBackend`]: RESP client over a multiplexed tokio connection
//! - [`MemoryBackend`]: in-process backend with an outage switch and call
//!   counters, for exercising the harness without a proxy
//! - [`ProxyConnection`]: bounded timeouts, retry-on-timeout, and the
//!   swallow-and-report policy: operations return `bool`/`Option` and log
//!   the cause instead of raising

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod connection;
pub mod error;
pub mod memory;
pub mod redis_backend;

pub use backend::KvBackend;
pub use connection::{OperationPolicy, ProxyConnection};
pub use error::OperationError;
pub use memory::{CallCounts, MemoryBackend};
pub use redis_backend::RedisBackend;
