// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # kvfault-core
//!
//! Shared vocabulary for the kvfault resilience harness.
//!
//! - [`Topology`] and [`NodeIdentity`]: the static master/replica mapping
//!   used to validate fault-injection targets
//! - [`TestKeySet`]: keys written during setup and re-read afterwards
//! - [`PhaseResult`], [`Checkpoint`], [`ControlEvent`], [`TestReport`]:
//!   everything a run measures
//! - [`HarnessConfig`]: TOML-loadable configuration, validated at load time
//! - [`HarnessError`]: the errors that are allowed to end a run

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod types;

pub use config::{ControlConfig, HarnessConfig, ProbeConfig, ProxyConfig, RunConfig};
pub use error::{HarnessError, Result};
pub use types::{
    Checkpoint, ControlAction, ControlEvent, NodeIdentity, NodeRole, NodeState, Phase,
    PhaseResult, RoleFilter, TestKey, TestKeySet, TestReport, Topology, WorkerTally,
};
