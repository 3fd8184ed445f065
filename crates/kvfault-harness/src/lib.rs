// Allow unwrap/expect in tests for clear failure messages
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

//! # kvfault-harness
//!
//! Failover testing for caching key-value proxies.
//!
//! This crate provides:
//! - **Load generation**: bounded worker pools with an injectable
//!   operation mix
//! - **Data verification**: how many test keys are still readable
//! - **Failover orchestration**: baseline, node stop, sustained load,
//!   node start, recovery, each measured separately
//! - **Client probe**: smoke checks for basic traffic and error replies
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use kvfault_client::ProxyConnection;
//! use kvfault_harness::FailureOrchestrator;
//! use kvfault_platform::ContainerController;
//!
//! let conn = ProxyConnection::connect(&config.proxy).await?;
//! let orchestrator =
//!     FailureOrchestrator::new(conn, Arc::new(ContainerController::new()), config.run);
//! let report = orchestrator.run().await?;
//! println!("{report}");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod harness;
pub mod load;
pub mod probe;
pub mod verify;

pub use error::RunAborted;
pub use harness::{CHECKPOINTS, FailureOrchestrator};
pub use load::{KeySpace, LoadGenerator, LoadProfile, OpKind, OpMix};
pub use probe::{ClientProbe, ErrorCheck, ProbeReport};
pub use verify::DataVerifier;
