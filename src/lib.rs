//! kvfault: node-failure resilience harness for caching key-value proxies.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use kvfault::prelude::*;
//!
//! // Re-exports from sub-crates for convenience
//! ```

pub use kvfault_client as client;
pub use kvfault_core as core;
pub use kvfault_harness as harness;
pub use kvfault_platform as platform;

/// Prelude module for common imports.
pub mod prelude {
    pub use kvfault_client::{KvBackend, OperationPolicy, ProxyConnection};
    pub use kvfault_core::{
        Checkpoint, HarnessConfig, HarnessError, NodeIdentity, NodeRole, Phase, PhaseResult,
        RoleFilter, TestReport, Topology,
    };
    pub use kvfault_harness::{
        ClientProbe, DataVerifier, FailureOrchestrator, LoadGenerator, LoadProfile, OpMix,
        RunAborted,
    };
    pub use kvfault_platform::{ContainerController, NodeController, ScriptController};
}
