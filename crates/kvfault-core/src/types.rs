//! Core types for failover test runs.
//!
//! Explicit state machine for phases, no implicit transitions. Results are
//! plain data: once a [`PhaseResult`] or [`Checkpoint`] is produced it is
//! never modified.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Role of a backend node in the replicated cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Accepts writes.
    Master,
    /// Replicates from a master.
    #[serde(alias = "slave")]
    Replica,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => f.write_str("master"),
            Self::Replica => f.write_str("replica"),
        }
    }
}

/// Which kind of node a failure test is allowed to target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleFilter {
    /// Only master nodes.
    Master,
    /// Only replica nodes.
    #[serde(alias = "slave")]
    Replica,
    /// Any node.
    #[default]
    Any,
}

impl RoleFilter {
    /// Returns true if a node with `role` satisfies this filter.
    #[must_use]
    pub const fn admits(self, role: NodeRole) -> bool {
        matches!(
            (self, role),
            (Self::Any, _) | (Self::Master, NodeRole::Master) | (Self::Replica, NodeRole::Replica)
        )
    }
}

impl FromStr for RoleFilter {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "master" => Ok(Self::Master),
            "slave" | "replica" => Ok(Self::Replica),
            "any" => Ok(Self::Any),
            other => Err(HarnessError::config(format!(
                "unknown node type '{other}' (expected master, slave, or any)"
            ))),
        }
    }
}

impl fmt::Display for RoleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Master => f.write_str("master"),
            Self::Replica => f.write_str("replica"),
            Self::Any => f.write_str("any"),
        }
    }
}

/// A backend node: its 1-based index and its role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeIdentity {
    /// 1-based node index.
    pub index: u8,
    /// Master or replica.
    pub role: NodeRole,
}

impl NodeIdentity {
    /// Creates a master node identity.
    #[must_use]
    pub const fn master(index: u8) -> Self {
        Self {
            index,
            role: NodeRole::Master,
        }
    }

    /// Creates a replica node identity.
    #[must_use]
    pub const fn replica(index: u8) -> Self {
        Self {
            index,
            role: NodeRole::Replica,
        }
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.index, self.role)
    }
}

/// Static mapping of node indices to roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topology {
    nodes: Vec<NodeIdentity>,
}

impl Default for Topology {
    /// Two masters (1, 2) and two replicas (3, 4).
    fn default() -> Self {
        Self {
            nodes: vec![
                NodeIdentity::master(1),
                NodeIdentity::master(2),
                NodeIdentity::replica(3),
                NodeIdentity::replica(4),
            ],
        }
    }
}

impl Topology {
    /// Creates a topology from an explicit node list.
    #[must_use]
    pub const fn new(nodes: Vec<NodeIdentity>) -> Self {
        Self { nodes }
    }

    /// Looks up a node by index.
    #[must_use]
    pub fn node(&self, index: u8) -> Option<NodeIdentity> {
        self.nodes.iter().copied().find(|n| n.index == index)
    }

    /// Resolves a fault-injection target, rejecting indices outside the
    /// topology and nodes whose role the filter does not admit.
    ///
    /// # Errors
    /// Returns a configuration error for an invalid node/role combination.
    pub fn select(&self, index: u8, filter: RoleFilter) -> Result<NodeIdentity> {
        let Some(node) = self.node(index) else {
            return Err(HarnessError::config(format!(
                "node {index} is not part of the topology (valid nodes: {})",
                join_indices(self.nodes.iter())
            )));
        };

        if !filter.admits(node.role) {
            let matching = self.nodes.iter().filter(|n| filter.admits(n.role));
            return Err(HarnessError::config(format!(
                "node {index} is a {}; select one of nodes {} for a {filter} failure test",
                node.role,
                join_indices(matching)
            )));
        }

        Ok(node)
    }

    /// Checks the topology itself: non-empty, unique indices.
    ///
    /// # Errors
    /// Returns a configuration error if the topology is malformed.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(HarnessError::config("topology must contain at least one node"));
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if self.nodes[..i].iter().any(|n| n.index == node.index) {
                return Err(HarnessError::config(format!(
                    "node {} appears twice in the topology",
                    node.index
                )));
            }
        }
        Ok(())
    }
}

fn join_indices<'a>(nodes: impl Iterator<Item = &'a NodeIdentity>) -> String {
    nodes
        .map(|n| n.index.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Desired (or observed) lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    /// Node process/container is running.
    Running,
    /// Node process/container is stopped.
    Stopped,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => f.write_str("running"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// A key written during setup, with the value it was written with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestKey {
    /// Key name.
    pub key: String,
    /// Value written at setup.
    pub value: String,
}

impl TestKey {
    /// Creates a test key.
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Ordered, append-only set of keys that were successfully written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestKeySet {
    keys: Vec<TestKey>,
}

impl TestKeySet {
    /// Creates an empty key set.
    #[must_use]
    pub const fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Appends a key. The only mutation a key set supports.
    pub fn push(&mut self, key: TestKey) {
        self.keys.push(key);
    }

    /// Number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if no keys were written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in insertion order.
    #[must_use]
    pub fn as_slice(&self) -> &[TestKey] {
        &self.keys
    }

    /// Iterates keys in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, TestKey> {
        self.keys.iter()
    }
}

impl FromIterator<TestKey> for TestKeySet {
    fn from_iter<I: IntoIterator<Item = TestKey>>(iter: I) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// Phases of a failover run.
///
/// ```text
/// Setup → Baseline → Injecting → DuringFailure → Recovering → PostRecovery → Done
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    /// Write the test key set.
    Setup,
    /// Initial verification and normal-condition load.
    Baseline,
    /// Stop the target node and wait for the settle delay.
    Injecting,
    /// Sustained load while the node is down, then verification.
    DuringFailure,
    /// Start the target node and wait for the settle delay.
    Recovering,
    /// Load after recovery, then final verification.
    PostRecovery,
    /// Report assembled.
    Done,
}

impl Phase {
    /// The phase that follows this one, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Setup => Some(Self::Baseline),
            Self::Baseline => Some(Self::Injecting),
            Self::Injecting => Some(Self::DuringFailure),
            Self::DuringFailure => Some(Self::Recovering),
            Self::Recovering => Some(Self::PostRecovery),
            Self::PostRecovery => Some(Self::Done),
            Self::Done => None,
        }
    }

    /// Stable phase name used in reports and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Baseline => "baseline",
            Self::Injecting => "injecting",
            Self::DuringFailure => "during-failure",
            Self::Recovering => "recovering",
            Self::PostRecovery => "post-recovery",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success and error counts of one load worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerTally {
    /// Worker number within its phase.
    pub worker: usize,
    /// Operations that succeeded.
    pub successes: u64,
    /// Operations that failed.
    pub errors: u64,
}

impl WorkerTally {
    /// Creates an empty tally for a worker.
    #[must_use]
    pub const fn new(worker: usize) -> Self {
        Self {
            worker,
            successes: 0,
            errors: 0,
        }
    }

    /// Records one operation outcome.
    pub fn record(&mut self, ok: bool) {
        if ok {
            self.successes += 1;
        } else {
            self.errors += 1;
        }
    }

    /// Total operations performed by this worker.
    #[must_use]
    pub const fn operations(&self) -> u64 {
        self.successes + self.errors
    }
}

/// Outcome of a single phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseResult {
    /// Phase name.
    pub phase: String,
    /// Total operations (successes + errors).
    pub operations: u64,
    /// Successful operations.
    pub successes: u64,
    /// Failed operations.
    pub errors: u64,
    /// Wall-clock time the phase took.
    pub elapsed: Duration,
    /// Per-worker breakdown, empty for phases without load workers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workers: Vec<WorkerTally>,
}

impl PhaseResult {
    /// Builds a result from counts gathered outside a worker pool.
    #[must_use]
    pub fn new(phase: impl Into<String>, successes: u64, errors: u64, elapsed: Duration) -> Self {
        Self {
            phase: phase.into(),
            operations: successes + errors,
            successes,
            errors,
            elapsed,
            workers: Vec::new(),
        }
    }

    /// Merges joined worker tallies into a phase result. Totals are exactly
    /// the sum of the per-worker counts.
    #[must_use]
    pub fn from_workers(
        phase: impl Into<String>,
        mut workers: Vec<WorkerTally>,
        elapsed: Duration,
    ) -> Self {
        workers.sort_by_key(|w| w.worker);
        let successes = workers.iter().map(|w| w.successes).sum();
        let errors = workers.iter().map(|w| w.errors).sum();
        Self {
            phase: phase.into(),
            operations: successes + errors,
            successes,
            errors,
            elapsed,
            workers,
        }
    }

    /// Fraction of operations that failed (0.0 when nothing ran).
    #[must_use]
    pub fn error_rate(&self) -> f64 {
        if self.operations == 0 {
            0.0
        } else {
            self.errors as f64 / self.operations as f64
        }
    }
}

/// A verification checkpoint: how many test keys were still readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Checkpoint name (e.g. "initial", "during-failure", "final").
    pub name: String,
    /// Keys that returned a value.
    pub verified: usize,
    /// Keys checked.
    pub total: usize,
}

impl Checkpoint {
    /// Creates a checkpoint. `verified` is clamped to `total`.
    #[must_use]
    pub fn new(name: impl Into<String>, verified: usize, total: usize) -> Self {
        Self {
            name: name.into(),
            verified: verified.min(total),
            total,
        }
    }

    /// Verified fraction in `[0, 1]`. An empty key set counts as fully
    /// available.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.verified as f64 / self.total as f64
        }
    }
}

/// Node control action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    /// Stop the node.
    Stop,
    /// Start the node.
    Start,
}

impl ControlAction {
    /// The node state this action asks for.
    #[must_use]
    pub const fn desired_state(self) -> NodeState {
        match self {
            Self::Stop => NodeState::Stopped,
            Self::Start => NodeState::Running,
        }
    }
}

impl fmt::Display for ControlAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => f.write_str("stop"),
            Self::Start => f.write_str("start"),
        }
    }
}

/// Record of one node control action. Failures are recorded, not raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEvent {
    /// What was attempted.
    pub action: ControlAction,
    /// Target node.
    pub node: NodeIdentity,
    /// Whether the control mechanism reported success.
    pub ok: bool,
    /// Error detail when `ok` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Node state observed after the settle delay, when the controller can
    /// report one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed: Option<String>,
}

/// Everything a run measured, in the order it was measured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestReport {
    /// Node chosen for fault injection (absent if validation failed).
    pub target: Option<NodeIdentity>,
    /// Keys attempted during setup.
    pub keys_attempted: usize,
    /// Keys successfully written during setup.
    pub keys_written: usize,
    /// One result per completed phase.
    pub phases: Vec<PhaseResult>,
    /// Verification checkpoints.
    pub checkpoints: Vec<Checkpoint>,
    /// Node control actions.
    pub control: Vec<ControlEvent>,
    /// Last phase reached. `Done` for a complete run.
    pub reached: Option<Phase>,
}

impl TestReport {
    /// Looks up a phase result by name.
    #[must_use]
    pub fn phase(&self, phase: Phase) -> Option<&PhaseResult> {
        self.phases.iter().find(|p| p.phase == phase.as_str())
    }

    /// Looks up a checkpoint by name.
    #[must_use]
    pub fn checkpoint(&self, name: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|c| c.name == name)
    }

    /// Returns true if the run reached `Done`.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.reached == Some(Phase::Done)
    }

    /// Serializes the report as pretty-printed JSON.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for TestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Failure Test Summary ===")?;
        match self.target {
            Some(node) => writeln!(f, "Target node:   {node}")?,
            None => writeln!(f, "Target node:   (not selected)")?,
        }
        writeln!(
            f,
            "Test keys:     {}/{} written",
            self.keys_written, self.keys_attempted
        )?;

        if !self.phases.is_empty() {
            writeln!(f, "Phases:")?;
            for p in &self.phases {
                writeln!(
                    f,
                    "  {:<16} {:>7} ops {:>7} successful {:>6} errors ({:>5.1}%) {:>8.1}s",
                    p.phase,
                    p.operations,
                    p.successes,
                    p.errors,
                    p.error_rate() * 100.0,
                    p.elapsed.as_secs_f64()
                )?;
            }
        }

        if !self.checkpoints.is_empty() {
            writeln!(f, "Data verification:")?;
            for c in &self.checkpoints {
                writeln!(
                    f,
                    "  {:<16} {}/{} keys ({:.1}%)",
                    c.name,
                    c.verified,
                    c.total,
                    c.ratio() * 100.0
                )?;
            }
        }

        if !self.control.is_empty() {
            writeln!(f, "Node control:")?;
            for e in &self.control {
                let outcome = if e.ok { "ok" } else { "FAILED" };
                write!(f, "  {} node {:<8} {outcome}", e.action, e.node.index)?;
                if let Some(detail) = &e.detail {
                    write!(f, " ({detail})")?;
                }
                if let Some(observed) = &e.observed {
                    write!(f, " [observed: {observed}]")?;
                }
                writeln!(f)?;
            }
        }

        match self.reached {
            Some(Phase::Done) => writeln!(f, "Result:        completed"),
            Some(phase) => writeln!(f, "Result:        aborted during {phase}"),
            None => writeln!(f, "Result:        aborted before setup"),
        }
    }
}
