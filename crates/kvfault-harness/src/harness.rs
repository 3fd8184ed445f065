//! Failover run orchestration.
//!
//! # Phases
//!
//! ```text
//! Setup → Baseline → Injecting → DuringFailure → Recovering → PostRecovery → Done
//! ```
//!
//! Phases run strictly in order and never overlap: every load phase joins
//! all its workers before the next phase starts. A failed stop/start is
//! recorded as a control event and the run continues. Only configuration
//! errors and broken harness invariants abort a run, and an aborted run
//! still returns everything measured so far.

use std::sync::Arc;
use std::time::Duration;

use kvfault_client::{KvBackend, ProxyConnection, RedisBackend};
use kvfault_core::{
    ControlAction, ControlEvent, NodeIdentity, Phase, PhaseResult, RunConfig, TestKey,
    TestKeySet, TestReport, Topology,
};
use kvfault_platform::NodeController;
use tokio::time::Instant;

use crate::error::RunAborted;
use crate::load::{LoadGenerator, LoadProfile, OpMix};
use crate::verify::DataVerifier;

/// Checkpoint names, in the order they are taken.
pub const CHECKPOINTS: [&str; 3] = ["initial", "during-failure", "final"];

/// Drives one failover run against a proxy and a node controller.
pub struct FailureOrchestrator<B = RedisBackend> {
    conn: ProxyConnection<B>,
    controller: Arc<dyn NodeController>,
    run: RunConfig,
    topology: Topology,
    mix: OpMix,
}

impl<B> std::fmt::Debug for FailureOrchestrator<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureOrchestrator")
            .field("controller", &self.controller.describe())
            .field("node", &self.run.node)
            .field("node_type", &self.run.node_type)
            .finish_non_exhaustive()
    }
}

impl<B: KvBackend> FailureOrchestrator<B> {
    /// Creates an orchestrator with the default topology and a uniform
    /// read/write mix.
    #[must_use]
    pub fn new(
        conn: ProxyConnection<B>,
        controller: Arc<dyn NodeController>,
        run: RunConfig,
    ) -> Self {
        Self {
            conn,
            controller,
            run,
            topology: Topology::default(),
            mix: OpMix::default(),
        }
    }

    /// Set the node topology used to validate the target.
    #[must_use]
    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    /// Set the operation mix for every load phase.
    #[must_use]
    pub fn with_mix(mut self, mix: OpMix) -> Self {
        self.mix = mix;
        self
    }

    /// Executes every phase and returns the full report.
    ///
    /// # Errors
    /// Returns [`RunAborted`] with the partial report if the target node is
    /// invalid (before anything is written or any node touched) or if a
    /// load worker or verification read fails.
    pub async fn run(&self) -> Result<TestReport, RunAborted> {
        let mut report = TestReport::default();

        let target = match self.preflight() {
            Ok(target) => target,
            Err(e) => return Err(RunAborted::new(Phase::Setup, e, report)),
        };
        report.target = Some(target);
        tracing::info!(
            node = %target,
            controller = %self.controller.describe(),
            "starting failover run"
        );

        let keys = Arc::new(self.setup(&mut report).await);
        let loader = LoadGenerator::new(self.conn.clone());
        let verifier =
            DataVerifier::new(self.conn.clone()).with_concurrency(self.run.verify_concurrency);

        enter(&mut report, Phase::Baseline);
        let checkpoint = verifier
            .verify(CHECKPOINTS[0], &keys)
            .await
            .map_err(|e| abort(Phase::Baseline, e, &report))?;
        report.checkpoints.push(checkpoint);
        let baseline = self
            .load(&loader, Phase::Baseline, self.run.baseline, &keys)
            .await
            .map_err(|e| abort(Phase::Baseline, e, &report))?;
        report.phases.push(baseline);

        enter(&mut report, Phase::Injecting);
        let injected = self
            .control(ControlAction::Stop, &target, self.run.stop_settle)
            .await;
        report.phases.push(injected.result);
        report.control.push(injected.event);

        enter(&mut report, Phase::DuringFailure);
        let during = self
            .load(&loader, Phase::DuringFailure, self.run.failure, &keys)
            .await
            .map_err(|e| abort(Phase::DuringFailure, e, &report))?;
        report.phases.push(during);
        let checkpoint = verifier
            .verify(CHECKPOINTS[1], &keys)
            .await
            .map_err(|e| abort(Phase::DuringFailure, e, &report))?;
        report.checkpoints.push(checkpoint);

        enter(&mut report, Phase::Recovering);
        let recovered = self
            .control(ControlAction::Start, &target, self.run.start_settle)
            .await;
        report.phases.push(recovered.result);
        report.control.push(recovered.event);

        enter(&mut report, Phase::PostRecovery);
        let post = self
            .load(&loader, Phase::PostRecovery, self.run.recovery, &keys)
            .await
            .map_err(|e| abort(Phase::PostRecovery, e, &report))?;
        report.phases.push(post);
        let checkpoint = verifier
            .verify(CHECKPOINTS[2], &keys)
            .await
            .map_err(|e| abort(Phase::PostRecovery, e, &report))?;
        report.checkpoints.push(checkpoint);

        enter(&mut report, Phase::Done);
        Ok(report)
    }

    /// Validates the run and resolves the target before any side effect.
    fn preflight(&self) -> kvfault_core::Result<NodeIdentity> {
        self.run.validate()?;
        self.topology.validate()?;
        self.topology.select(self.run.node, self.run.node_type)
    }

    /// Writes the test key set. Failed writes are excluded from the set.
    async fn setup(&self, report: &mut TestReport) -> TestKeySet {
        enter(report, Phase::Setup);
        let started = Instant::now();
        let mut keys = TestKeySet::new();
        let mut failed = 0u64;

        for i in 1..=self.run.keys {
            let key = TestKey::new(
                format!("{}:key:{i}", self.run.key_prefix),
                format!("test-value-{i}"),
            );
            if self.conn.set(&key.key, &key.value).await {
                keys.push(key);
            } else {
                failed += 1;
            }
        }

        report.keys_attempted = self.run.keys;
        report.keys_written = keys.len();
        report.phases.push(PhaseResult::new(
            Phase::Setup.as_str(),
            keys.len() as u64,
            failed,
            started.elapsed(),
        ));
        tracing::info!(
            written = keys.len(),
            attempted = self.run.keys,
            "test keys written"
        );
        keys
    }

    async fn load(
        &self,
        loader: &LoadGenerator<B>,
        phase: Phase,
        duration: Duration,
        keys: &Arc<TestKeySet>,
    ) -> kvfault_core::Result<PhaseResult> {
        let profile = LoadProfile::from_run(&self.run, duration).with_mix(self.mix.clone());
        loader.run(phase.as_str(), &profile, keys).await
    }

    /// Issues one control action, waits the settle delay, then observes the
    /// node. A failed action is recorded, never raised.
    async fn control(
        &self,
        action: ControlAction,
        target: &NodeIdentity,
        settle: Duration,
    ) -> ControlOutcome {
        let phase = match action {
            ControlAction::Stop => Phase::Injecting,
            ControlAction::Start => Phase::Recovering,
        };
        let started = Instant::now();

        let outcome = self
            .controller
            .set_node_state(target, action.desired_state())
            .await;
        let mut event = ControlEvent {
            action,
            node: *target,
            ok: outcome.is_ok(),
            detail: None,
            observed: None,
        };
        match outcome {
            Ok(()) => tracing::info!(node = target.index, %action, "node control succeeded"),
            Err(e) => {
                tracing::error!(
                    node = target.index,
                    %action,
                    error = %e,
                    "node control failed, continuing"
                );
                event.detail = Some(e.to_string());
            }
        }

        tracing::info!(settle = ?settle, "waiting for the proxy to notice");
        tokio::time::sleep(settle).await;

        match self.controller.observe(target).await {
            Ok(observed) => {
                if let Some(state) = &observed {
                    tracing::info!(node = target.index, state = %state, "observed node state");
                }
                event.observed = observed;
            }
            Err(e) => tracing::debug!(node = target.index, error = %e, "could not observe node"),
        }

        let (successes, errors) = if event.ok { (1, 0) } else { (0, 1) };
        ControlOutcome {
            result: PhaseResult::new(phase.as_str(), successes, errors, started.elapsed()),
            event,
        }
    }
}

struct ControlOutcome {
    result: PhaseResult,
    event: ControlEvent,
}

fn enter(report: &mut TestReport, phase: Phase) {
    tracing::info!(phase = %phase, "entering phase");
    report.reached = Some(phase);
}

fn abort(phase: Phase, source: kvfault_core::HarnessError, report: &TestReport) -> RunAborted {
    tracing::error!(phase = %phase, error = %source, "run aborted");
    RunAborted::new(phase, source, report.clone())
}
