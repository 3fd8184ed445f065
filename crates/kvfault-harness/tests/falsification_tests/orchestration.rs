//! Falsification Tests: Category A - Orchestration (F001-F010)

use kvfault_client::MemoryBackend;
use kvfault_core::{HarnessError, NodeState, Phase, RoleFilter, RunConfig, Topology};
use kvfault_harness::{CHECKPOINTS, FailureOrchestrator};

use super::doubles::{RecordingController, connection, short_run};

/// F001: A failing stop does not block load during the failure window
///
/// # Falsification Attempt
/// Every control action fails; if DuringFailure is missing or empty, the
/// claim is falsified.
#[tokio::test(start_paused = true)]
async fn f001_failed_stop_still_runs_during_failure_load() {
    let backend = MemoryBackend::new();
    let controller = RecordingController::failing();
    let report = FailureOrchestrator::new(connection(&backend), controller.clone(), short_run())
        .run()
        .await
        .expect("control failures are not fatal");

    let during = report
        .phase(Phase::DuringFailure)
        .expect("F001 FALSIFIED: no during-failure phase");
    assert!(
        during.operations > 0,
        "F001 FALSIFIED: during-failure phase issued no operations"
    );
    assert!(report.is_complete());
    assert_eq!(controller.request_count(), 2);
    assert!(report.control.iter().all(|e| !e.ok && e.detail.is_some()));
}

/// F002: An invalid node/role request aborts before any side effect
///
/// # Falsification Attempt
/// Request a master failure on node 4 (a replica); any set or stop call
/// falsifies the claim.
#[tokio::test(start_paused = true)]
async fn f002_master_failure_on_replica_is_configuration_error() {
    let backend = MemoryBackend::new();
    let controller = RecordingController::succeeding();
    let run = RunConfig {
        node: 4,
        node_type: RoleFilter::Master,
        ..short_run()
    };

    let aborted = FailureOrchestrator::new(connection(&backend), controller.clone(), run)
        .run()
        .await
        .expect_err("F002 FALSIFIED: run accepted node 4 as a master");

    assert!(matches!(aborted.source, HarnessError::Configuration(_)));
    assert_eq!(backend.calls().set, 0, "F002 FALSIFIED: keys were written");
    assert_eq!(backend.calls().total(), 0);
    assert_eq!(controller.request_count(), 0, "F002 FALSIFIED: node was touched");
}

/// F003: A node outside the topology is rejected the same way
#[tokio::test(start_paused = true)]
async fn f003_unknown_node_is_configuration_error() {
    let backend = MemoryBackend::new();
    let controller = RecordingController::succeeding();
    let run = RunConfig {
        node: 9,
        ..short_run()
    };
    let aborted = FailureOrchestrator::new(connection(&backend), controller.clone(), run)
        .run()
        .await
        .unwrap_err();
    assert!(aborted.source.is_preflight());
    assert_eq!(controller.request_count(), 0);
}

/// F004: Phases appear once each, strictly in order
#[tokio::test(start_paused = true)]
async fn f004_phases_strictly_sequential() {
    let backend = MemoryBackend::new();
    let report = FailureOrchestrator::new(
        connection(&backend),
        RecordingController::driving(&backend),
        short_run(),
    )
    .run()
    .await
    .unwrap();

    let expected: Vec<&str> = std::iter::successors(Some(Phase::Setup), |p| p.next())
        .take_while(|p| *p != Phase::Done)
        .map(Phase::as_str)
        .collect();
    let actual: Vec<&str> = report.phases.iter().map(|p| p.phase.as_str()).collect();
    assert_eq!(actual, expected, "F004 FALSIFIED: phase order {actual:?}");

    let checkpoints: Vec<&str> = report.checkpoints.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(checkpoints, CHECKPOINTS);
}

/// F005: Setup of 100 keys against a healthy backend writes all of them
#[tokio::test(start_paused = true)]
async fn f005_setup_writes_every_key() {
    let backend = MemoryBackend::new();
    let report = FailureOrchestrator::new(
        connection(&backend),
        RecordingController::succeeding(),
        short_run(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(report.keys_written, 100);
    let setup = report.phase(Phase::Setup).unwrap();
    assert_eq!((setup.successes, setup.errors), (100, 0));
    let initial = report.checkpoint("initial").unwrap();
    assert_eq!((initial.verified, initial.total), (100, 100));
    assert_eq!(backend.peek("failure:test:key:100"), Some("test-value-100".to_string()));
}

/// F006: Outage is visible in the during-failure checkpoint and recovery
/// restores availability
#[tokio::test(start_paused = true)]
async fn f006_outage_and_recovery_measured() {
    let backend = MemoryBackend::new();
    let controller = RecordingController::driving(&backend);
    let report = FailureOrchestrator::new(connection(&backend), controller.clone(), short_run())
        .run()
        .await
        .unwrap();

    assert_eq!(report.checkpoint("during-failure").unwrap().ratio(), 0.0);
    assert_eq!(report.checkpoint("final").unwrap().ratio(), 1.0);
    assert_eq!(report.phase(Phase::DuringFailure).unwrap().successes, 0);
    assert_eq!(report.phase(Phase::PostRecovery).unwrap().errors, 0);
    assert_eq!(
        *controller.requests.lock(),
        vec![(3, NodeState::Stopped), (3, NodeState::Running)]
    );
}

/// F007: A custom topology changes which nodes may be targeted
#[tokio::test(start_paused = true)]
async fn f007_custom_topology_honored() {
    let backend = MemoryBackend::new();
    let topology = Topology::new(vec![
        kvfault_core::NodeIdentity::master(1),
        kvfault_core::NodeIdentity::master(4),
    ]);
    let run = RunConfig {
        node: 4,
        node_type: RoleFilter::Master,
        ..short_run()
    };
    let report = FailureOrchestrator::new(
        connection(&backend),
        RecordingController::succeeding(),
        run,
    )
    .with_topology(topology)
    .run()
    .await
    .expect("node 4 is a master in this topology");
    assert_eq!(report.target.map(|n| n.index), Some(4));
}

/// F008: The report survives JSON serialization with phase names intact
#[tokio::test(start_paused = true)]
async fn f008_report_serializes() {
    let backend = MemoryBackend::new();
    let report = FailureOrchestrator::new(
        connection(&backend),
        RecordingController::succeeding(),
        short_run(),
    )
    .run()
    .await
    .unwrap();

    let json = report.to_json().unwrap();
    assert!(json.contains("\"during-failure\""));
    assert!(json.contains("\"reached\": \"done\""));
}
