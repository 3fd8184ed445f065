//! Falsification Tests: Category B - Load Generation (F011-F020)

use std::time::Duration;

use kvfault_client::MemoryBackend;
use kvfault_core::{Phase, WorkerTally};
use kvfault_harness::{FailureOrchestrator, LoadGenerator, LoadProfile, OpMix};
use proptest::prelude::*;

use super::doubles::{RecordingController, connection, populated, short_run};

/// F011: Phase operation counts equal the sum of worker counts
///
/// # Falsification Attempt
/// Run a full failover with four workers; any phase whose total differs
/// from its workers' sum falsifies the claim.
#[tokio::test(start_paused = true)]
async fn f011_phase_total_equals_worker_sum() {
    let backend = MemoryBackend::new();
    let run = kvfault_core::RunConfig {
        workers: 4,
        ..short_run()
    };
    let report = FailureOrchestrator::new(
        connection(&backend),
        RecordingController::driving(&backend),
        run,
    )
    .run()
    .await
    .unwrap();

    for phase in [Phase::Baseline, Phase::DuringFailure, Phase::PostRecovery] {
        let result = report.phase(phase).unwrap();
        let sum: u64 = result.workers.iter().map(WorkerTally::operations).sum();
        assert_eq!(
            result.operations, sum,
            "F011 FALSIFIED: {phase} reports {} ops but workers did {sum}",
            result.operations
        );
        assert_eq!(result.workers.len(), 4);
    }
}

/// F012: 10s with one worker and a 10ms pause yields about 1000 operations
#[tokio::test(start_paused = true)]
async fn f012_baseline_rate_matches_pause() {
    let backend = MemoryBackend::new();
    let keys = populated(&backend, 100).await;
    let profile = LoadProfile::new(Duration::from_secs(10), 1).with_pause(Duration::from_millis(10));

    let result = LoadGenerator::new(connection(&backend))
        .run("baseline", &profile, &keys)
        .await
        .unwrap();

    assert!(
        (950..=1000).contains(&result.operations),
        "F012 FALSIFIED: {} operations",
        result.operations
    );
    assert!(result.elapsed >= Duration::from_secs(10));
}

/// F013: No operation lands after the phase deadline
///
/// # Falsification Attempt
/// Slow backend, tiny pause: if the phase ends later than one pause after the
/// deadline, workers outlived their window.
#[tokio::test(start_paused = true)]
async fn f013_workers_stop_at_deadline() {
    let backend = MemoryBackend::new().with_latency(Duration::from_millis(70));
    let keys = populated(&backend, 10).await;
    let profile = LoadProfile::new(Duration::from_secs(1), 3)
        .with_pause(Duration::from_millis(1))
        .with_mix(OpMix::read_only());

    let result = LoadGenerator::new(connection(&backend))
        .run("bounded", &profile, &keys)
        .await
        .unwrap();

    assert!(
        result.elapsed <= Duration::from_millis(1001),
        "F013 FALSIFIED: phase ran for {:?}",
        result.elapsed
    );
    assert!(result.operations > 0);
}

/// F014: A seeded mix is reproducible
#[tokio::test(start_paused = true)]
async fn f014_seeded_runs_reproducible() {
    let run_once = || async {
        let backend = MemoryBackend::new();
        let keys = populated(&backend, 50).await;
        backend.evict_where(|k| k.ends_with('7'));
        let profile = LoadProfile::new(Duration::from_secs(2), 2)
            .with_pause(Duration::from_millis(20))
            .with_seed(77);
        LoadGenerator::new(connection(&backend))
            .run("seeded", &profile, &keys)
            .await
            .unwrap()
    };
    let first = run_once().await;
    let second = run_once().await;
    assert_eq!(first.workers, second.workers, "F014 FALSIFIED");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// F015: The merge invariant holds for arbitrary worker counts and pauses
    #[test]
    fn f015_merge_invariant(workers in 1usize..6, pause_ms in 5u64..60) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        let result = runtime.block_on(async {
            let backend = MemoryBackend::new();
            let keys = populated(&backend, 10).await;
            let profile = LoadProfile::new(Duration::from_millis(500), workers)
                .with_pause(Duration::from_millis(pause_ms));
            LoadGenerator::new(connection(&backend))
                .run("prop", &profile, &keys)
                .await
                .unwrap()
        });
        let sum: u64 = result.workers.iter().map(WorkerTally::operations).sum();
        prop_assert_eq!(result.operations, sum);
        prop_assert_eq!(result.workers.len(), workers);
        prop_assert_eq!(result.operations, result.successes + result.errors);
    }
}
