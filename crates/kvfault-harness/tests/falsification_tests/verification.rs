//! Falsification Tests: Category C - Verification (F021-F030)

use kvfault_client::MemoryBackend;
use kvfault_harness::DataVerifier;
use proptest::prelude::*;

use super::doubles::{connection, populated};

/// F021: verify on 100 available keys returns (100, 100)
#[tokio::test]
async fn f021_full_availability() {
    let backend = MemoryBackend::new();
    let keys = populated(&backend, 100).await;
    let checkpoint = DataVerifier::new(connection(&backend))
        .verify("initial", &keys)
        .await
        .unwrap();
    assert_eq!(
        (checkpoint.verified, checkpoint.total),
        (100, 100),
        "F021 FALSIFIED"
    );
}

/// F022: verify is idempotent without intervening writes
///
/// # Falsification Attempt
/// Evict part of the set, verify twice; differing results falsify the claim.
#[tokio::test]
async fn f022_verify_idempotent() {
    let backend = MemoryBackend::new();
    let keys = populated(&backend, 60).await;
    backend.evict_where(|k| k.ends_with('3'));

    let verifier = DataVerifier::new(connection(&backend)).with_concurrency(4);
    let first = verifier.verify("a", &keys).await.unwrap();
    let second = verifier.verify("b", &keys).await.unwrap();
    assert_eq!(
        (first.verified, first.total),
        (second.verified, second.total),
        "F022 FALSIFIED"
    );
    assert_eq!(backend.calls().set, 60, "F022 FALSIFIED: verify wrote keys");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// F023: The ratio is in [0, 1] and verified never exceeds total
    #[test]
    fn f023_ratio_bounded(total in 0usize..80, lost in 0usize..80, concurrency in 1usize..8) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let checkpoint = runtime.block_on(async {
            let backend = MemoryBackend::new();
            let keys = populated(&backend, total).await;
            let doomed: Vec<String> = keys.iter().take(lost).map(|k| k.key.clone()).collect();
            backend.evict_where(|k| doomed.iter().any(|d| d == k));
            DataVerifier::new(connection(&backend))
                .with_concurrency(concurrency)
                .verify("prop", &keys)
                .await
                .unwrap()
        });
        prop_assert!(checkpoint.verified <= checkpoint.total);
        prop_assert!((0.0..=1.0).contains(&checkpoint.ratio()));
        prop_assert_eq!(checkpoint.verified, total - lost.min(total));
    }
}
