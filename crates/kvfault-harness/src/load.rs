//! Load generation against the proxy.
//!
//! A run spawns `workers` tasks sharing one deadline. Each worker owns its
//! connection clone, its RNG and its tally; tallies are merged only after
//! every worker has been joined. Operations still in flight when the
//! deadline passes are abandoned and not counted, so a [`PhaseResult`]
//! covers exactly the operations completed inside its window.

use std::sync::Arc;
use std::time::Duration;

use kvfault_client::{KvBackend, ProxyConnection, RedisBackend};
use kvfault_core::{HarnessError, PhaseResult, Result, RunConfig, TestKeySet, WorkerTally};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::task::JoinSet;
use tokio::time::Instant;

/// Operation a worker issues in one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Read a random existing test key. An absent value is an error; with
    /// no test keys the iteration is skipped.
    Read,
    /// Write a fresh key.
    Write,
    /// Delete a fresh key.
    Delete,
    /// Write a fresh key, then read it back. Counts as two operations.
    SetThenGet,
}

/// How workers choose their next operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpMix {
    /// Random choice, weighted per kind.
    Weighted(Vec<(OpKind, u32)>),
    /// Fixed cycle, the same for every worker.
    Sequence(Vec<OpKind>),
}

impl Default for OpMix {
    fn default() -> Self {
        Self::uniform_read_write()
    }
}

impl OpMix {
    /// Reads and writes with equal probability.
    #[must_use]
    pub fn uniform_read_write() -> Self {
        Self::Weighted(vec![(OpKind::Read, 1), (OpKind::Write, 1)])
    }

    /// Only reads of existing test keys.
    #[must_use]
    pub fn read_only() -> Self {
        Self::Sequence(vec![OpKind::Read])
    }

    /// Only writes of fresh keys.
    #[must_use]
    pub fn write_only() -> Self {
        Self::Sequence(vec![OpKind::Write])
    }

    /// Write-then-read of fresh keys.
    #[must_use]
    pub fn set_then_get() -> Self {
        Self::Sequence(vec![OpKind::SetThenGet])
    }

    fn picker(&self) -> Result<OpPicker> {
        match self {
            Self::Weighted(weights) => {
                let index = WeightedIndex::new(weights.iter().map(|(_, w)| *w))
                    .map_err(|e| HarnessError::config(format!("invalid operation mix: {e}")))?;
                Ok(OpPicker::Weighted {
                    kinds: weights.iter().map(|(kind, _)| *kind).collect(),
                    index,
                })
            }
            Self::Sequence(kinds) if kinds.is_empty() => {
                Err(HarnessError::config("operation sequence is empty"))
            }
            Self::Sequence(kinds) => Ok(OpPicker::Sequence {
                kinds: kinds.clone(),
                next: 0,
            }),
        }
    }
}

#[derive(Debug, Clone)]
enum OpPicker {
    Weighted {
        kinds: Vec<OpKind>,
        index: WeightedIndex<u32>,
    },
    Sequence {
        kinds: Vec<OpKind>,
        next: usize,
    },
}

impl OpPicker {
    fn pick(&mut self, rng: &mut StdRng) -> OpKind {
        match self {
            Self::Weighted { kinds, index } => kinds[index.sample(rng)],
            Self::Sequence { kinds, next } => {
                let kind = kinds[*next % kinds.len()];
                *next = next.wrapping_add(1);
                kind
            }
        }
    }
}

/// Where fresh writes go: `{prefix}:{n}` = `{value_prefix}-{n}` for a random
/// `n` in `1..=range`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
    value_prefix: String,
    range: u32,
}

impl KeySpace {
    /// Creates a key space. A zero range is treated as 1.
    #[must_use]
    pub fn new(prefix: impl Into<String>, value_prefix: impl Into<String>, range: u32) -> Self {
        Self {
            prefix: prefix.into(),
            value_prefix: value_prefix.into(),
            range: range.max(1),
        }
    }

    /// `{key_prefix}:new:{1..=10000}` = `new-value-{n}`, kept apart from the
    /// test key set.
    #[must_use]
    pub fn fresh_writes(key_prefix: &str) -> Self {
        Self::new(format!("{key_prefix}:new"), "new-value", 10_000)
    }

    /// Key for slot `n`.
    #[must_use]
    pub fn key(&self, n: u32) -> String {
        format!("{}:{n}", self.prefix)
    }

    /// Value for slot `n`.
    #[must_use]
    pub fn value(&self, n: u32) -> String {
        format!("{}-{n}", self.value_prefix)
    }

    fn sample(&self, rng: &mut impl Rng) -> u32 {
        rng.gen_range(1..=self.range)
    }
}

/// Parameters of one load run.
#[derive(Debug, Clone)]
pub struct LoadProfile {
    /// How long workers keep issuing operations.
    pub duration: Duration,
    /// Concurrent workers.
    pub workers: usize,
    /// Pause after every iteration.
    pub pause: Duration,
    /// Operation selection policy.
    pub mix: OpMix,
    /// Seed for reproducible runs. Worker `i` uses `seed + i`.
    pub seed: Option<u64>,
    /// Destination of fresh writes.
    pub writes: KeySpace,
}

impl LoadProfile {
    /// Uniform read/write load with a 500ms pause.
    #[must_use]
    pub fn new(duration: Duration, workers: usize) -> Self {
        Self {
            duration,
            workers,
            pause: Duration::from_millis(500),
            mix: OpMix::default(),
            seed: None,
            writes: KeySpace::fresh_writes("failure:test"),
        }
    }

    /// Load for one phase of a failover run.
    #[must_use]
    pub fn from_run(run: &RunConfig, duration: Duration) -> Self {
        Self {
            duration,
            workers: run.workers,
            pause: run.pause,
            mix: OpMix::default(),
            seed: run.seed,
            writes: KeySpace::fresh_writes(&run.key_prefix),
        }
    }

    /// Set the per-iteration pause.
    #[must_use]
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Set the operation mix.
    #[must_use]
    pub fn with_mix(mut self, mix: OpMix) -> Self {
        self.mix = mix;
        self
    }

    /// Seed the worker RNGs.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set where fresh writes go.
    #[must_use]
    pub fn with_writes(mut self, writes: KeySpace) -> Self {
        self.writes = writes;
        self
    }
}

/// Runs bounded worker pools against the proxy.
#[derive(Debug, Clone)]
pub struct LoadGenerator<B = RedisBackend> {
    conn: ProxyConnection<B>,
}

impl<B: KvBackend> LoadGenerator<B> {
    /// Creates a generator; each worker opens its own session from `conn`.
    #[must_use]
    pub const fn new(conn: ProxyConnection<B>) -> Self {
        Self { conn }
    }

    /// Runs one load phase and returns its merged result.
    ///
    /// Reads pick from `keys`; writes go to the profile's key space.
    ///
    /// # Errors
    /// Returns a configuration error for zero workers or an unusable mix, and
    /// an internal error if a worker task panicked.
    pub async fn run(
        &self,
        phase: &str,
        profile: &LoadProfile,
        keys: &Arc<TestKeySet>,
    ) -> Result<PhaseResult> {
        if profile.workers == 0 {
            return Err(HarnessError::config("load needs at least one worker"));
        }
        let picker = profile.mix.picker()?;

        tracing::info!(
            phase,
            workers = profile.workers,
            duration = ?profile.duration,
            pause = ?profile.pause,
            "starting load"
        );

        let started = Instant::now();
        let deadline = started + profile.duration;
        let mut tasks = JoinSet::new();
        for id in 0..profile.workers {
            let rng = match profile.seed {
                Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64)),
                None => StdRng::from_entropy(),
            };
            let worker = Worker {
                id,
                conn: self.conn.clone(),
                keys: Arc::clone(keys),
                picker: picker.clone(),
                rng,
                writes: profile.writes.clone(),
                pause: profile.pause,
                deadline,
            };
            tasks.spawn(worker.run());
        }

        let mut tallies = Vec::with_capacity(profile.workers);
        while let Some(joined) = tasks.join_next().await {
            let tally = joined.map_err(|e| {
                HarnessError::internal(format!("load worker failed during {phase}: {e}"))
            })?;
            tallies.push(tally);
        }

        let result = PhaseResult::from_workers(phase, tallies, started.elapsed());
        tracing::info!(
            phase,
            operations = result.operations,
            successes = result.successes,
            errors = result.errors,
            "load finished"
        );
        Ok(result)
    }
}

struct Worker<B> {
    id: usize,
    conn: ProxyConnection<B>,
    keys: Arc<TestKeySet>,
    picker: OpPicker,
    rng: StdRng,
    writes: KeySpace,
    pause: Duration,
    deadline: Instant,
}

impl<B: KvBackend> Worker<B> {
    async fn run(mut self) -> WorkerTally {
        let mut tally = WorkerTally::new(self.id);
        self.conn = self.conn.session().await;
        while Instant::now() < self.deadline {
            let kind = self.picker.pick(&mut self.rng);
            let deadline = self.deadline;
            match tokio::time::timeout_at(deadline, self.execute(kind)).await {
                Ok(done) => {
                    tally.successes += done.successes;
                    tally.errors += done.errors;
                }
                Err(_) => break,
            }

            let remaining = self.deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let pause = self.pause.min(remaining);
            if pause.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(pause).await;
            }
        }
        tracing::debug!(
            worker = self.id,
            operations = tally.operations(),
            errors = tally.errors,
            "worker finished"
        );
        tally
    }

    async fn execute(&mut self, kind: OpKind) -> WorkerTally {
        let mut tally = WorkerTally::new(self.id);
        match kind {
            OpKind::Read => {
                let Some(test_key) = self.keys.as_slice().choose(&mut self.rng) else {
                    return tally;
                };
                tally.record(self.conn.get(&test_key.key).await.is_some());
            }
            OpKind::Write => {
                let n = self.writes.sample(&mut self.rng);
                let ok = self.conn.set(&self.writes.key(n), &self.writes.value(n)).await;
                tally.record(ok);
            }
            OpKind::Delete => {
                let n = self.writes.sample(&mut self.rng);
                tally.record(self.conn.delete(&self.writes.key(n)).await);
            }
            OpKind::SetThenGet => {
                let n = self.writes.sample(&mut self.rng);
                let key = self.writes.key(n);
                tally.record(self.conn.set(&key, &self.writes.value(n)).await);
                tally.record(self.conn.get(&key).await.is_some());
            }
        }
        tally
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvfault_client::{MemoryBackend, OperationPolicy};
    use kvfault_core::TestKey;

    fn keys(n: usize) -> Arc<TestKeySet> {
        Arc::new(
            (1..=n)
                .map(|i| TestKey::new(format!("t:key:{i}"), format!("test-value-{i}")))
                .collect(),
        )
    }

    async fn seeded(backend: &MemoryBackend, keys: &TestKeySet) {
        for k in keys.iter() {
            backend.set(&k.key, &k.value).await.unwrap();
        }
    }

    fn generator(backend: &MemoryBackend) -> LoadGenerator<MemoryBackend> {
        LoadGenerator::new(ProxyConnection::new(
            backend.clone(),
            OperationPolicy::default(),
        ))
    }

    #[test]
    fn test_sequence_picker_cycles() {
        let mix = OpMix::Sequence(vec![OpKind::Read, OpKind::Write, OpKind::Delete]);
        let mut picker = mix.picker().unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let picked: Vec<_> = (0..6).map(|_| picker.pick(&mut rng)).collect();
        assert_eq!(
            picked,
            vec![
                OpKind::Read,
                OpKind::Write,
                OpKind::Delete,
                OpKind::Read,
                OpKind::Write,
                OpKind::Delete
            ]
        );
    }

    #[test]
    fn test_weighted_picker_is_reproducible_with_seed() {
        let mix = OpMix::uniform_read_write();
        let draw = || {
            let mut picker = mix.picker().unwrap();
            let mut rng = StdRng::seed_from_u64(42);
            (0..64).map(|_| picker.pick(&mut rng)).collect::<Vec<_>>()
        };
        let first = draw();
        assert_eq!(first, draw());
        assert!(first.contains(&OpKind::Read));
        assert!(first.contains(&OpKind::Write));
    }

    #[test]
    fn test_zero_weight_only_kind_never_picked() {
        let mix = OpMix::Weighted(vec![(OpKind::Read, 0), (OpKind::Write, 3)]);
        let mut picker = mix.picker().unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        assert!((0..100).all(|_| picker.pick(&mut rng) == OpKind::Write));
    }

    #[test]
    fn test_invalid_mixes_rejected() {
        let all_zero = OpMix::Weighted(vec![(OpKind::Read, 0), (OpKind::Write, 0)]);
        assert!(matches!(
            all_zero.picker(),
            Err(HarnessError::Configuration(_))
        ));
        assert!(matches!(
            OpMix::Sequence(Vec::new()).picker(),
            Err(HarnessError::Configuration(_))
        ));
    }

    #[test]
    fn test_key_space() {
        let space = KeySpace::fresh_writes("failure:test");
        assert_eq!(space.key(17), "failure:test:new:17");
        assert_eq!(space.value(17), "new-value-17");

        let mut rng = StdRng::seed_from_u64(1);
        let tiny = KeySpace::new("k", "v", 0);
        assert_eq!(tiny.sample(&mut rng), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_worker_rate_follows_pause() {
        let backend = MemoryBackend::new();
        let keys = keys(100);
        seeded(&backend, &keys).await;

        let profile = LoadProfile::new(Duration::from_secs(10), 1)
            .with_pause(Duration::from_millis(10))
            .with_mix(OpMix::read_only());
        let result = generator(&backend)
            .run("baseline", &profile, &keys)
            .await
            .unwrap();

        assert!(
            (990..=1000).contains(&result.operations),
            "expected ~1000 operations, got {}",
            result.operations
        );
        assert_eq!(result.errors, 0);
        assert_eq!(result.workers.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operations_equal_sum_of_workers() {
        let backend = MemoryBackend::new();
        let keys = keys(20);
        seeded(&backend, &keys).await;

        let profile = LoadProfile::new(Duration::from_secs(2), 4)
            .with_pause(Duration::from_millis(25))
            .with_seed(9);
        let result = generator(&backend).run("load", &profile, &keys).await.unwrap();

        let worker_sum: u64 = result.workers.iter().map(WorkerTally::operations).sum();
        assert_eq!(result.operations, worker_sum);
        assert_eq!(result.operations, result.successes + result.errors);
        assert_eq!(result.workers.len(), 4);
        assert!(result.workers.iter().all(|w| w.operations() > 0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_outage_counts_errors_not_panics() {
        let backend = MemoryBackend::new();
        let keys = keys(10);
        seeded(&backend, &keys).await;
        backend.set_available(false);

        let profile = LoadProfile::new(Duration::from_secs(1), 2).with_pause(Duration::from_millis(50));
        let result = generator(&backend).run("outage", &profile, &keys).await.unwrap();
        assert!(result.operations > 0);
        assert_eq!(result.successes, 0);
        assert_eq!(result.errors, result.operations);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_keys_count_as_errors() {
        let backend = MemoryBackend::new();
        let keys = keys(10);
        seeded(&backend, &keys).await;
        backend.evict_where(|_| true);

        let profile = LoadProfile::new(Duration::from_secs(1), 1)
            .with_pause(Duration::from_millis(100))
            .with_mix(OpMix::read_only());
        let result = generator(&backend).run("evicted", &profile, &keys).await.unwrap();
        assert_eq!(result.successes, 0);
        assert!(result.errors > 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_skipped_without_keys() {
        let backend = MemoryBackend::new();
        let profile = LoadProfile::new(Duration::from_secs(1), 1)
            .with_pause(Duration::from_millis(100))
            .with_mix(OpMix::read_only());
        let result = generator(&backend)
            .run("empty", &profile, &Arc::new(TestKeySet::new()))
            .await
            .unwrap();
        assert_eq!(result.operations, 0);
        assert_eq!(backend.calls().get, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_land_in_fresh_key_space() {
        let backend = MemoryBackend::new();
        let profile = LoadProfile::new(Duration::from_millis(500), 1)
            .with_pause(Duration::from_millis(100))
            .with_mix(OpMix::write_only())
            .with_writes(KeySpace::new("w", "val", 1));
        let result = generator(&backend)
            .run("writes", &profile, &Arc::new(TestKeySet::new()))
            .await
            .unwrap();
        assert!(result.successes > 0);
        assert_eq!(backend.peek("w:1"), Some("val-1".to_string()));
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get_counts_two_operations() {
        let backend = MemoryBackend::new();
        let profile = LoadProfile::new(Duration::from_millis(450), 1)
            .with_pause(Duration::from_millis(100))
            .with_mix(OpMix::set_then_get());
        let result = generator(&backend)
            .run("probe", &profile, &Arc::new(TestKeySet::new()))
            .await
            .unwrap();
        assert_eq!(result.operations % 2, 0);
        assert_eq!(result.operations, backend.calls().set + backend.calls().get);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_operation_past_deadline_not_counted() {
        let backend = MemoryBackend::new().with_latency(Duration::from_millis(300));
        let keys = keys(5);
        let conn = ProxyConnection::new(
            backend.clone(),
            OperationPolicy {
                timeout: Duration::from_secs(5),
                retries: 0,
            },
        );
        let profile = LoadProfile::new(Duration::from_secs(1), 1)
            .with_pause(Duration::from_millis(1))
            .with_mix(OpMix::read_only());
        let result = LoadGenerator::new(conn)
            .run("slow", &profile, &keys)
            .await
            .unwrap();

        // Reads complete at 300, 601 and 902ms; the fourth is still in flight at 1s.
        assert_eq!(result.operations, 3);
        assert_eq!(backend.calls().get, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cut_off_set_then_get_not_counted() {
        let backend = MemoryBackend::new().with_latency(Duration::from_millis(300));
        let profile = LoadProfile::new(Duration::from_millis(500), 1)
            .with_pause(Duration::from_millis(1))
            .with_mix(OpMix::set_then_get());
        let result = generator(&backend)
            .run("cut", &profile, &Arc::new(TestKeySet::new()))
            .await
            .unwrap();

        // The set completes at 300ms, the get is still in flight at 500ms.
        assert_eq!(result.operations, 0);
        assert_eq!(backend.calls().set, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_each_worker_opens_a_session() {
        let backend = MemoryBackend::new();
        let keys = keys(4);
        seeded(&backend, &keys).await;
        let profile = LoadProfile::new(Duration::from_millis(300), 5)
            .with_pause(Duration::from_millis(100))
            .with_mix(OpMix::read_only());
        let result = generator(&backend).run("sessions", &profile, &keys).await.unwrap();
        assert_eq!(result.workers.len(), 5);
        assert_eq!(backend.calls().session, 5);
    }

    #[tokio::test]
    async fn test_zero_workers_rejected() {
        let backend = MemoryBackend::new();
        let profile = LoadProfile::new(Duration::from_secs(1), 0);
        let err = generator(&backend)
            .run("none", &profile, &keys(1))
            .await
            .unwrap_err();
        assert!(matches!(err, HarnessError::Configuration(_)));
    }
}
