//! Proxy smoke checks.
//!
//! Quick checks to run before a failover test: basic set/get traffic, error
//! reply handling for malformed commands, and optional sustained load from
//! several workers.

use std::fmt;
use std::sync::Arc;

use kvfault_client::{KvBackend, ProxyConnection, RedisBackend};
use kvfault_core::{PhaseResult, ProbeConfig, Result, TestKeySet, WorkerTally};
use serde::Serialize;
use tokio::time::Instant;

use crate::load::{KeySpace, LoadGenerator, LoadProfile, OpMix};

/// Malformed commands a proxy must reject with an error reply.
const MALFORMED: [&[&str]; 2] = [&["NONEXISTENT_COMMAND"], &["HGET"]];

/// Outcome of sending one malformed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorCheck {
    /// Command line sent.
    pub command: String,
    /// True if the proxy answered with an error reply and kept the
    /// connection usable.
    pub rejected: bool,
    /// Reply or error text.
    pub detail: String,
}

/// Results of a probe run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeReport {
    /// Sequential set/get traffic.
    pub basic: PhaseResult,
    /// Malformed command checks, empty unless enabled.
    pub error_checks: Vec<ErrorCheck>,
    /// Concurrent load, absent unless enabled.
    pub high_load: Option<PhaseResult>,
}

impl ProbeReport {
    /// True if every check that ran passed: no basic or load errors and
    /// every malformed command rejected.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.basic.errors == 0
            && self.error_checks.iter().all(|c| c.rejected)
            && self.high_load.as_ref().is_none_or(|r| r.errors == 0)
    }
}

impl fmt::Display for ProbeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Proxy Probe ===")?;
        writeln!(
            f,
            "Basic operations: {} ops, {} successful, {} errors ({:.1}s)",
            self.basic.operations,
            self.basic.successes,
            self.basic.errors,
            self.basic.elapsed.as_secs_f64()
        )?;
        for check in &self.error_checks {
            let verdict = if check.rejected { "rejected" } else { "NOT REJECTED" };
            writeln!(f, "Error handling:   {:<20} {verdict} ({})", check.command, check.detail)?;
        }
        if let Some(load) = &self.high_load {
            writeln!(
                f,
                "High load:        {} ops, {} successful, {} errors across {} workers ({:.1}s)",
                load.operations,
                load.successes,
                load.errors,
                load.workers.len(),
                load.elapsed.as_secs_f64()
            )?;
        }
        let result = if self.passed() { "passed" } else { "FAILED" };
        writeln!(f, "Result:           {result}")
    }
}

/// Runs the smoke checks against one connection.
#[derive(Debug, Clone)]
pub struct ClientProbe<B = RedisBackend> {
    conn: ProxyConnection<B>,
    config: ProbeConfig,
}

impl<B: KvBackend> ClientProbe<B> {
    /// Creates a probe.
    #[must_use]
    pub const fn new(conn: ProxyConnection<B>, config: ProbeConfig) -> Self {
        Self { conn, config }
    }

    /// Runs basic operations, then the optional checks the config enables.
    ///
    /// # Errors
    /// Returns an error only if the high-load workers could not be run.
    pub async fn run(&self) -> Result<ProbeReport> {
        let basic = self.basic_operations().await;
        let error_checks = if self.config.test_errors {
            self.error_handling().await
        } else {
            Vec::new()
        };
        let high_load = if self.config.high_load {
            Some(self.high_load().await?)
        } else {
            None
        };
        Ok(ProbeReport {
            basic,
            error_checks,
            high_load,
        })
    }

    /// Sets `test:key:{i}` = `value-{i}` and reads it back, `ops` times.
    pub async fn basic_operations(&self) -> PhaseResult {
        tracing::info!(ops = self.config.ops, "running basic operations");
        let started = Instant::now();
        let mut tally = WorkerTally::new(0);

        for i in 0..self.config.ops {
            let key = format!("test:key:{i}");
            let value = format!("value-{i}");
            tally.record(self.conn.set(&key, &value).await);

            let read = self.conn.get(&key).await;
            if let Some(read) = &read {
                tracing::debug!(key, value = %read, "read back");
            }
            tally.record(read.is_some());

            if !self.config.pause.is_zero() {
                tokio::time::sleep(self.config.pause).await;
            }
        }

        PhaseResult::from_workers("basic", vec![tally], started.elapsed())
    }

    /// Sends each malformed command, expects an error reply, then checks
    /// the connection still answers `PING`.
    pub async fn error_handling(&self) -> Vec<ErrorCheck> {
        tracing::info!("testing error handling");
        let mut checks = Vec::with_capacity(MALFORMED.len());
        for args in MALFORMED {
            let command = args.join(" ");
            let check = match self.conn.command(args).await {
                Ok(reply) => ErrorCheck {
                    command,
                    rejected: false,
                    detail: format!("unexpected reply: {reply}"),
                },
                Err(e) if e.is_error_reply() => {
                    let usable = self.conn.ping().await;
                    ErrorCheck {
                        command,
                        rejected: usable,
                        detail: if usable {
                            e.to_string()
                        } else {
                            format!("{e}; connection unusable afterwards")
                        },
                    }
                }
                Err(e) => ErrorCheck {
                    command,
                    rejected: false,
                    detail: e.to_string(),
                },
            };
            if check.rejected {
                tracing::info!(command = %check.command, reply = %check.detail, "expected error reply");
            } else {
                tracing::warn!(command = %check.command, detail = %check.detail, "malformed command not rejected");
            }
            checks.push(check);
        }
        checks
    }

    /// `threads` workers doing set+get on `load:key:{1..=1000}` for
    /// `load_duration`.
    ///
    /// # Errors
    /// Returns an error if a worker task failed.
    pub async fn high_load(&self) -> Result<PhaseResult> {
        let profile = LoadProfile::new(self.config.load_duration, self.config.threads)
            .with_pause(self.config.load_pause)
            .with_mix(OpMix::set_then_get())
            .with_writes(KeySpace::new("load:key", "load-value", 1000));
        LoadGenerator::new(self.conn.clone())
            .run("high-load", &profile, &Arc::new(TestKeySet::new()))
            .await
    }
}
