//! Command-line interface.
//!
//! Flags override the configuration file; the merged configuration is
//! validated once, after every override is applied.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use kvfault::core::{ControlConfig, HarnessConfig, HarnessError, Phase, RoleFilter, TestReport};
use kvfault::harness::RunAborted;

#[derive(Parser, Debug)]
#[command(name = "kvfault", version)]
#[command(about = "Node-failure resilience harness for caching key-value proxies")]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Proxy host
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Proxy port
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Print the report as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging (RUST_LOG still takes precedence per target)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stop a backend node under load and measure how the proxy copes
    Failover(FailoverArgs),
    /// Smoke-test the proxy: basic traffic, error replies, optional high load
    Probe(ProbeArgs),
}

#[derive(Args, Debug, Default)]
pub struct FailoverArgs {
    /// Node to fail (1-2 master, 3-4 replica by default)
    #[arg(short, long)]
    pub node: Option<u8>,

    /// Role the node must have: master, slave, or any
    #[arg(short = 't', long)]
    pub node_type: Option<RoleFilter>,

    /// Load duration while the node is down (seconds or e.g. "45s")
    #[arg(short, long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Concurrent load workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Test keys written during setup
    #[arg(short, long)]
    pub keys: Option<usize>,

    /// Pause after every worker iteration (e.g. "500ms")
    #[arg(long, value_parser = parse_duration)]
    pub pause: Option<Duration>,

    /// Seed for the operation mix
    #[arg(long)]
    pub seed: Option<u64>,

    /// Container runtime: docker, podman, or nerdctl
    #[arg(long)]
    pub runtime: Option<String>,

    /// Container name prefix (node n is container <prefix><n>)
    #[arg(long)]
    pub container_prefix: Option<String>,
}

#[derive(Args, Debug, Default)]
pub struct ProbeArgs {
    /// Basic set/get round trips
    #[arg(short, long)]
    pub ops: Option<usize>,

    /// Send malformed commands and expect error replies
    #[arg(long)]
    pub test_errors: bool,

    /// Run the parallel high-load stage
    #[arg(long)]
    pub high_load: bool,

    /// High-load duration (seconds or e.g. "30s")
    #[arg(long, value_parser = parse_duration)]
    pub load_duration: Option<Duration>,

    /// High-load worker count
    #[arg(long)]
    pub threads: Option<usize>,
}

impl Cli {
    /// Reads the config file (or defaults), applies flags, and validates.
    ///
    /// # Errors
    /// Returns the read, parse, or validation error.
    pub fn load_config(&self) -> kvfault::core::Result<HarnessConfig> {
        let mut config = match &self.config {
            Some(path) => HarnessConfig::read(path)?,
            None => HarnessConfig::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(host) = &self.host {
            config.proxy.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.proxy.port = port;
        }
        match &self.command {
            Command::Failover(args) => args.apply(config),
            Command::Probe(args) => args.apply(config),
        }
    }
}

impl FailoverArgs {
    fn apply(&self, config: &mut HarnessConfig) {
        let run = &mut config.run;
        if let Some(node) = self.node {
            run.node = node;
        }
        if let Some(node_type) = self.node_type {
            run.node_type = node_type;
        }
        if let Some(duration) = self.duration {
            run.failure = duration;
        }
        if let Some(workers) = self.workers {
            run.workers = workers;
        }
        if let Some(keys) = self.keys {
            run.keys = keys;
        }
        if let Some(pause) = self.pause {
            run.pause = pause;
        }
        if self.seed.is_some() {
            run.seed = self.seed;
        }

        if self.runtime.is_none() && self.container_prefix.is_none() {
            return;
        }
        let current = match &config.control {
            container @ ControlConfig::Container { .. } => container.clone(),
            ControlConfig::Script { .. } => ControlConfig::default(),
        };
        if let ControlConfig::Container {
            mut runtime,
            mut name_prefix,
        } = current
        {
            if let Some(r) = &self.runtime {
                runtime.clone_from(r);
            }
            if let Some(p) = &self.container_prefix {
                name_prefix.clone_from(p);
            }
            config.control = ControlConfig::Container {
                runtime,
                name_prefix,
            };
        }
    }
}

impl ProbeArgs {
    fn apply(&self, config: &mut HarnessConfig) {
        let probe = &mut config.probe;
        if let Some(ops) = self.ops {
            probe.ops = ops;
        }
        probe.test_errors |= self.test_errors;
        probe.high_load |= self.high_load;
        if let Some(duration) = self.load_duration {
            probe.load_duration = duration;
        }
        if let Some(threads) = self.threads {
            probe.threads = threads;
        }
    }
}

/// A failover run that stopped before writing anything: empty report,
/// aborted at setup.
pub fn abort_before_setup(source: HarnessError) -> RunAborted {
    RunAborted::new(Phase::Setup, source, TestReport::default())
}

/// Renders a report as summary text or pretty JSON.
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn render_report(report: &TestReport, json: bool) -> kvfault::core::Result<String> {
    if json {
        Ok(format!("{}\n", report.to_json()?))
    } else {
        Ok(report.to_string())
    }
}

/// Accepts bare seconds ("30") or a humantime duration ("30s", "1m 30s").
fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    match s.trim().parse::<u64>() {
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(_) => humantime::parse_duration(s),
    }
}
