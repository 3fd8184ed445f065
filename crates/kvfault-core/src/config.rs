//! Harness configuration.
//!
//! Configuration is validated at load time, with defaults that reproduce the
//! reference failover scenario: 100 setup keys, a 10s baseline, a 30s
//! failure window, a 10s recovery window, and settle delays of 2s after the
//! node is stopped and 5s after it is started.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::types::{RoleFilter, Topology};

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Proxy connection settings.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Failover run settings.
    #[serde(default)]
    pub run: RunConfig,

    /// Client probe settings.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// How backend nodes are stopped and started.
    #[serde(default)]
    pub control: ControlConfig,

    /// Static node index → role mapping.
    #[serde(default)]
    pub topology: Topology,
}

impl HarnessConfig {
    /// Loads and validates configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML file without validating it, for callers that apply
    /// overrides before calling [`HarnessConfig::validate`].
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| HarnessError::config(format!("failed to read config: {e}")))?;
        Self::parse(&content)
    }

    /// Parses and validates configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the string cannot be parsed or validated.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config = Self::parse(content)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| HarnessError::config(format!("failed to parse config: {e}")))
    }

    /// Validates every section, including the failure target against the
    /// topology.
    ///
    /// # Errors
    /// Returns a configuration error describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.proxy.validate()?;
        self.run.validate()?;
        self.probe.validate()?;
        self.control.validate()?;
        self.topology.validate()?;
        self.topology.select(self.run.node, self.run.node_type)?;
        Ok(())
    }
}

/// Proxy connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Proxy port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logical database number.
    #[serde(default)]
    pub db: i64,

    /// Bound on connection establishment.
    #[serde(default = "default_io_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Bound on each individual operation.
    #[serde(default = "default_io_timeout", with = "humantime_serde")]
    pub op_timeout: Duration,

    /// Extra attempts for an operation that timed out. Other failures are
    /// not retried.
    #[serde(default = "default_op_retries")]
    pub op_retries: u32,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    7617
}

fn default_io_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_op_retries() -> u32 {
    1
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db: 0,
            connect_timeout: default_io_timeout(),
            op_timeout: default_io_timeout(),
            op_retries: default_op_retries(),
        }
    }
}

impl ProxyConfig {
    /// Connection URL for the proxy.
    #[must_use]
    pub fn url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.db)
    }

    /// Validates proxy settings.
    ///
    /// # Errors
    /// Returns an error if a setting is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(HarnessError::config("proxy host cannot be empty"));
        }
        if self.port == 0 {
            return Err(HarnessError::config("proxy port must be non-zero"));
        }
        if self.connect_timeout.is_zero() || self.op_timeout.is_zero() {
            return Err(HarnessError::config("proxy timeouts must be non-zero"));
        }
        Ok(())
    }
}

/// Failover run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Keys written during setup.
    #[serde(default = "default_keys")]
    pub keys: usize,

    /// Node index to fail.
    #[serde(default = "default_node")]
    pub node: u8,

    /// Role the failed node must have.
    #[serde(default)]
    pub node_type: RoleFilter,

    /// Baseline load duration.
    #[serde(default = "default_short_phase", with = "humantime_serde")]
    pub baseline: Duration,

    /// Load duration while the node is down.
    #[serde(default = "default_failure", with = "humantime_serde")]
    pub failure: Duration,

    /// Load duration after the node is restored.
    #[serde(default = "default_short_phase", with = "humantime_serde")]
    pub recovery: Duration,

    /// Concurrent load workers per phase.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Pause after every worker iteration.
    #[serde(default = "default_pause", with = "humantime_serde")]
    pub pause: Duration,

    /// Wait after stopping the node.
    #[serde(default = "default_stop_settle", with = "humantime_serde")]
    pub stop_settle: Duration,

    /// Wait after starting the node.
    #[serde(default = "default_start_settle", with = "humantime_serde")]
    pub start_settle: Duration,

    /// Concurrent readers during verification (1 = sequential).
    #[serde(default = "default_verify_concurrency")]
    pub verify_concurrency: usize,

    /// Seed for the operation mix; random when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Prefix for every key the run writes.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_keys() -> usize {
    100
}

fn default_node() -> u8 {
    3
}

fn default_short_phase() -> Duration {
    Duration::from_secs(10)
}

fn default_failure() -> Duration {
    Duration::from_secs(30)
}

fn default_workers() -> usize {
    1
}

fn default_pause() -> Duration {
    Duration::from_millis(500)
}

fn default_stop_settle() -> Duration {
    Duration::from_secs(2)
}

fn default_start_settle() -> Duration {
    Duration::from_secs(5)
}

fn default_verify_concurrency() -> usize {
    1
}

fn default_key_prefix() -> String {
    "failure:test".to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            keys: default_keys(),
            node: default_node(),
            node_type: RoleFilter::default(),
            baseline: default_short_phase(),
            failure: default_failure(),
            recovery: default_short_phase(),
            workers: default_workers(),
            pause: default_pause(),
            stop_settle: default_stop_settle(),
            start_settle: default_start_settle(),
            verify_concurrency: default_verify_concurrency(),
            seed: None,
            key_prefix: default_key_prefix(),
        }
    }
}

impl RunConfig {
    /// Validates run settings. Node/role validity is checked against the
    /// topology by [`HarnessConfig::validate`].
    ///
    /// # Errors
    /// Returns an error if a setting is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(HarnessError::config("workers must be at least 1"));
        }
        if self.baseline.is_zero() || self.failure.is_zero() || self.recovery.is_zero() {
            return Err(HarnessError::config("load phase durations must be non-zero"));
        }
        if self.verify_concurrency == 0 {
            return Err(HarnessError::config("verify_concurrency must be at least 1"));
        }
        if self.key_prefix.is_empty() {
            return Err(HarnessError::config("key_prefix cannot be empty"));
        }
        Ok(())
    }
}

/// Client probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Basic set/get round trips.
    #[serde(default = "default_probe_ops")]
    pub ops: usize,

    /// Pause between basic round trips.
    #[serde(default = "default_probe_pause", with = "humantime_serde")]
    pub pause: Duration,

    /// Send malformed commands and check they are rejected cleanly.
    #[serde(default)]
    pub test_errors: bool,

    /// Run the parallel high-load stage.
    #[serde(default)]
    pub high_load: bool,

    /// High-load duration.
    #[serde(default = "default_short_phase", with = "humantime_serde")]
    pub load_duration: Duration,

    /// High-load worker count.
    #[serde(default = "default_probe_threads")]
    pub threads: usize,

    /// Pause after each high-load iteration.
    #[serde(default = "default_load_pause", with = "humantime_serde")]
    pub load_pause: Duration,
}

fn default_probe_ops() -> usize {
    100
}

fn default_probe_pause() -> Duration {
    Duration::from_millis(10)
}

fn default_probe_threads() -> usize {
    5
}

fn default_load_pause() -> Duration {
    Duration::from_millis(1)
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ops: default_probe_ops(),
            pause: default_probe_pause(),
            test_errors: false,
            high_load: false,
            load_duration: default_short_phase(),
            threads: default_probe_threads(),
            load_pause: default_load_pause(),
        }
    }
}

impl ProbeConfig {
    /// Validates probe settings.
    ///
    /// # Errors
    /// Returns an error if a setting is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.high_load && self.threads == 0 {
            return Err(HarnessError::config("high-load threads must be at least 1"));
        }
        if self.high_load && self.load_duration.is_zero() {
            return Err(HarnessError::config("high-load duration must be non-zero"));
        }
        Ok(())
    }
}

/// How nodes are stopped and started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ControlConfig {
    /// Node `n` is the container `{name_prefix}{n}`.
    Container {
        /// Container CLI: docker, podman, or nerdctl.
        #[serde(default = "default_runtime")]
        runtime: String,
        /// Container name prefix.
        #[serde(default = "default_name_prefix")]
        name_prefix: String,
    },
    /// Shell command templates; `{node}` is replaced with the node index.
    Script {
        /// Command that stops a node.
        stop: String,
        /// Command that starts a node.
        start: String,
    },
}

fn default_runtime() -> String {
    "docker".to_string()
}

fn default_name_prefix() -> String {
    "redis".to_string()
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self::Container {
            runtime: default_runtime(),
            name_prefix: default_name_prefix(),
        }
    }
}

impl ControlConfig {
    /// Validates control settings.
    ///
    /// # Errors
    /// Returns an error for an unknown runtime or an empty template.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Container {
                runtime,
                name_prefix,
            } => {
                if !matches!(runtime.as_str(), "docker" | "podman" | "nerdctl") {
                    return Err(HarnessError::config(format!(
                        "unknown container runtime '{runtime}' (expected docker, podman, or nerdctl)"
                    )));
                }
                if name_prefix.is_empty() {
                    return Err(HarnessError::config("container name_prefix cannot be empty"));
                }
            }
            Self::Script { stop, start } => {
                if stop.trim().is_empty() || start.trim().is_empty() {
                    return Err(HarnessError::config("script stop/start commands cannot be empty"));
                }
            }
        }
        Ok(())
    }
}

/// Serde helper for humantime durations.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
