// crates/fedis-bench-config/src/config.rs
// ============================================================================
// Module: Bench Configuration
// Description: Harness configuration model, loading, and validation.
// Purpose: Resolve one immutable run configuration before any work starts.
// Dependencies: fedis-bench-core, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! Configuration is layered once at startup: built-in defaults, then an
//! optional TOML file (`--config` or `FEDIS_BENCH_CONFIG`), then environment
//! overrides. The result is validated fail-closed and handed to the harness
//! by reference.
//!
//! Security posture: config inputs are untrusted local files and env vars.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use fedis_bench_core::BenchEventSink;
use fedis_bench_core::FileEventSink;
use fedis_bench_core::KeyMode;
use fedis_bench_core::NoopEventSink;
use fedis_bench_core::ServerLauncher;
use fedis_bench_core::StderrEventSink;
use fedis_bench_core::SuitePlan;
use fedis_bench_core::aggregate::DEFAULT_RUNS;
use fedis_bench_core::aggregate::DEFAULT_WARMUP;
use fedis_bench_core::latency::DEFAULT_LATENCY_SAMPLES;
use fedis_bench_core::process::DEFAULT_STOP_GRACE;
use fedis_bench_core::readiness::ReadinessPolicy;
use fedis_bench_core::suite::DEFAULT_CLIENTS;
use fedis_bench_core::suite::DEFAULT_DURATION;
use fedis_bench_core::suite::DEFAULT_RESULTS_PATH;
use fedis_bench_core::suite::DEFAULT_SUITE_PORT;
use fedis_bench_core::transport::DEFAULT_IO_TIMEOUT;
use serde::Deserialize;
use thiserror::Error;

use crate::env::BenchEnv;
use crate::env::parse_positive;

// ============================================================================
// SECTION: Limits and Defaults
// ============================================================================

/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum concurrent workers.
pub(crate) const MAX_CLIENTS: usize = 4096;
/// Maximum timed repetitions per metric.
pub(crate) const MAX_RUNS: usize = 1_000;
/// Maximum PING latency samples.
pub(crate) const MAX_LATENCY_SAMPLES: usize = 1_000_000;
/// Default regression limits document.
pub(crate) const DEFAULT_THRESHOLDS_PATH: &str = "benchmarks/regression_thresholds.json";
/// Default quick-gate limits document.
pub(crate) const DEFAULT_QUICK_THRESHOLDS_PATH: &str = "benchmarks/thresholds.json";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Harness configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchConfig {
    /// Server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Concurrent worker count.
    #[serde(default = "default_clients")]
    pub clients: usize,
    /// Seconds per timed measurement.
    #[serde(default = "default_duration_sec")]
    pub duration_sec: u64,
    /// Timed repetitions per metric.
    #[serde(default = "default_runs")]
    pub runs: usize,
    /// Concurrent key distribution.
    #[serde(default)]
    pub mode: KeyMode,
    /// Untimed warm-up per workload in milliseconds; zero disables it.
    #[serde(default = "default_warmup_ms")]
    pub warmup_ms: u64,
    /// PING latency samples.
    #[serde(default = "default_latency_samples")]
    pub latency_samples: usize,
    /// Socket send/receive timeout in milliseconds.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Root that relative paths and the server command resolve against.
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    /// Results document.
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,
    /// Regression limits document.
    #[serde(default = "default_thresholds_path")]
    pub thresholds_path: PathBuf,
    /// Quick-gate limits document.
    #[serde(default = "default_quick_thresholds_path")]
    pub quick_thresholds_path: PathBuf,
    /// Server-under-test command.
    #[serde(default)]
    pub server: ServerCommandConfig,
    /// Harness event logging.
    #[serde(default)]
    pub events: EventsConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            clients: default_clients(),
            duration_sec: default_duration_sec(),
            runs: default_runs(),
            mode: KeyMode::default(),
            warmup_ms: default_warmup_ms(),
            latency_samples: default_latency_samples(),
            io_timeout_ms: default_io_timeout_ms(),
            project_root: None,
            results_path: default_results_path(),
            thresholds_path: default_thresholds_path(),
            quick_thresholds_path: default_quick_thresholds_path(),
            server: ServerCommandConfig::default(),
            events: EventsConfig::default(),
        }
    }
}

/// Command used to start the server-under-test.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerCommandConfig {
    /// Program to execute.
    #[serde(default = "default_server_program")]
    pub program: String,
    /// Program arguments.
    #[serde(default = "default_server_args")]
    pub args: Vec<String>,
    /// Log verbosity passed as `FEDIS_LOG`; inherited or `error` when unset.
    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for ServerCommandConfig {
    fn default() -> Self {
        Self {
            program: default_server_program(),
            args: default_server_args(),
            log_level: None,
        }
    }
}

/// Harness event logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfig {
    /// Enable structured event logging.
    #[serde(default = "default_events_enabled")]
    pub enabled: bool,
    /// Optional event log path (JSON lines); stderr when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: default_events_enabled(),
            path: None,
        }
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl BenchConfig {
    /// Loads configuration: defaults, optional TOML file, then environment.
    ///
    /// The file is `path` when given, else `FEDIS_BENCH_CONFIG` when set,
    /// else none.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file, an environment value, or the
    /// merged configuration is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match resolve_path(path)? {
            Some(resolved) => Self::from_file(&resolved)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a TOML config file without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies environment overrides on top of the current values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Env`] when a set variable is invalid.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(raw) = BenchEnv::Port.read().map_err(ConfigError::Env)? {
            self.port = parse_positive(BenchEnv::Port.as_str(), &raw).map_err(ConfigError::Env)?;
        }
        if let Some(raw) = BenchEnv::Log.read().map_err(ConfigError::Env)? {
            self.server.log_level = Some(raw.trim().to_string());
        }
        if let Some(raw) = BenchEnv::Clients.read().map_err(ConfigError::Env)? {
            self.clients =
                parse_positive(BenchEnv::Clients.as_str(), &raw).map_err(ConfigError::Env)?;
        }
        if let Some(raw) = BenchEnv::Duration.read().map_err(ConfigError::Env)? {
            self.duration_sec =
                parse_positive(BenchEnv::Duration.as_str(), &raw).map_err(ConfigError::Env)?;
        }
        if let Some(raw) = BenchEnv::Runs.read().map_err(ConfigError::Env)? {
            self.runs = parse_positive(BenchEnv::Runs.as_str(), &raw).map_err(ConfigError::Env)?;
        }
        if let Some(raw) = BenchEnv::Mode.read().map_err(ConfigError::Env)? {
            self.mode = raw
                .parse()
                .map_err(|err| ConfigError::Env(format!("{}: {err}", BenchEnv::Mode.as_str())))?;
        }
        Ok(())
    }

    /// Validates the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port must be greater than zero".to_string()));
        }
        if self.clients == 0 || self.clients > MAX_CLIENTS {
            return Err(ConfigError::Invalid(format!(
                "clients must be between 1 and {MAX_CLIENTS}"
            )));
        }
        if self.duration_sec == 0 {
            return Err(ConfigError::Invalid("duration_sec must be greater than zero".to_string()));
        }
        if self.runs == 0 || self.runs > MAX_RUNS {
            return Err(ConfigError::Invalid(format!("runs must be between 1 and {MAX_RUNS}")));
        }
        if self.latency_samples == 0 || self.latency_samples > MAX_LATENCY_SAMPLES {
            return Err(ConfigError::Invalid(format!(
                "latency_samples must be between 1 and {MAX_LATENCY_SAMPLES}"
            )));
        }
        if self.io_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "io_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.server.program.trim().is_empty() {
            return Err(ConfigError::Invalid("server.program must be non-empty".to_string()));
        }
        if let Some(level) = &self.server.log_level
            && level.trim().is_empty()
        {
            return Err(ConfigError::Invalid("server.log_level must be non-empty".to_string()));
        }
        for (field, path) in [
            ("results_path", &self.results_path),
            ("thresholds_path", &self.thresholds_path),
            ("quick_thresholds_path", &self.quick_thresholds_path),
        ] {
            validate_path_field(field, path)?;
        }
        if let Some(path) = &self.events.path {
            validate_path_field("events.path", path)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Derived Values
// ============================================================================

impl BenchConfig {
    /// Resolves `path` against `project_root` when it is relative.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.project_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Returns the resolved results document path.
    #[must_use]
    pub fn results_path(&self) -> PathBuf {
        self.resolve(&self.results_path)
    }

    /// Returns the resolved regression limits path.
    #[must_use]
    pub fn thresholds_path(&self) -> PathBuf {
        self.resolve(&self.thresholds_path)
    }

    /// Returns the resolved quick-gate limits path.
    #[must_use]
    pub fn quick_thresholds_path(&self) -> PathBuf {
        self.resolve(&self.quick_thresholds_path)
    }

    /// Returns the socket timeout.
    #[must_use]
    pub const fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    /// Builds the suite plan.
    #[must_use]
    pub fn suite_plan(&self) -> SuitePlan {
        SuitePlan {
            port: self.port,
            clients: self.clients,
            duration: Duration::from_secs(self.duration_sec),
            runs: self.runs,
            warmup: Duration::from_millis(self.warmup_ms),
            latency_samples: self.latency_samples,
            mode: self.mode,
            io_timeout: self.io_timeout(),
            results_path: self.results_path(),
        }
    }

    /// Builds the server launcher.
    #[must_use]
    pub fn launcher(&self) -> ServerLauncher {
        ServerLauncher {
            program: self.server.program.clone(),
            args: self.server.args.clone(),
            working_dir: self.project_root.clone(),
            log_level: self.server.log_level.clone(),
            readiness: ReadinessPolicy::default(),
            io_timeout: self.io_timeout(),
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }

    /// Builds the configured event sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the event log cannot be opened.
    pub fn event_sink(&self) -> Result<Box<dyn BenchEventSink>, ConfigError> {
        if !self.events.enabled {
            return Ok(Box::new(NoopEventSink));
        }
        match &self.events.path {
            Some(path) => {
                let sink = FileEventSink::new(&self.resolve(path))
                    .map_err(|err| ConfigError::Io(err.to_string()))?;
                Ok(Box::new(sink))
            }
            None => Ok(Box::new(StderrEventSink)),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// Invalid environment override.
    #[error("invalid environment: {0}")]
    Env(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from the CLI or `FEDIS_BENCH_CONFIG`.
fn resolve_path(path: Option<&Path>) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path {
        return Ok(Some(path.to_path_buf()));
    }
    let Some(env_path) = BenchEnv::Config.read().map_err(ConfigError::Env)? else {
        return Ok(None);
    };
    if env_path.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    Ok(Some(PathBuf::from(env_path)))
}

/// Validates a configured path against length constraints.
fn validate_path_field(field: &str, path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    Ok(())
}

/// Default suite port.
const fn default_port() -> u16 {
    DEFAULT_SUITE_PORT
}

/// Default concurrent worker count.
const fn default_clients() -> usize {
    DEFAULT_CLIENTS
}

/// Default seconds per measurement.
const fn default_duration_sec() -> u64 {
    DEFAULT_DURATION.as_secs()
}

/// Default timed repetitions.
const fn default_runs() -> usize {
    DEFAULT_RUNS
}

/// Default warm-up in milliseconds.
fn default_warmup_ms() -> u64 {
    millis(DEFAULT_WARMUP)
}

/// Default latency sample count.
const fn default_latency_samples() -> usize {
    DEFAULT_LATENCY_SAMPLES
}

/// Default socket timeout in milliseconds.
fn default_io_timeout_ms() -> u64 {
    millis(DEFAULT_IO_TIMEOUT)
}

/// Whole milliseconds in `duration`, saturating.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Default results document.
fn default_results_path() -> PathBuf {
    PathBuf::from(DEFAULT_RESULTS_PATH)
}

/// Default regression limits document.
fn default_thresholds_path() -> PathBuf {
    PathBuf::from(DEFAULT_THRESHOLDS_PATH)
}

/// Default quick-gate limits document.
fn default_quick_thresholds_path() -> PathBuf {
    PathBuf::from(DEFAULT_QUICK_THRESHOLDS_PATH)
}

/// Default server program.
fn default_server_program() -> String {
    ServerLauncher::default().program
}

/// Default server arguments.
fn default_server_args() -> Vec<String> {
    ServerLauncher::default().args
}

/// Event logging is on unless disabled.
const fn default_events_enabled() -> bool {
    true
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use std::path::Path;
    use std::path::PathBuf;
    use std::time::Duration;

    use fedis_bench_core::KeyMode;
    use fedis_bench_core::ServerLauncher;
    use fedis_bench_core::SuitePlan;

    use super::BenchConfig;
    use super::ConfigError;
    use super::MAX_LATENCY_SAMPLES;
    use super::MAX_RUNS;

    #[test]
    fn empty_toml_matches_defaults() {
        let config: BenchConfig = toml::from_str("").unwrap();
        assert_eq!(config, BenchConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults_build_the_documented_plan() {
        let plan = BenchConfig::default().suite_plan();
        assert_eq!(plan.port, 6412);
        assert_eq!(plan.clients, 16);
        assert_eq!(plan.duration, Duration::from_secs(2));
        assert_eq!(plan.runs, 3);
        assert_eq!(plan.warmup, Duration::from_millis(500));
        assert_eq!(plan.latency_samples, 200);
        assert_eq!(plan.mode, KeyMode::Sharded);
        assert_eq!(plan.results_path, PathBuf::from("benchmarks/latest_results.json"));
    }

    #[test]
    fn toml_overrides_nested_sections() {
        let config: BenchConfig = toml::from_str(
            r#"
            clients = 8
            mode = "hotkey"
            warmup_ms = 0
            project_root = "/srv/fedis"

            [server]
            program = "target/release/fedis"
            args = []

            [events]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.clients, 8);
        assert_eq!(config.mode, KeyMode::HotKey);
        assert_eq!(config.suite_plan().warmup, Duration::ZERO);
        assert_eq!(config.results_path(), Path::new("/srv/fedis/benchmarks/latest_results.json"));
        let launcher = config.launcher();
        assert_eq!(launcher.program, "target/release/fedis");
        assert!(launcher.args.is_empty());
        assert_eq!(launcher.working_dir, Some(PathBuf::from("/srv/fedis")));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<BenchConfig, _> = toml::from_str("clinets = 4");
        assert!(result.is_err());
    }

    #[test]
    fn defaults_track_the_core_plan_and_launcher() {
        let config = BenchConfig::default();
        assert_eq!(config.suite_plan(), SuitePlan::default());
        let launcher = ServerLauncher::default();
        assert_eq!(config.server.program, launcher.program);
        assert_eq!(config.server.args, launcher.args);
    }

    #[test]
    fn validation_caps_runs_and_latency_samples() {
        let mut config = BenchConfig {
            runs: MAX_RUNS,
            latency_samples: MAX_LATENCY_SAMPLES,
            ..BenchConfig::default()
        };
        assert!(config.validate().is_ok());
        config.runs = MAX_RUNS + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(message)) if message.contains("runs must be between")
        ));
        config.runs = MAX_RUNS;
        config.latency_samples = MAX_LATENCY_SAMPLES + 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(message))
                if message.contains("latency_samples must be between")
        ));
    }

    #[test]
    fn validation_rejects_zero_values() {
        let mut config = BenchConfig {
            runs: 0,
            ..BenchConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid(message)) if message.contains("runs")
        ));
        config.runs = 1;
        config.clients = 0;
        assert!(config.validate().is_err());
        config.clients = 1;
        config.server.program = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_file_is_read_and_size_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bench.toml");
        std::fs::write(&path, "port = 7000\nruns = 5\n").unwrap();
        let config = BenchConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.runs, 5);

        let oversized = dir.path().join("huge.toml");
        std::fs::write(&oversized, vec![b'#'; super::MAX_CONFIG_FILE_SIZE + 1]).unwrap();
        assert!(matches!(BenchConfig::from_file(&oversized), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn disabled_events_use_noop_sink() {
        let mut config = BenchConfig::default();
        config.events.enabled = false;
        assert!(config.event_sink().is_ok());
        let dir = tempfile::tempdir().unwrap();
        config.events.enabled = true;
        config.events.path = Some(dir.path().join("events.jsonl"));
        assert!(config.event_sink().is_ok());
        assert!(dir.path().join("events.jsonl").exists());
    }
}
