// crates/fedis-bench-cli/src/main.rs
// ============================================================================
// Module: Fedis Bench CLI Entry Point
// Description: Command dispatcher for benchmark runs and the regression gate.
// Purpose: Run suites, quick gates, concurrent cases, and regression checks.
// Dependencies: clap, fedis-bench-config, fedis-bench-core, serde_json, thiserror.
// ============================================================================

//! ## Overview
//! The `fedis-bench` CLI resolves one configuration, then dispatches to a
//! harness entry point. Success paths print the key measured numbers; every
//! failure path prints a human-readable explanation to stderr and exits with
//! status 1.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use fedis_bench_config::BenchConfig;
use fedis_bench_core::GateError;
use fedis_bench_core::GatePass;
use fedis_bench_core::KeyMode;
use fedis_bench_core::SuitePlan;
use fedis_bench_core::gate::check;
use fedis_bench_core::store::load_quick_thresholds;
use fedis_bench_core::suite::persist_record;
use fedis_bench_core::suite::run_concurrent_case;
use fedis_bench_core::suite::run_quick;
use fedis_bench_core::suite::run_suite;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "fedis-bench", version, disable_help_subcommand = true)]
struct Cli {
    /// Optional config file path (defaults to `FEDIS_BENCH_CONFIG` or built-ins).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full suite and persist the results.
    Suite(SuiteCommand),
    /// Measure single-connection SET/GET against the quick limits.
    Quick(QuickCommand),
    /// Measure one concurrent SET/GET case.
    Concurrent(ConcurrentCommand),
    /// Gate the latest results against the regression limits.
    Check(CheckCommand),
}

/// Arguments for `suite`.
#[derive(Args, Debug)]
struct SuiteCommand {
    /// Results document to write (overrides the configured path).
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,
}

/// Arguments for `quick`.
#[derive(Args, Debug)]
struct QuickCommand {
    /// Quick limits document (overrides the configured path).
    #[arg(long, value_name = "PATH")]
    thresholds: Option<PathBuf>,
}

/// Arguments for `concurrent`.
#[derive(Args, Debug)]
struct ConcurrentCommand {
    /// Worker count (overrides the configured value).
    #[arg(long, value_name = "N")]
    clients: Option<usize>,
    /// Seconds per measurement (overrides the configured value).
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,
    /// Key distribution: `sharded` or `hotkey`.
    #[arg(long, value_name = "MODE")]
    mode: Option<KeyMode>,
}

/// Arguments for `check`.
#[derive(Args, Debug)]
struct CheckCommand {
    /// Results document to gate (overrides the configured path).
    #[arg(long, value_name = "PATH")]
    results: Option<PathBuf>,
    /// Regression limits document (overrides the configured path).
    #[arg(long, value_name = "PATH")]
    thresholds: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying the final stderr message.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Parses arguments, loads configuration, and dispatches.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = BenchConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    match cli.command {
        Commands::Suite(command) => command_suite(&config, &command),
        Commands::Quick(command) => command_quick(&config, &command),
        Commands::Concurrent(command) => command_concurrent(&config, &command),
        Commands::Check(command) => command_check(&config, &command),
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `suite`: measure everything and persist the record.
fn command_suite(config: &BenchConfig, command: &SuiteCommand) -> CliResult<ExitCode> {
    let mut plan = config.suite_plan();
    if let Some(output) = &command.output {
        plan.results_path = config.resolve(output);
    }
    let sink = config.event_sink().map_err(|err| CliError::new(err.to_string()))?;
    let record = run_suite(&config.launcher(), &plan, sink.as_ref())
        .map_err(|err| CliError::new(format!("benchmark suite failed: {err}")))?;
    persist_record(&record, &plan.results_path, sink.as_ref())
        .map_err(|err| CliError::new(format!("failed to save results: {err}")))?;
    let rendered = serde_json::to_string_pretty(&record)
        .map_err(|err| CliError::new(format!("failed to render results: {err}")))?;
    stdout_line(&rendered)?;
    stdout_line(&format!("saved results: {}", plan.results_path.display()))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `quick`: single-connection SET/GET gated by the quick limits.
fn command_quick(config: &BenchConfig, command: &QuickCommand) -> CliResult<ExitCode> {
    let path = command
        .thresholds
        .as_deref()
        .map_or_else(|| config.quick_thresholds_path(), |path| config.resolve(path));
    let thresholds = load_quick_thresholds(&path)
        .map_err(|err| CliError::new(format!("failed to load quick thresholds: {err}")))?;
    let sink = config.event_sink().map_err(|err| CliError::new(err.to_string()))?;
    let report = run_quick(&config.launcher(), config.port, &thresholds, sink.as_ref())
        .map_err(|err| CliError::new(format!("quick benchmark failed: {err}")))?;
    stdout_line(&format!("SET ops/sec: {:.0}", report.set_ops_sec))?;
    stdout_line(&format!("GET ops/sec: {:.0}", report.get_ops_sec))?;
    if report.report.passed() {
        return Ok(ExitCode::SUCCESS);
    }
    for violation in &report.report.violations {
        stderr_line(violation)?;
    }
    Ok(ExitCode::FAILURE)
}

/// Executes `concurrent`: one concurrent SET/GET case.
fn command_concurrent(config: &BenchConfig, command: &ConcurrentCommand) -> CliResult<ExitCode> {
    let plan = concurrent_plan(config, command)?;
    let sink = config.event_sink().map_err(|err| CliError::new(err.to_string()))?;
    let report = run_concurrent_case(&config.launcher(), &plan, sink.as_ref())
        .map_err(|err| CliError::new(format!("concurrent benchmark failed: {err}")))?;
    stdout_line(&format!(
        "clients={} duration={}s mode={}",
        report.clients,
        report.duration.as_secs(),
        report.mode
    ))?;
    stdout_line(&format!("SET ops/sec: {:.0}", report.set_ops_sec))?;
    stdout_line(&format!("GET ops/sec: {:.0}", report.get_ops_sec))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `check`: the regression gate.
fn command_check(config: &BenchConfig, command: &CheckCommand) -> CliResult<ExitCode> {
    let results = override_path(config, command.results.as_deref(), config.results_path());
    let thresholds =
        override_path(config, command.thresholds.as_deref(), config.thresholds_path());
    match check(&results, &thresholds) {
        Ok(pass) => {
            for line in pass_summary(&pass) {
                stdout_line(&line)?;
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(GateError::RegressionFailure {
            violations,
        }) => {
            stderr_line("performance regression check failed")?;
            for violation in &violations {
                stderr_line(&format!("- {violation}"))?;
            }
            Ok(ExitCode::FAILURE)
        }
        Err(GateError::MissingResults {
            path,
            remediation,
        }) => Err(CliError::new(format!(
            "missing benchmark results: {}\n{remediation}",
            path.display()
        ))),
        Err(err) => Err(CliError::new(format!("regression check failed: {err}"))),
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Applies `concurrent` overrides on top of the configured plan.
fn concurrent_plan(
    config: &BenchConfig,
    command: &ConcurrentCommand,
) -> CliResult<SuitePlan> {
    let mut plan = config.suite_plan();
    if let Some(clients) = command.clients {
        if clients == 0 {
            return Err(CliError::new("--clients must be greater than zero".to_string()));
        }
        plan.clients = clients;
    }
    if let Some(duration) = command.duration {
        if duration == 0 {
            return Err(CliError::new("--duration must be greater than zero".to_string()));
        }
        plan.duration = Duration::from_secs(duration);
    }
    if let Some(mode) = command.mode {
        plan.mode = mode;
    }
    Ok(plan)
}

/// Resolves an optional CLI path against the project root.
fn override_path(config: &BenchConfig, path: Option<&Path>, configured: PathBuf) -> PathBuf {
    path.map_or(configured, |path| config.resolve(path))
}

/// Renders the pass summary lines for `check`.
fn pass_summary(pass: &GatePass) -> [String; 4] {
    [
        "performance regression check passed".to_string(),
        format!(
            "single set/get: {:.0}/{:.0} ops/sec",
            pass.single_set_ops_sec, pass.single_get_ops_sec
        ),
        format!(
            "concurrent set/get: {:.0}/{:.0} ops/sec",
            pass.concurrent_set_ops_sec, pass.concurrent_get_ops_sec
        ),
        format!("ping p99: {:.3} ms", pass.ping_p99_ms),
    ]
}

/// Writes a line to stdout, mapping failures into [`CliError`].
fn stdout_line(message: &str) -> CliResult<()> {
    write_stdout_line(message).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a line to stderr, mapping failures into [`CliError`].
fn stderr_line(message: &str) -> CliResult<()> {
    write_stderr_line(message).map_err(|err| CliError::new(output_error("stderr", &err)))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output failure message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
