// crates/fedis-bench-core/src/suite.rs
// ============================================================================
// Module: Benchmark Suite
// Description: End-to-end harness runs against a freshly spawned server.
// Purpose: Sequence seeding, warm-up, measurement, and teardown.
// Dependencies: crate::load, crate::process, crate::latency, crate::gate, thiserror
// ============================================================================

//! ## Overview
//! Each entry point starts one server, measures, and stops it. The server is
//! stopped on every path: success, measurement error, or panic (through the
//! process guard). Single-connection phases share the readiness connection;
//! concurrent phases open one fresh connection per worker after it closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::aggregate::AggregateError;
use crate::aggregate::DEFAULT_RUNS;
use crate::aggregate::DEFAULT_WARMUP;
use crate::aggregate::RunAggregator;
use crate::aggregate::ThroughputResult;
use crate::aggregate::warm_up;
use crate::events::BenchEvent;
use crate::events::BenchEventSink;
use crate::events::OperationKind;
use crate::events::Phase;
use crate::gate::GateReport;
use crate::gate::MetricBound;
use crate::gate::MetricCheck;
use crate::gate::MetricKind;
use crate::gate::evaluate;
use crate::latency::DEFAULT_LATENCY_SAMPLES;
use crate::latency::LatencyError;
use crate::latency::sample_latency;
use crate::load::KeyMode;
use crate::load::SINGLE_KEY;
use crate::load::SINGLE_VALUE;
use crate::load::run_concurrent;
use crate::load::run_single;
use crate::process::ProcessError;
use crate::process::ServerLauncher;
use crate::process::ServerProcess;
use crate::protocol::get_command;
use crate::protocol::ping_command;
use crate::protocol::set_command;
use crate::record::ConcurrentMetrics;
use crate::record::MetricsRecord;
use crate::record::QuickThresholds;
use crate::record::SingleMetrics;
use crate::store::StoreError;
use crate::store::save_record;
use crate::transport::BenchConnection;
use crate::transport::DEFAULT_IO_TIMEOUT;
use crate::transport::MeasureError;
use crate::transport::TcpConnector;
use crate::transport::Transport;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default port for full suite runs.
pub const DEFAULT_SUITE_PORT: u16 = 6412;
/// Default concurrent worker count.
pub const DEFAULT_CLIENTS: usize = 16;
/// Default seconds per timed measurement.
pub const DEFAULT_DURATION: Duration = Duration::from_secs(2);
/// Default results location relative to the project root.
pub const DEFAULT_RESULTS_PATH: &str = "benchmarks/latest_results.json";
/// Value seeded before single-connection workloads.
const SEED_VALUE: &str = "0";
/// Key seeded before concurrent-only runs.
const CONCURRENT_SEED_KEY: &str = "bench:key:0";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Harness failures across every phase.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Server lifecycle failure.
    #[error(transparent)]
    Process(#[from] ProcessError),
    /// Throughput measurement failure.
    #[error(transparent)]
    Measure(#[from] MeasureError),
    /// Latency sampling failure.
    #[error(transparent)]
    Latency(#[from] LatencyError),
    /// Invalid run count.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    /// Result persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Plans and Reports
// ============================================================================

/// Parameters of a full suite run.
#[derive(Debug, Clone, PartialEq)]
pub struct SuitePlan {
    /// Server port.
    pub port: u16,
    /// Concurrent worker count.
    pub clients: usize,
    /// Duration of each timed measurement.
    pub duration: Duration,
    /// Timed repetitions per metric.
    pub runs: usize,
    /// Untimed warm-up per workload.
    pub warmup: Duration,
    /// PING latency samples.
    pub latency_samples: usize,
    /// Concurrent key distribution.
    pub mode: KeyMode,
    /// Send/receive timeout for worker connections.
    pub io_timeout: Duration,
    /// Destination of the metrics record.
    pub results_path: PathBuf,
}

impl Default for SuitePlan {
    fn default() -> Self {
        Self {
            port: DEFAULT_SUITE_PORT,
            clients: DEFAULT_CLIENTS,
            duration: DEFAULT_DURATION,
            runs: DEFAULT_RUNS,
            warmup: DEFAULT_WARMUP,
            latency_samples: DEFAULT_LATENCY_SAMPLES,
            mode: KeyMode::Sharded,
            io_timeout: DEFAULT_IO_TIMEOUT,
            results_path: PathBuf::from(DEFAULT_RESULTS_PATH),
        }
    }
}

/// Outcome of the single-connection quick gate.
#[derive(Debug, Clone, PartialEq)]
pub struct QuickReport {
    /// SET operations per second.
    pub set_ops_sec: f64,
    /// GET operations per second.
    pub get_ops_sec: f64,
    /// Verdict against the quick limits.
    pub report: GateReport,
}

/// Outcome of one concurrent SET/GET case.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrentReport {
    /// Worker count.
    pub clients: usize,
    /// Duration of each measurement.
    pub duration: Duration,
    /// Key distribution.
    pub mode: KeyMode,
    /// Aggregate SET operations per second.
    pub set_ops_sec: f64,
    /// Aggregate GET operations per second.
    pub get_ops_sec: f64,
}

// ============================================================================
// SECTION: Entry Points
// ============================================================================

/// Runs the full suite and returns the metrics record.
///
/// Sequence: start, seed, warm-up, median-of-runs SET and GET, PING latency,
/// then concurrent SET and GET median-of-runs on fresh connections.
///
/// # Errors
///
/// Returns [`HarnessError`] from the first failing phase; the server is
/// stopped before returning.
pub fn run_suite(
    launcher: &ServerLauncher,
    plan: &SuitePlan,
    sink: &dyn BenchEventSink,
) -> Result<MetricsRecord, HarnessError> {
    let aggregator = RunAggregator::new(plan.runs)?;
    with_server(launcher, plan.port, sink, |mut connection| {
        connection.round_trip(set_command(SINGLE_KEY, SEED_VALUE).as_bytes())?;
        let set = set_command(SINGLE_KEY, SINGLE_VALUE);
        let get = get_command(SINGLE_KEY);

        for (operation, payload) in [(OperationKind::Set, &set), (OperationKind::Get, &get)] {
            emit(sink, BenchEvent::new(Phase::WarmUp).operation(operation));
            warm_up(plan.warmup, |duration| {
                run_single(&mut connection, payload.as_bytes(), duration)
            })?;
        }
        let set_result =
            aggregator.repeat(|| run_single(&mut connection, set.as_bytes(), plan.duration))?;
        emit_measure(sink, OperationKind::Set, &set_result);
        let get_result =
            aggregator.repeat(|| run_single(&mut connection, get.as_bytes(), plan.duration))?;
        emit_measure(sink, OperationKind::Get, &get_result);
        let ping =
            sample_latency(&mut connection, ping_command().as_bytes(), plan.latency_samples)?;
        emit(
            sink,
            BenchEvent::new(Phase::Measure).operation(OperationKind::Ping).value(ping.p99_ms),
        );
        drop(connection);

        let connector = TcpConnector::loopback(plan.port).with_io_timeout(plan.io_timeout);
        let (clients, mode) = (plan.clients, plan.mode);
        let concurrent_set = |duration| {
            run_concurrent(&connector, |index| mode.set_payload(index, clients), clients, duration)
                .map(|run| run.ops_per_sec)
        };
        let concurrent_get = |duration| {
            run_concurrent(&connector, |index| mode.get_payload(index, clients), clients, duration)
                .map(|run| run.ops_per_sec)
        };
        emit(sink, BenchEvent::new(Phase::WarmUp).operation(OperationKind::ConcurrentSet));
        warm_up(plan.warmup, &concurrent_set)?;
        let concurrent_set_result = aggregator.repeat(|| concurrent_set(plan.duration))?;
        emit_measure(sink, OperationKind::ConcurrentSet, &concurrent_set_result);
        emit(sink, BenchEvent::new(Phase::WarmUp).operation(OperationKind::ConcurrentGet));
        warm_up(plan.warmup, &concurrent_get)?;
        let concurrent_get_result = aggregator.repeat(|| concurrent_get(plan.duration))?;
        emit_measure(sink, OperationKind::ConcurrentGet, &concurrent_get_result);

        Ok(MetricsRecord {
            single: SingleMetrics::new(set_result, get_result, ping),
            concurrent: ConcurrentMetrics::new(
                clients,
                mode,
                concurrent_set_result,
                concurrent_get_result,
            ),
        })
    })
}

/// Measures single-connection SET and GET once each and gates them.
///
/// # Errors
///
/// Returns [`HarnessError`] when the server or a measurement fails. Limit
/// violations are reported in the returned [`QuickReport`].
pub fn run_quick(
    launcher: &ServerLauncher,
    port: u16,
    thresholds: &QuickThresholds,
    sink: &dyn BenchEventSink,
) -> Result<QuickReport, HarnessError> {
    let duration = Duration::from_secs(thresholds.duration_sec);
    let (set_ops_sec, get_ops_sec) = with_server(launcher, port, sink, |mut connection| {
        connection.round_trip(set_command(SINGLE_KEY, SEED_VALUE).as_bytes())?;
        let set = set_command(SINGLE_KEY, SINGLE_VALUE);
        let set_ops_sec = run_single(&mut connection, set.as_bytes(), duration)?;
        emit_value(sink, OperationKind::Set, set_ops_sec);
        let get = get_command(SINGLE_KEY);
        let get_ops_sec = run_single(&mut connection, get.as_bytes(), duration)?;
        emit_value(sink, OperationKind::Get, get_ops_sec);
        Ok((set_ops_sec, get_ops_sec))
    })?;
    let report = evaluate(vec![
        MetricCheck {
            name: "SET ops/sec",
            kind: MetricKind::Throughput,
            measured: set_ops_sec,
            bound: MetricBound::Min(thresholds.set_ops_per_sec_min),
        },
        MetricCheck {
            name: "GET ops/sec",
            kind: MetricKind::Throughput,
            measured: get_ops_sec,
            bound: MetricBound::Min(thresholds.get_ops_per_sec_min),
        },
    ]);
    emit_verdict(sink, &report);
    Ok(QuickReport {
        set_ops_sec,
        get_ops_sec,
        report,
    })
}

/// Runs one concurrent SET and one concurrent GET measurement.
///
/// # Errors
///
/// Returns [`HarnessError`] when the server or a worker fails.
pub fn run_concurrent_case(
    launcher: &ServerLauncher,
    plan: &SuitePlan,
    sink: &dyn BenchEventSink,
) -> Result<ConcurrentReport, HarnessError> {
    with_server(launcher, plan.port, sink, |mut connection| {
        connection.round_trip(set_command(CONCURRENT_SEED_KEY, SEED_VALUE).as_bytes())?;
        drop(connection);
        let connector = TcpConnector::loopback(plan.port).with_io_timeout(plan.io_timeout);
        let (clients, mode) = (plan.clients, plan.mode);
        let set = run_concurrent(
            &connector,
            |index| mode.set_payload(index, clients),
            clients,
            plan.duration,
        )?;
        emit(
            sink,
            BenchEvent::new(Phase::Measure)
                .operation(OperationKind::ConcurrentSet)
                .value(set.ops_per_sec),
        );
        let get = run_concurrent(
            &connector,
            |index| mode.get_payload(index, clients),
            clients,
            plan.duration,
        )?;
        emit(
            sink,
            BenchEvent::new(Phase::Measure)
                .operation(OperationKind::ConcurrentGet)
                .value(get.ops_per_sec),
        );
        Ok(ConcurrentReport {
            clients,
            duration: plan.duration,
            mode,
            set_ops_sec: set.ops_per_sec,
            get_ops_sec: get.ops_per_sec,
        })
    })
}

/// Writes `record` to `path` atomically and records the persist phase.
///
/// # Errors
///
/// Returns [`HarnessError::Store`] when the document cannot be written.
pub fn persist_record(
    record: &MetricsRecord,
    path: &Path,
    sink: &dyn BenchEventSink,
) -> Result<(), HarnessError> {
    save_record(record, path)?;
    emit(sink, BenchEvent::new(Phase::Persist).message(path.display().to_string()));
    Ok(())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Starts the server, runs `body`, and stops the server on every path.
///
/// A body error takes precedence over a teardown error.
fn with_server<T>(
    launcher: &ServerLauncher,
    port: u16,
    sink: &dyn BenchEventSink,
    body: impl FnOnce(BenchConnection) -> Result<T, HarnessError>,
) -> Result<T, HarnessError> {
    emit(sink, BenchEvent::new(Phase::ServerStart).message(format!("port {port}")));
    let (mut server, connection) = launcher.start(port, &[])?;
    emit(sink, ready_event(&server));
    let outcome = body(connection);
    let stopped = server.stop();
    let teardown = match &stopped {
        Ok(Some(status)) => BenchEvent::new(Phase::Teardown).message(status.to_string()),
        Ok(None) => BenchEvent::new(Phase::Teardown),
        Err(err) => BenchEvent::new(Phase::Teardown).message(err.to_string()),
    };
    emit(sink, teardown);
    let value = outcome?;
    stopped?;
    Ok(value)
}

/// Builds the readiness event.
fn ready_event(server: &ServerProcess) -> BenchEvent {
    let event = BenchEvent::new(Phase::Ready);
    match server.pid() {
        Some(pid) => event.message(format!("pid {pid} port {}", server.port())),
        None => event,
    }
}

/// Emits a measurement event carrying the median.
fn emit_measure(sink: &dyn BenchEventSink, operation: OperationKind, result: &ThroughputResult) {
    emit_value(sink, operation, result.median);
}

/// Emits a measurement event carrying `value`.
fn emit_value(sink: &dyn BenchEventSink, operation: OperationKind, value: f64) {
    emit(sink, BenchEvent::new(Phase::Measure).operation(operation).value(value));
}

/// Emits the gate verdict.
fn emit_verdict(sink: &dyn BenchEventSink, report: &GateReport) {
    let message =
        if report.passed() { "passed".to_string() } else { report.violations.join("; ") };
    emit(sink, BenchEvent::new(Phase::Gate).message(message));
}

/// Records one event.
fn emit(sink: &dyn BenchEventSink, event: BenchEvent) {
    sink.record(&event);
}
