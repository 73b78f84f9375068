// crates/fedis-bench-core/src/events.rs
// ============================================================================
// Module: Benchmark Events
// Description: Structured JSON-line events for harness phases.
// Purpose: Trace server lifecycle and measurements without a logging runtime.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Each harness phase emits a [`BenchEvent`] through a [`BenchEventSink`].
//! Sinks serialize one JSON object per line. Emission never fails the run:
//! serialization and write errors are dropped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Harness phase an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Server subprocess spawned.
    ServerStart,
    /// Server accepted its first connection.
    Ready,
    /// Untimed warm-up pass.
    WarmUp,
    /// Timed measurement.
    Measure,
    /// Server teardown.
    Teardown,
    /// Results written to disk.
    Persist,
    /// Regression verdict.
    Gate,
}

/// Workload an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Single-connection SET.
    Set,
    /// Single-connection GET.
    Get,
    /// PING latency sampling.
    Ping,
    /// Multi-connection SET.
    ConcurrentSet,
    /// Multi-connection GET.
    ConcurrentGet,
}

/// Harness event payload.
#[derive(Debug, Clone, Serialize)]
pub struct BenchEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Phase the event belongs to.
    pub phase: Phase,
    /// Workload when the event concerns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationKind>,
    /// Measured value (ops/sec or milliseconds) when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Free-form detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl BenchEvent {
    /// Creates an event for `phase` stamped with the current time.
    #[must_use]
    pub fn new(phase: Phase) -> Self {
        Self {
            event: "fedis_bench",
            timestamp_ms: now_ms(),
            phase,
            operation: None,
            value: None,
            message: None,
        }
    }

    /// Attaches the workload.
    #[must_use]
    pub fn operation(mut self, operation: OperationKind) -> Self {
        self.operation = Some(operation);
        self
    }

    /// Attaches a measured value.
    #[must_use]
    pub fn value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    /// Attaches a detail message.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Event sink for harness phases.
pub trait BenchEventSink: Send + Sync {
    /// Records an event.
    fn record(&self, event: &BenchEvent);
}

/// Event sink that logs JSON lines to stderr.
pub struct StderrEventSink;

impl BenchEventSink for StderrEventSink {
    fn record(&self, event: &BenchEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(io::stderr(), "{payload}");
        }
    }
}

/// Event sink that appends JSON lines to a file.
pub struct FileEventSink {
    /// File handle guarded for concurrent writes.
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    /// Opens the event log in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl BenchEventSink for FileEventSink {
    fn record(&self, event: &BenchEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op event sink.
pub struct NoopEventSink;

impl BenchEventSink for NoopEventSink {
    fn record(&self, _event: &BenchEvent) {}
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Milliseconds since the Unix epoch; zero if the clock is before it.
fn now_ms() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
