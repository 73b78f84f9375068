// crates/fedis-bench-core/src/lib.rs
// ============================================================================
// Module: Fedis Bench Core Library
// Description: Public API surface for the fedis benchmark harness.
// Purpose: Expose load generation, server lifecycle, records, and gating.
// Dependencies: crate::{protocol, transport, process, load, latency, gate, suite}
// ============================================================================

//! ## Overview
//! Fedis bench core drives a wire-protocol key/value server through
//! closed-loop load: it spawns the server, waits for readiness, measures
//! single- and multi-connection throughput and round-trip latency, reduces
//! repeated runs to medians, persists the results, and gates them against
//! regression limits. Everything is synchronous; concurrency uses scoped
//! threads.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod aggregate;
pub mod events;
pub mod gate;
pub mod latency;
pub mod load;
pub mod process;
pub mod protocol;
pub mod readiness;
pub mod record;
pub mod store;
pub mod suite;
pub mod transport;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use aggregate::AggregateError;
pub use aggregate::RunAggregator;
pub use aggregate::ThroughputResult;
pub use events::BenchEvent;
pub use events::BenchEventSink;
pub use events::FileEventSink;
pub use events::NoopEventSink;
pub use events::OperationKind;
pub use events::Phase;
pub use events::StderrEventSink;
pub use gate::GateError;
pub use gate::GatePass;
pub use gate::GateReport;
pub use gate::MetricBound;
pub use gate::MetricCheck;
pub use latency::LatencyDistribution;
pub use latency::LatencyError;
pub use load::ConcurrentRun;
pub use load::KeyMode;
pub use process::ProcessError;
pub use process::ServerLauncher;
pub use process::ServerProcess;
pub use protocol::Command;
pub use protocol::ProtocolError;
pub use protocol::WireRequest;
pub use readiness::ReadinessError;
pub use readiness::ReadinessPolicy;
pub use readiness::ReadinessProbe;
pub use record::MetricsRecord;
pub use record::QuickThresholds;
pub use record::ThresholdRecord;
pub use store::StoreError;
pub use suite::ConcurrentReport;
pub use suite::HarnessError;
pub use suite::QuickReport;
pub use suite::SuitePlan;
pub use transport::BenchConnection;
pub use transport::Connector;
pub use transport::MeasureError;
pub use transport::TcpConnector;
pub use transport::Transport;
