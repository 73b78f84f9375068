// crates/fedis-bench-core/src/record.rs
// ============================================================================
// Module: Benchmark Records
// Description: Persisted metrics and threshold documents.
// Purpose: Fix the on-disk key names consumed by the regression gate.
// Dependencies: crate::aggregate, crate::latency, crate::load, serde
// ============================================================================

//! ## Overview
//! [`MetricsRecord`] is the full suite output. [`ThresholdRecord`] holds the
//! regression limits; every limit is optional and an absent limit skips its
//! metric. [`QuickThresholds`] backs the single-connection quick gate.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::aggregate::ThroughputResult;
use crate::latency::LatencyDistribution;
use crate::load::KeyMode;

// ============================================================================
// SECTION: Metrics
// ============================================================================

/// Output of one full benchmark suite run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Single-connection measurements.
    pub single: SingleMetrics,
    /// Multi-connection measurements.
    pub concurrent: ConcurrentMetrics,
}

/// Single-connection throughput and latency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleMetrics {
    /// Median SET operations per second.
    pub set_ops_sec_median: f64,
    /// SET samples in run order.
    pub set_ops_sec_runs: Vec<f64>,
    /// Median GET operations per second.
    pub get_ops_sec_median: f64,
    /// GET samples in run order.
    pub get_ops_sec_runs: Vec<f64>,
    /// PING round-trip latency.
    pub ping_latency_ms: LatencyDistribution,
}

impl SingleMetrics {
    /// Assembles single-connection metrics from aggregated results.
    #[must_use]
    pub fn new(set: ThroughputResult, get: ThroughputResult, ping: LatencyDistribution) -> Self {
        Self {
            set_ops_sec_median: set.median,
            set_ops_sec_runs: set.samples,
            get_ops_sec_median: get.median,
            get_ops_sec_runs: get.samples,
            ping_latency_ms: ping,
        }
    }
}

/// Multi-connection throughput.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrentMetrics {
    /// Worker count.
    pub clients: usize,
    /// Key distribution used by the workers.
    #[serde(default)]
    pub mode: KeyMode,
    /// Median aggregate SET operations per second.
    pub set_ops_sec_median: f64,
    /// SET samples in run order.
    pub set_ops_sec_runs: Vec<f64>,
    /// Median aggregate GET operations per second.
    pub get_ops_sec_median: f64,
    /// GET samples in run order.
    pub get_ops_sec_runs: Vec<f64>,
}

impl ConcurrentMetrics {
    /// Assembles concurrent metrics from aggregated results.
    #[must_use]
    pub fn new(
        clients: usize,
        mode: KeyMode,
        set: ThroughputResult,
        get: ThroughputResult,
    ) -> Self {
        Self {
            clients,
            mode,
            set_ops_sec_median: set.median,
            set_ops_sec_runs: set.samples,
            get_ops_sec_median: get.median,
            get_ops_sec_runs: get.samples,
        }
    }
}

// ============================================================================
// SECTION: Thresholds
// ============================================================================

/// Regression limits; absent limits are not checked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRecord {
    /// Measurement duration the limits were calibrated for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<u64>,
    /// Single-connection limits.
    #[serde(default)]
    pub single: SingleThresholds,
    /// Multi-connection limits.
    #[serde(default)]
    pub concurrent: ConcurrentThresholds,
}

/// Single-connection limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SingleThresholds {
    /// Minimum median SET rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_ops_sec_min: Option<f64>,
    /// Minimum median GET rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get_ops_sec_min: Option<f64>,
    /// Maximum PING p99 latency in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ping_p99_ms_max: Option<f64>,
}

/// Multi-connection limits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConcurrentThresholds {
    /// Minimum median aggregate SET rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_ops_sec_min: Option<f64>,
    /// Minimum median aggregate GET rate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get_ops_sec_min: Option<f64>,
}

/// Limits for the single-connection quick gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickThresholds {
    /// Seconds per measurement.
    pub duration_sec: u64,
    /// Minimum SET rate.
    pub set_ops_per_sec_min: f64,
    /// Minimum GET rate.
    pub get_ops_per_sec_min: f64,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
