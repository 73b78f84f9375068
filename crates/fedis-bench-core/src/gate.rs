// crates/fedis-bench-core/src/gate.rs
// ============================================================================
// Module: Regression Gate
// Description: Compares a persisted metrics record against regression limits.
// Purpose: Produce a pass/fail verdict that names every violated metric.
// Dependencies: crate::record, crate::store, thiserror
// ============================================================================

//! ## Overview
//! The gate evaluates every configured limit and collects all violations
//! instead of stopping at the first one. Comparisons are strict: a measured
//! value equal to its limit passes. A missing results file fails before
//! thresholds are read and carries a remediation hint.
//!
//! Security posture: inputs are local files; malformed documents fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use thiserror::Error;

use crate::record::MetricsRecord;
use crate::record::ThresholdRecord;
use crate::store::StoreError;
use crate::store::load_record;
use crate::store::load_thresholds;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Remediation printed when no results file exists.
pub const MISSING_RESULTS_REMEDIATION: &str = "run: fedis-bench suite";

// ============================================================================
// SECTION: Checks
// ============================================================================

/// Direction of a limit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricBound {
    /// Measured value must not fall below the limit.
    Min(f64),
    /// Measured value must not exceed the limit.
    Max(f64),
}

/// How a metric's values are rendered in messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Operations per second, whole numbers.
    Throughput,
    /// Milliseconds, three decimals.
    LatencyMs,
}

/// One measured value paired with its limit.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricCheck {
    /// Human-readable metric name.
    pub name: &'static str,
    /// Rendering of the values.
    pub kind: MetricKind,
    /// Value from the metrics record.
    pub measured: f64,
    /// Configured limit.
    pub bound: MetricBound,
}

impl MetricCheck {
    /// Returns true when the measured value is strictly outside the limit.
    #[must_use]
    pub fn violated(&self) -> bool {
        match self.bound {
            MetricBound::Min(min) => self.measured < min,
            MetricBound::Max(max) => self.measured > max,
        }
    }

    /// Describes the violation, naming the metric and both values.
    #[must_use]
    pub fn describe(&self) -> String {
        let measured = self.render(self.measured);
        match self.bound {
            MetricBound::Min(min) => {
                format!("{} too low: {measured} < {}", self.name, self.render(min))
            }
            MetricBound::Max(max) => {
                format!("{} too high: {measured} > {}", self.name, self.render(max))
            }
        }
    }

    /// Formats a value for this metric.
    fn render(&self, value: f64) -> String {
        match self.kind {
            MetricKind::Throughput => format!("{value:.0}"),
            MetricKind::LatencyMs => format!("{value:.3}ms"),
        }
    }
}

/// Outcome of evaluating a set of checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateReport {
    /// Every check that was evaluated, in order.
    pub checks: Vec<MetricCheck>,
    /// Descriptions of every violated check, in check order.
    pub violations: Vec<String>,
}

impl GateReport {
    /// Returns true when no check was violated.
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Evaluates every check and collects all violations.
#[must_use]
pub fn evaluate(checks: Vec<MetricCheck>) -> GateReport {
    let violations =
        checks.iter().filter(|check| check.violated()).map(MetricCheck::describe).collect();
    GateReport {
        checks,
        violations,
    }
}

/// Builds the configured checks for `record` in fixed order.
///
/// Order: single SET, single GET, single PING p99, concurrent SET, concurrent GET.
/// Limits absent from `thresholds` produce no check.
#[must_use]
pub fn checks_for(record: &MetricsRecord, thresholds: &ThresholdRecord) -> Vec<MetricCheck> {
    let candidates = [
        (
            "single set ops/sec",
            MetricKind::Throughput,
            record.single.set_ops_sec_median,
            thresholds.single.set_ops_sec_min.map(MetricBound::Min),
        ),
        (
            "single get ops/sec",
            MetricKind::Throughput,
            record.single.get_ops_sec_median,
            thresholds.single.get_ops_sec_min.map(MetricBound::Min),
        ),
        (
            "single ping p99",
            MetricKind::LatencyMs,
            record.single.ping_latency_ms.p99_ms,
            thresholds.single.ping_p99_ms_max.map(MetricBound::Max),
        ),
        (
            "concurrent set ops/sec",
            MetricKind::Throughput,
            record.concurrent.set_ops_sec_median,
            thresholds.concurrent.set_ops_sec_min.map(MetricBound::Min),
        ),
        (
            "concurrent get ops/sec",
            MetricKind::Throughput,
            record.concurrent.get_ops_sec_median,
            thresholds.concurrent.get_ops_sec_min.map(MetricBound::Min),
        ),
    ];
    candidates
        .into_iter()
        .filter_map(|(name, kind, measured, bound)| {
            bound.map(|bound| MetricCheck {
                name,
                kind,
                measured,
                bound,
            })
        })
        .collect()
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Key metrics reported when the gate passes.
#[derive(Debug, Clone, PartialEq)]
pub struct GatePass {
    /// Median single-connection SET rate.
    pub single_set_ops_sec: f64,
    /// Median single-connection GET rate.
    pub single_get_ops_sec: f64,
    /// Median concurrent SET rate.
    pub concurrent_set_ops_sec: f64,
    /// Median concurrent GET rate.
    pub concurrent_get_ops_sec: f64,
    /// PING p99 latency in milliseconds.
    pub ping_p99_ms: f64,
    /// Full evaluation report.
    pub report: GateReport,
}

/// Regression gate failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GateError {
    /// No results file exists yet.
    #[error("missing benchmark results: {}", path.display())]
    MissingResults {
        /// Expected results path.
        path: PathBuf,
        /// Command that produces the results.
        remediation: String,
    },
    /// One or more metrics violated their limits.
    #[error("performance regression check failed ({} violation(s))", violations.len())]
    RegressionFailure {
        /// Every violated metric, in check order.
        violations: Vec<String>,
    },
    /// A results or thresholds document was unreadable.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Gates the results at `latest_path` against the limits at `thresholds_path`.
///
/// # Errors
///
/// Returns [`GateError::MissingResults`] when no results exist,
/// [`GateError::RegressionFailure`] listing every violation, or
/// [`GateError::Store`] when either document cannot be read.
pub fn check(latest_path: &Path, thresholds_path: &Path) -> Result<GatePass, GateError> {
    let record = match load_record(latest_path) {
        Ok(record) => record,
        Err(StoreError::Missing {
            path,
        }) => {
            return Err(GateError::MissingResults {
                path,
                remediation: MISSING_RESULTS_REMEDIATION.to_string(),
            });
        }
        Err(err) => return Err(GateError::Store(err)),
    };
    let thresholds = load_thresholds(thresholds_path)?;
    let report = evaluate(checks_for(&record, &thresholds));
    if !report.passed() {
        return Err(GateError::RegressionFailure {
            violations: report.violations,
        });
    }
    Ok(GatePass {
        single_set_ops_sec: record.single.set_ops_sec_median,
        single_get_ops_sec: record.single.get_ops_sec_median,
        concurrent_set_ops_sec: record.concurrent.set_ops_sec_median,
        concurrent_get_ops_sec: record.concurrent.get_ops_sec_median,
        ping_p99_ms: record.single.ping_latency_ms.p99_ms,
        report,
    })
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

    use super::MetricBound;
    use super::MetricCheck;
    use super::MetricKind;
    use super::evaluate;

    fn throughput(measured: f64, min: f64) -> MetricCheck {
        MetricCheck {
            name: "single set ops/sec",
            kind: MetricKind::Throughput,
            measured,
            bound: MetricBound::Min(min),
        }
    }

    #[test]
    fn equality_passes_both_bounds() {
        assert!(!throughput(1_000.0, 1_000.0).violated());
        let latency = MetricCheck {
            name: "single ping p99",
            kind: MetricKind::LatencyMs,
            measured: 2.5,
            bound: MetricBound::Max(2.5),
        };
        assert!(!latency.violated());
    }

    #[test]
    fn describe_names_metric_and_values() {
        assert_eq!(throughput(899.6, 1_000.0).describe(), "single set ops/sec too low: 900 < 1000");
        let latency = MetricCheck {
            name: "single ping p99",
            kind: MetricKind::LatencyMs,
            measured: 3.25,
            bound: MetricBound::Max(2.0),
        };
        assert_eq!(latency.describe(), "single ping p99 too high: 3.250ms > 2.000ms");
    }

    #[test]
    fn evaluate_collects_every_violation() {
        let report =
            evaluate(vec![throughput(10.0, 20.0), throughput(30.0, 20.0), throughput(5.0, 6.0)]);
        assert!(!report.passed());
        assert_eq!(report.checks.len(), 3);
        assert_eq!(report.violations.len(), 2);
    }
}
