// crates/fedis-bench-core/src/aggregate.rs
// ============================================================================
// Module: Run Aggregator
// Description: Median-of-runs reduction for repeated measurements.
// Purpose: Suppress scheduling noise while keeping raw samples for diagnosis.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A measurement is invoked exactly `runs` times; results are kept in call
//! order next to their median. Warm-up passes run separately and never enter
//! the sample list.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of timed repetitions.
pub const DEFAULT_RUNS: usize = 3;
/// Default untimed warm-up duration.
pub const DEFAULT_WARMUP: Duration = Duration::from_millis(500);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Median plus the raw samples it was computed from.
///
/// # Invariants
/// - `median` is the median of `samples`.
/// - `samples` keeps run order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThroughputResult {
    /// Median of the samples.
    pub median: f64,
    /// Samples in run order.
    pub samples: Vec<f64>,
}

/// Aggregation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AggregateError {
    /// At least one run is required.
    #[error("run count must be at least 1")]
    ZeroRuns,
}

/// Repeats a measurement a fixed number of times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunAggregator {
    /// Number of timed runs.
    runs: usize,
}

impl RunAggregator {
    /// Creates an aggregator for `runs` repetitions.
    ///
    /// # Errors
    ///
    /// Returns [`AggregateError::ZeroRuns`] when `runs` is zero.
    pub const fn new(runs: usize) -> Result<Self, AggregateError> {
        if runs == 0 {
            return Err(AggregateError::ZeroRuns);
        }
        Ok(Self {
            runs,
        })
    }

    /// Invokes `measure` exactly `runs` times and reduces the results.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `measure`.
    pub fn repeat<E>(
        &self,
        mut measure: impl FnMut() -> Result<f64, E>,
    ) -> Result<ThroughputResult, E> {
        let mut samples = Vec::with_capacity(self.runs);
        for _ in 0 .. self.runs {
            samples.push(measure()?);
        }
        let median = median(&samples).unwrap_or_default();
        Ok(ThroughputResult {
            median,
            samples,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Runs `workload` once for `duration` and discards its result.
///
/// # Errors
///
/// Returns the workload error; warm-up failures are not ignored.
pub fn warm_up<T, E>(
    duration: Duration,
    workload: impl FnOnce(Duration) -> Result<T, E>,
) -> Result<(), E> {
    if duration.is_zero() {
        return Ok(());
    }
    workload(duration).map(|_| ())
}

/// Statistical median; the mean of the two middle values for even counts.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted.get(mid).copied()
    } else {
        let upper = sorted.get(mid)?;
        let lower = sorted.get(mid.checked_sub(1)?)?;
        Some((lower + upper) / 2.0)
    }
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

    use std::time::Duration;

    use proptest::prelude::*;

    use super::AggregateError;
    use super::RunAggregator;
    use super::ThroughputResult;
    use super::median;
    use super::warm_up;

    #[test]
    fn median_of_odd_and_even_counts() {
        assert_eq!(median(&[10.0, 20.0, 30.0]), Some(20.0));
        assert_eq!(median(&[10.0, 20.0]), Some(15.0));
        assert_eq!(median(&[30.0, 10.0, 20.0]), Some(20.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn repeat_keeps_call_order() {
        let aggregator = RunAggregator::new(3).unwrap();
        let mut values = vec![300.0, 100.0, 200.0].into_iter();
        let result: Result<ThroughputResult, ()> = aggregator.repeat(|| Ok(values.next().unwrap()));
        let result = result.unwrap();
        assert_eq!(result.samples, vec![300.0, 100.0, 200.0]);
        assert_eq!(result.median, 200.0);
    }

    #[test]
    fn repeat_invokes_exactly_runs_times() {
        let aggregator = RunAggregator::new(5).unwrap();
        let mut calls = 0;
        let result: Result<_, ()> = aggregator.repeat(|| {
            calls += 1;
            Ok(1.0)
        });
        assert!(result.is_ok());
        assert_eq!(calls, 5);
    }

    #[test]
    fn repeat_stops_on_first_error() {
        let aggregator = RunAggregator::new(3).unwrap();
        let mut calls = 0;
        let result = aggregator.repeat(|| {
            calls += 1;
            if calls == 2 { Err("boom") } else { Ok(1.0) }
        });
        assert_eq!(result, Err("boom"));
        assert_eq!(calls, 2);
    }

    #[test]
    fn zero_runs_rejected() {
        assert_eq!(RunAggregator::new(0), Err(AggregateError::ZeroRuns));
    }

    #[test]
    fn warm_up_discards_result_and_skips_zero_duration() {
        let mut seen = None;
        let outcome: Result<(), ()> = warm_up(Duration::from_millis(400), |duration| {
            seen = Some(duration);
            Ok(12_345.0)
        });
        assert_eq!(outcome, Ok(()));
        assert_eq!(seen, Some(Duration::from_millis(400)));

        let outcome: Result<(), ()> = warm_up(Duration::ZERO, |_| Err::<(), ()>(()));
        assert_eq!(outcome, Ok(()));
    }

    proptest! {
        #[test]
        fn median_lies_within_sample_range(
            values in prop::collection::vec(0.0_f64 .. 1e6, 1 .. 50),
        ) {
            let mid = median(&values).unwrap();
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(mid >= min && mid <= max);
        }
    }
}
