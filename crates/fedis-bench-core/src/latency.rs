// crates/fedis-bench-core/src/latency.rs
// ============================================================================
// Module: Latency Sampler
// Description: Sequential round-trip timing and percentile reduction.
// Purpose: Isolate per-operation latency from queueing effects.
// Dependencies: crate::transport, serde, thiserror
// ============================================================================

//! ## Overview
//! Samples are taken strictly sequentially over one connection. Percentiles
//! index the ascending-sorted samples at `floor(count * p)`, clamped to the
//! last index; `avg_ms` is the arithmetic mean.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::transport::MeasureError;
use crate::transport::Transport;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of latency samples per distribution.
pub const DEFAULT_LATENCY_SAMPLES: usize = 200;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Percentile summary of a latency sample set, in milliseconds.
///
/// # Invariants
/// - `p50_ms <= p95_ms <= p99_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatencyDistribution {
    /// Median latency.
    pub p50_ms: f64,
    /// 95th percentile latency.
    pub p95_ms: f64,
    /// 99th percentile latency.
    pub p99_ms: f64,
    /// Mean latency.
    pub avg_ms: f64,
}

impl LatencyDistribution {
    /// Reduces raw millisecond samples to a distribution.
    ///
    /// # Errors
    ///
    /// Returns [`LatencyError`] when `samples` is empty or holds a non-finite value.
    pub fn from_samples(mut samples: Vec<f64>) -> Result<Self, LatencyError> {
        if samples.is_empty() {
            return Err(LatencyError::NoSamples);
        }
        if samples.iter().any(|value| !value.is_finite()) {
            return Err(LatencyError::NonFinite);
        }
        let total: f64 = samples.iter().sum();
        #[allow(clippy::cast_precision_loss, reason = "sample counts stay far below 2^52")]
        let avg_ms = total / samples.len() as f64;
        samples.sort_by(f64::total_cmp);
        Ok(Self {
            p50_ms: percentile(&samples, 0.50),
            p95_ms: percentile(&samples, 0.95),
            p99_ms: percentile(&samples, 0.99),
            avg_ms,
        })
    }
}

/// Latency reduction failures.
#[derive(Debug, Error)]
pub enum LatencyError {
    /// No samples were collected.
    #[error("latency distribution requires at least one sample")]
    NoSamples,
    /// A sample was NaN or infinite.
    #[error("latency samples must be finite")]
    NonFinite,
    /// A round trip failed while sampling.
    #[error("latency sampling failed: {0}")]
    Measure(#[from] MeasureError),
}

// ============================================================================
// SECTION: Sampling
// ============================================================================

/// Times `count` sequential round trips and reduces them.
///
/// # Errors
///
/// Returns [`LatencyError`] when a round trip fails or `count` is zero.
pub fn sample_latency<T: Transport>(
    transport: &mut T,
    payload: &[u8],
    count: usize,
) -> Result<LatencyDistribution, LatencyError> {
    let mut samples = Vec::with_capacity(count);
    for _ in 0 .. count {
        let started = Instant::now();
        transport.round_trip(payload)?;
        samples.push(started.elapsed().as_secs_f64() * 1_000.0);
    }
    LatencyDistribution::from_samples(samples)
}

/// Selects the value at `floor(len * p)`, clamped to the last index.
///
/// `sorted` must be non-empty and ascending.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    let last = sorted.len().saturating_sub(1);
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        reason = "floor of a non-negative product bounded by the sample count"
    )]
    let index = ((sorted.len() as f64) * p).floor() as usize;
    sorted.get(index.min(last)).copied().unwrap_or_default()
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

    use proptest::prelude::*;

    use super::LatencyDistribution;
    use super::LatencyError;
    use super::sample_latency;
    use crate::transport::MeasureError;
    use crate::transport::Transport;

    /// Transport that succeeds a fixed number of times.
    struct CountingTransport {
        /// Round trips left before failing.
        remaining: usize,
    }

    impl Transport for CountingTransport {
        fn round_trip(&mut self, _payload: &[u8]) -> Result<(), MeasureError> {
            if self.remaining == 0 {
                return Err(MeasureError::ConnectionClosed);
            }
            self.remaining -= 1;
            Ok(())
        }
    }

    #[test]
    fn percentiles_use_floor_index() {
        let samples: Vec<f64> = (1 ..= 100).map(f64::from).collect();
        let dist = LatencyDistribution::from_samples(samples).unwrap();
        assert!((dist.p50_ms - 51.0).abs() < f64::EPSILON);
        assert!((dist.p95_ms - 96.0).abs() < f64::EPSILON);
        assert!((dist.p99_ms - 100.0).abs() < f64::EPSILON);
        assert!((dist.avg_ms - 50.5).abs() < 1e-9);
    }

    #[test]
    fn single_sample_fills_every_percentile() {
        let dist = LatencyDistribution::from_samples(vec![0.25]).unwrap();
        assert!((dist.p50_ms - 0.25).abs() < f64::EPSILON);
        assert!((dist.p99_ms - 0.25).abs() < f64::EPSILON);
        assert!((dist.avg_ms - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn unsorted_input_is_sorted_before_indexing() {
        let dist = LatencyDistribution::from_samples(vec![9.0, 1.0, 5.0, 3.0]).unwrap();
        assert!((dist.p50_ms - 5.0).abs() < f64::EPSILON);
        assert!((dist.p99_ms - 9.0).abs() < f64::EPSILON);
        assert!((dist.avg_ms - 4.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_and_non_finite_inputs_are_rejected() {
        assert!(matches!(
            LatencyDistribution::from_samples(Vec::new()),
            Err(LatencyError::NoSamples)
        ));
        assert!(matches!(
            LatencyDistribution::from_samples(vec![1.0, f64::NAN]),
            Err(LatencyError::NonFinite)
        ));
    }

    #[test]
    fn sampler_counts_every_round_trip() {
        let mut transport = CountingTransport {
            remaining: 10,
        };
        let dist = sample_latency(&mut transport, b"*1\r\n$4\r\nPING\r\n", 10).unwrap();
        assert_eq!(transport.remaining, 0);
        assert!(dist.p50_ms >= 0.0);
    }

    #[test]
    fn sampler_surfaces_transport_failure() {
        let mut transport = CountingTransport {
            remaining: 3,
        };
        let result = sample_latency(&mut transport, b"PING", 5);
        assert!(matches!(result, Err(LatencyError::Measure(MeasureError::ConnectionClosed))));
    }

    #[test]
    fn sampler_keeps_timeout_distinct_from_connection_failure() {
        struct StalledTransport;

        impl Transport for StalledTransport {
            fn round_trip(&mut self, _payload: &[u8]) -> Result<(), MeasureError> {
                Err(MeasureError::ReadTimeout {
                    timeout_ms: 250,
                })
            }
        }

        let result = sample_latency(&mut StalledTransport, b"PING", 5);
        assert!(matches!(
            result,
            Err(LatencyError::Measure(MeasureError::ReadTimeout {
                timeout_ms: 250
            }))
        ));
    }

    proptest! {
        #[test]
        fn percentiles_are_monotonic(
            samples in prop::collection::vec(0.0_f64 .. 1_000.0, 1 .. 400),
        ) {
            let dist = LatencyDistribution::from_samples(samples).unwrap();
            prop_assert!(dist.p50_ms <= dist.p95_ms);
            prop_assert!(dist.p95_ms <= dist.p99_ms);
        }
    }
}
