// crates/fedis-bench-core/src/load.rs
// ============================================================================
// Module: Load Generators
// Description: Closed-loop single- and multi-connection throughput loops.
// Purpose: Count completed round trips over a fixed wall-clock duration.
// Dependencies: crate::protocol, crate::transport, serde
// ============================================================================

//! ## Overview
//! Every loop is closed: a request is sent only after the previous response
//! arrived, and loops are bounded by wall-clock duration rather than
//! operation count. The concurrent generator allocates one result slot per
//! worker before spawning and hands each worker exclusive ownership of its
//! slot, so no lock is needed; slots are read only after every worker joined.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::panic;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use serde::Deserialize;
use serde::Serialize;

use crate::protocol::WireRequest;
use crate::protocol::get_command;
use crate::protocol::set_command;
use crate::transport::Connector;
use crate::transport::MeasureError;
use crate::transport::Transport;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Lower bound on elapsed time when converting counts to rates.
pub const MIN_ELAPSED: Duration = Duration::from_millis(1);
/// Key used by single-connection workloads.
pub const SINGLE_KEY: &str = "bench:key";
/// Value written by single-connection SET workloads.
pub const SINGLE_VALUE: &str = "123";
/// Value written by concurrent SET workloads.
pub const CONCURRENT_VALUE: &str = "1";

// ============================================================================
// SECTION: Key Modes
// ============================================================================

/// Key distribution across concurrent workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyMode {
    /// Worker `i` targets `bench:key:{i mod clients}`.
    #[default]
    Sharded,
    /// Every worker targets `bench:key:0`.
    #[serde(rename = "hotkey")]
    HotKey,
}

impl KeyMode {
    /// Returns the stable label for the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sharded => "sharded",
            Self::HotKey => "hotkey",
        }
    }

    /// Returns the key worker `index` targets out of `clients` workers.
    #[must_use]
    pub fn key_for(self, index: usize, clients: usize) -> String {
        match self {
            Self::Sharded => format!("bench:key:{}", index % clients.max(1)),
            Self::HotKey => "bench:key:0".to_string(),
        }
    }

    /// Returns the SET request for worker `index`.
    #[must_use]
    pub fn set_payload(self, index: usize, clients: usize) -> WireRequest {
        set_command(&self.key_for(index, clients), CONCURRENT_VALUE)
    }

    /// Returns the GET request for worker `index`.
    #[must_use]
    pub fn get_payload(self, index: usize, clients: usize) -> WireRequest {
        get_command(&self.key_for(index, clients))
    }
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sharded" => Ok(Self::Sharded),
            "hotkey" | "hot-key" | "hot_key" => Ok(Self::HotKey),
            other => Err(format!("unknown benchmark mode `{other}` (expected sharded or hotkey)")),
        }
    }
}

// ============================================================================
// SECTION: Single Connection
// ============================================================================

/// Sends `payload` in a closed loop for `duration`; returns operations per second.
///
/// # Errors
///
/// Returns [`MeasureError`] on the first failed round trip.
pub fn run_single<T: Transport + ?Sized>(
    transport: &mut T,
    payload: &[u8],
    duration: Duration,
) -> Result<f64, MeasureError> {
    let started = Instant::now();
    let count = closed_loop(transport, payload, duration, started)?;
    Ok(ops_per_second(count, started.elapsed()))
}

/// Converts a completed-operation count into a rate.
#[must_use]
pub fn ops_per_second(count: u64, elapsed: Duration) -> f64 {
    #[allow(clippy::cast_precision_loss, reason = "operation counts stay far below 2^52")]
    let count = count as f64;
    count / elapsed.max(MIN_ELAPSED).as_secs_f64()
}

/// Round-trips until `duration` has elapsed since `started`.
fn closed_loop<T: Transport + ?Sized>(
    transport: &mut T,
    payload: &[u8],
    duration: Duration,
    started: Instant,
) -> Result<u64, MeasureError> {
    let mut count = 0u64;
    while started.elapsed() < duration {
        transport.round_trip(payload)?;
        count = count.saturating_add(1);
    }
    Ok(count)
}

// ============================================================================
// SECTION: Concurrent
// ============================================================================

/// Outcome of one concurrent measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrentRun {
    /// Summed operations divided by cohort elapsed time.
    pub ops_per_sec: f64,
    /// Summed operations across workers.
    pub total_ops: u64,
    /// Operations completed by each worker, by index.
    pub per_worker: Vec<u64>,
    /// Wall time from before the first spawn to after the last join.
    pub elapsed: Duration,
}

/// Runs `clients` closed-loop workers in parallel for `duration`.
///
/// Each worker opens its own connection and computes its own payload via
/// `payload_factory(index)`. Workers connect first, meet at a start barrier,
/// then loop independently. A worker that panics before the barrier still
/// releases it, so the cohort never waits on a dead peer.
///
/// # Errors
///
/// Returns [`MeasureError`] when `clients` is zero, a worker fails to connect
/// or round-trip, or a worker panics. Every worker is joined first.
pub fn run_concurrent<C, F>(
    connector: &C,
    payload_factory: F,
    clients: usize,
    duration: Duration,
) -> Result<ConcurrentRun, MeasureError>
where
    C: Connector,
    F: Fn(usize) -> WireRequest + Sync,
{
    if clients == 0 {
        return Err(MeasureError::InvalidPlan("client count must be at least 1".to_string()));
    }
    let mut slots = vec![0u64; clients];
    let barrier = Barrier::new(clients);
    let started = Instant::now();
    let outcomes: Vec<Result<(), MeasureError>> = thread::scope(|scope| {
        let handles: Vec<_> = slots
            .iter_mut()
            .enumerate()
            .map(|(index, slot)| {
                let barrier = &barrier;
                let payload_factory = &payload_factory;
                scope.spawn(move || -> Result<(), MeasureError> {
                    let prepared =
                        panic::catch_unwind(AssertUnwindSafe(|| {
                            (payload_factory(index), connector.connect())
                        }));
                    // Every worker reaches the barrier, even one that panicked while preparing.
                    barrier.wait();
                    let (payload, connected) = prepared.unwrap_or_else(|payload| panic::resume_unwind(payload));
                    let mut transport = connected?;
                    let started = Instant::now();
                    *slot = closed_loop(&mut transport, payload.as_bytes(), duration, started)?;
                    Ok(())
                })
            })
            .collect();
        handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| {
                handle.join().unwrap_or(Err(MeasureError::WorkerPanicked {
                    index,
                }))
            })
            .collect()
    });
    let elapsed = started.elapsed();
    for outcome in outcomes {
        outcome?;
    }
    let total_ops = slots.iter().fold(0u64, |acc, count| acc.saturating_add(*count));
    Ok(ConcurrentRun {
        ops_per_sec: ops_per_second(total_ops, elapsed),
        total_ops,
        per_worker: slots,
        elapsed,
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

    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::thread;
    use std::time::Duration;

    use super::KeyMode;
    use super::ops_per_second;
    use super::run_concurrent;
    use super::run_single;
    use crate::transport::Connector;
    use crate::transport::MeasureError;
    use crate::transport::Transport;

    /// Transport that takes a fixed time per round trip.
    struct PacedTransport {
        /// Delay per round trip.
        pace: Duration,
        /// Round trips left before failing; `None` means unlimited.
        budget: Option<usize>,
    }

    impl Transport for PacedTransport {
        fn round_trip(&mut self, _payload: &[u8]) -> Result<(), MeasureError> {
            if let Some(budget) = self.budget.as_mut() {
                if *budget == 0 {
                    return Err(MeasureError::ReadTimeout {
                        timeout_ms: 2_000,
                    });
                }
                *budget -= 1;
            }
            thread::sleep(self.pace);
            Ok(())
        }
    }

    /// Connector handing out paced transports.
    struct PacedConnector {
        /// Delay per round trip.
        pace: Duration,
        /// Connections opened so far.
        opened: AtomicUsize,
        /// Connection index that fails to connect, if any.
        refuse: Option<usize>,
    }

    impl Connector for PacedConnector {
        type Transport = PacedTransport;

        fn connect(&self) -> Result<PacedTransport, MeasureError> {
            let index = self.opened.fetch_add(1, Ordering::SeqCst);
            if self.refuse == Some(index) {
                return Err(MeasureError::ConnectionFailure("refused".to_string()));
            }
            Ok(PacedTransport {
                pace: self.pace,
                budget: None,
            })
        }
    }

    #[test]
    fn key_modes_shard_or_share() {
        assert_eq!(KeyMode::Sharded.key_for(17, 16), "bench:key:1");
        assert_eq!(KeyMode::HotKey.key_for(17, 16), "bench:key:0");
        assert_eq!("HOTKEY".parse::<KeyMode>(), Ok(KeyMode::HotKey));
        assert_eq!(" sharded ".parse::<KeyMode>(), Ok(KeyMode::Sharded));
        assert!("random".parse::<KeyMode>().is_err());
    }

    #[test]
    fn ops_per_second_clamps_tiny_elapsed() {
        assert!((ops_per_second(5, Duration::ZERO) - 5_000.0).abs() < 1e-6);
        assert!((ops_per_second(300, Duration::from_secs(3)) - 100.0).abs() < 1e-9);
    }

    #[test]
    fn single_loop_is_bounded_by_duration() {
        let mut transport = PacedTransport {
            pace: Duration::from_millis(5),
            budget: None,
        };
        let rate = run_single(&mut transport, b"PING", Duration::from_millis(200)).unwrap();
        assert!(rate > 100.0 && rate <= 220.0, "rate {rate}");
    }

    #[test]
    fn single_loop_fails_on_timeout() {
        let mut transport = PacedTransport {
            pace: Duration::ZERO,
            budget: Some(3),
        };
        let result = run_single(&mut transport, b"PING", Duration::from_secs(5));
        assert!(matches!(result, Err(MeasureError::ReadTimeout { .. })));
    }

    #[test]
    fn concurrent_rate_is_sum_over_cohort_time() {
        let connector = PacedConnector {
            pace: Duration::from_millis(10),
            opened: AtomicUsize::new(0),
            refuse: None,
        };
        let clients = 4;
        let duration = Duration::from_millis(500);
        let payload = |index| KeyMode::Sharded.set_payload(index, clients);
        let run = run_concurrent(&connector, payload, clients, duration).unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), clients);
        assert_eq!(run.per_worker.len(), clients);
        assert_eq!(run.total_ops, run.per_worker.iter().sum::<u64>());
        // Each worker completes roughly 50 ops; expect about 4 * 50 / 0.5s.
        let expected = 400.0;
        assert!(
            (run.ops_per_sec - expected).abs() / expected < 0.35,
            "ops/sec {} vs expected {expected}",
            run.ops_per_sec
        );
    }

    #[test]
    fn concurrent_connect_failure_is_reported_after_join() {
        let connector = PacedConnector {
            pace: Duration::from_millis(1),
            opened: AtomicUsize::new(0),
            refuse: Some(2),
        };
        let result = run_concurrent(
            &connector,
            |index| KeyMode::HotKey.get_payload(index, 3),
            3,
            Duration::from_millis(50),
        );
        assert!(matches!(result, Err(MeasureError::ConnectionFailure(_))));
        assert_eq!(connector.opened.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn concurrent_payload_panic_is_reported_without_hanging() {
        let connector = PacedConnector {
            pace: Duration::from_millis(1),
            opened: AtomicUsize::new(0),
            refuse: None,
        };
        let payload = |index| {
            if index == 0 {
                panic!("payload factory failed for worker 0");
            }
            KeyMode::Sharded.set_payload(index, 3)
        };
        let result = run_concurrent(&connector, payload, 3, Duration::from_millis(50));
        assert!(matches!(
            result,
            Err(MeasureError::WorkerPanicked {
                index: 0
            })
        ));
    }

    #[test]
    fn concurrent_rejects_zero_clients() {
        let connector = PacedConnector {
            pace: Duration::ZERO,
            opened: AtomicUsize::new(0),
            refuse: None,
        };
        let payload = |index| KeyMode::Sharded.get_payload(index, 1);
        let result = run_concurrent(&connector, payload, 0, Duration::ZERO);
        assert!(matches!(result, Err(MeasureError::InvalidPlan(_))));
    }
}
