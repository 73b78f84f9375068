// crates/fedis-bench-core/src/readiness.rs
// ============================================================================
// Module: Readiness Probe
// Description: Bounded connect polling for a freshly spawned server.
// Purpose: Wait for the listening port without arbitrary sleeps or unbounded loops.
// Dependencies: std::net, thiserror
// ============================================================================

//! ## Overview
//! Readiness is an explicit state machine, `Connecting -> Ready | TimedOut`,
//! driven by an [`Acceptor`]. The attempt budget and per-attempt timeout are
//! parameters, so the probe can be exercised with a fake acceptor and no
//! subprocess. An acceptor may also abort early (for example when the child
//! process has already exited).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::transport::BenchConnection;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of connect attempts (about 16s with the default interval).
pub const DEFAULT_READY_ATTEMPTS: u32 = 80;
/// Default timeout for a single connect attempt.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(200);
/// Default pause between failed attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

// ============================================================================
// SECTION: Types
// ============================================================================

/// Readiness polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Maximum number of connect attempts.
    pub attempts: u32,
    /// Timeout for a single attempt.
    pub attempt_timeout: Duration,
    /// Pause between failed attempts.
    pub interval: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_READY_ATTEMPTS,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Result of a single readiness attempt.
#[derive(Debug)]
pub enum AttemptOutcome<C> {
    /// The port accepted a connection.
    Connected(C),
    /// The attempt failed; another attempt may follow.
    Retry(String),
    /// Further attempts are pointless.
    Abort(String),
}

/// Readiness state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    /// Waiting on attempt number `attempt` (1-based).
    Connecting {
        /// Attempt about to be made.
        attempt: u32,
    },
    /// A connection was accepted.
    Ready,
    /// The attempt budget was exhausted.
    TimedOut,
    /// The acceptor reported an unrecoverable condition.
    Aborted,
}

impl ReadinessState {
    /// Initial state.
    #[must_use]
    pub const fn start() -> Self {
        Self::Connecting {
            attempt: 1,
        }
    }

    /// Returns true once no more attempts will be made.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Connecting { .. })
    }

    /// Transitions after an attempt outcome under an attempt `budget`.
    #[must_use]
    pub fn advance<C>(self, outcome: &AttemptOutcome<C>, budget: u32) -> Self {
        let Self::Connecting {
            attempt,
        } = self
        else {
            return self;
        };
        match outcome {
            AttemptOutcome::Connected(_) => Self::Ready,
            AttemptOutcome::Abort(_) => Self::Aborted,
            AttemptOutcome::Retry(_) if attempt >= budget => Self::TimedOut,
            AttemptOutcome::Retry(_) => Self::Connecting {
                attempt: attempt.saturating_add(1),
            },
        }
    }
}

/// Readiness failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessError {
    /// Every attempt failed.
    #[error("not ready after {attempts} attempts: {last_error}")]
    TimedOut {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },
    /// The acceptor aborted polling.
    #[error("readiness aborted after {attempts} attempts: {reason}")]
    Aborted {
        /// Attempts made.
        attempts: u32,
        /// Abort reason.
        reason: String,
    },
    /// The policy allows no attempts at all.
    #[error("readiness policy must allow at least one attempt")]
    NoAttempts,
}

// ============================================================================
// SECTION: Interfaces
// ============================================================================

/// Something that can be polled for an accepted connection.
pub trait Acceptor {
    /// Connection produced on success.
    type Connection;

    /// Makes a single attempt bounded by `timeout`.
    fn attempt(&mut self, timeout: Duration) -> AttemptOutcome<Self::Connection>;
}

// ============================================================================
// SECTION: Probe
// ============================================================================

/// Drives an [`Acceptor`] through the readiness state machine.
#[derive(Debug, Clone, Copy)]
pub struct ReadinessProbe {
    /// Polling parameters.
    policy: ReadinessPolicy,
}

impl ReadinessProbe {
    /// Creates a probe for `policy`.
    #[must_use]
    pub const fn new(policy: ReadinessPolicy) -> Self {
        Self {
            policy,
        }
    }

    /// Polls until the acceptor connects, aborts, or the budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`ReadinessError`] when no connection was accepted.
    pub fn wait<A: Acceptor>(&self, acceptor: &mut A) -> Result<A::Connection, ReadinessError> {
        if self.policy.attempts == 0 {
            return Err(ReadinessError::NoAttempts);
        }
        let mut state = ReadinessState::start();
        let mut attempts = 0u32;
        loop {
            attempts = attempts.saturating_add(1);
            let outcome = acceptor.attempt(self.policy.attempt_timeout);
            state = state.advance(&outcome, self.policy.attempts);
            match (state.clone(), outcome) {
                (ReadinessState::Ready, AttemptOutcome::Connected(connection)) => {
                    return Ok(connection);
                }
                (ReadinessState::Aborted, AttemptOutcome::Abort(reason)) => {
                    return Err(ReadinessError::Aborted {
                        attempts,
                        reason,
                    });
                }
                (ReadinessState::TimedOut, AttemptOutcome::Retry(last_error)) => {
                    return Err(ReadinessError::TimedOut {
                        attempts,
                        last_error,
                    });
                }
                _ => thread::sleep(self.policy.interval),
            }
        }
    }
}

// ============================================================================
// SECTION: TCP Acceptor
// ============================================================================

/// Acceptor that connects to a TCP address.
#[derive(Debug, Clone, Copy)]
pub struct TcpAcceptor {
    /// Address polled for readiness.
    addr: SocketAddr,
    /// Send/receive timeout applied to the accepted connection.
    io_timeout: Duration,
}

impl TcpAcceptor {
    /// Creates an acceptor polling `127.0.0.1:port`.
    #[must_use]
    pub fn loopback(port: u16, io_timeout: Duration) -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
            io_timeout,
        }
    }
}

impl Acceptor for TcpAcceptor {
    type Connection = BenchConnection;

    fn attempt(&mut self, timeout: Duration) -> AttemptOutcome<BenchConnection> {
        match BenchConnection::connect(self.addr, timeout, self.io_timeout) {
            Ok(connection) => AttemptOutcome::Connected(connection),
            Err(err) => AttemptOutcome::Retry(err.to_string()),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
