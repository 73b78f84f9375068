// crates/fedis-bench-core/src/transport.rs
// ============================================================================
// Module: Benchmark Transport
// Description: Blocking request/response connections to the server-under-test.
// Purpose: Provide the closed-loop round trip every measurement builds on.
// Dependencies: std::net, thiserror
// ============================================================================

//! ## Overview
//! A round trip writes one request and blocks until one full reply arrives.
//! Every send and receive is bounded by a timeout; a timeout is a fatal
//! measurement failure, never a retry point. Replies are framed only far
//! enough to find their end: a header line, plus the body of a bulk reply.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::time::Duration;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default send/receive timeout for benchmark connections.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(2);
/// Default connect timeout for worker connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);
/// Receive buffer size for a single read.
const RESPONSE_BUFFER_BYTES: usize = 1024;
/// Reply header bytes retained for bulk length parsing.
const MAX_HEADER_BYTES: usize = 32;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Measurement-phase failures.
///
/// # Invariants
/// - None of these are absorbed into operation counts.
#[derive(Debug, Error)]
pub enum MeasureError {
    /// Connecting, sending, or receiving failed.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),
    /// A send or receive exceeded its timeout.
    #[error("read timeout after {timeout_ms}ms")]
    ReadTimeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u128,
    },
    /// The peer closed the connection mid-measurement.
    #[error("connection closed by server")]
    ConnectionClosed,
    /// The measurement parameters are unusable.
    #[error("invalid measurement plan: {0}")]
    InvalidPlan(String),
    /// A concurrent worker panicked before reporting.
    #[error("worker {index} panicked")]
    WorkerPanicked {
        /// Worker slot index.
        index: usize,
    },
}

// ============================================================================
// SECTION: Interfaces
// ============================================================================

/// A connection able to perform one closed-loop round trip.
pub trait Transport {
    /// Sends `payload` and blocks until a response has been received.
    ///
    /// # Errors
    ///
    /// Returns [`MeasureError`] when the send or receive fails or times out.
    fn round_trip(&mut self, payload: &[u8]) -> Result<(), MeasureError>;
}

/// Opens fresh transports, one per concurrent worker.
pub trait Connector: Sync {
    /// Transport produced by this connector.
    type Transport: Transport;

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Returns [`MeasureError`] when the connection cannot be established.
    fn connect(&self) -> Result<Self::Transport, MeasureError>;
}

// ============================================================================
// SECTION: TCP Connection
// ============================================================================

/// Blocking TCP connection with bounded send/receive.
#[derive(Debug)]
pub struct BenchConnection {
    /// Underlying stream.
    stream: TcpStream,
    /// Receive scratch buffer.
    buffer: Vec<u8>,
    /// Timeout applied to reads and writes.
    io_timeout: Duration,
}

impl BenchConnection {
    /// Wraps a connected stream, applying timeouts and `TCP_NODELAY`.
    ///
    /// # Errors
    ///
    /// Returns [`MeasureError::ConnectionFailure`] when socket options cannot be set.
    pub fn from_stream(stream: TcpStream, io_timeout: Duration) -> Result<Self, MeasureError> {
        stream.set_read_timeout(Some(io_timeout)).map_err(connection_failure)?;
        stream.set_write_timeout(Some(io_timeout)).map_err(connection_failure)?;
        stream.set_nodelay(true).map_err(connection_failure)?;
        Ok(Self {
            stream,
            buffer: vec![0; RESPONSE_BUFFER_BYTES],
            io_timeout,
        })
    }

    /// Connects to `addr` within `connect_timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`MeasureError`] when the connect fails or times out.
    pub fn connect(
        addr: SocketAddr,
        connect_timeout: Duration,
        io_timeout: Duration,
    ) -> Result<Self, MeasureError> {
        let stream = TcpStream::connect_timeout(&addr, connect_timeout)
            .map_err(|err| classify(&err, connect_timeout))?;
        Self::from_stream(stream, io_timeout)
    }

    /// Reads until one complete reply has been received.
    fn read_response(&mut self) -> Result<(), MeasureError> {
        let mut scanner = ReplyScanner::default();
        loop {
            let read =
                self.stream.read(&mut self.buffer).map_err(|err| classify(&err, self.io_timeout))?;
            if read == 0 {
                return Err(MeasureError::ConnectionClosed);
            }
            if scanner.feed(self.buffer.get(.. read).unwrap_or_default()) {
                return Ok(());
            }
        }
    }
}

// ============================================================================
// SECTION: Reply Framing
// ============================================================================

/// Incremental detector for the end of one reply.
///
/// A reply is a header line ending in CRLF; a bulk header (`$<len>`) with a
/// non-negative length is followed by `len` bytes plus CRLF. Line endings
/// may be split across reads and replies may be of any size.
#[derive(Debug, Default)]
struct ReplyScanner {
    /// Leading header bytes, capped at [`MAX_HEADER_BYTES`].
    header: Vec<u8>,
    /// Last header byte seen, carried across reads.
    last: Option<u8>,
    /// Bulk body bytes (including the trailing CRLF) still expected.
    body_remaining: Option<usize>,
}

impl ReplyScanner {
    /// Consumes `bytes`; returns true once the reply is complete.
    fn feed(&mut self, bytes: &[u8]) -> bool {
        for (position, &byte) in bytes.iter().enumerate() {
            if let Some(remaining) = self.body_remaining {
                let available = bytes.len().saturating_sub(position);
                if available >= remaining {
                    return true;
                }
                self.body_remaining = Some(remaining.saturating_sub(available));
                return false;
            }
            if self.last == Some(b'\r') && byte == b'\n' {
                match self.bulk_body_len() {
                    Some(remaining) => self.body_remaining = Some(remaining),
                    None => return true,
                }
            } else if self.header.len() < MAX_HEADER_BYTES {
                self.header.push(byte);
            }
            self.last = Some(byte);
        }
        false
    }

    /// Body length of a non-null bulk reply, including its CRLF.
    fn bulk_body_len(&self) -> Option<usize> {
        let (kind, rest) = self.header.split_first()?;
        if *kind != b'$' {
            return None;
        }
        let digits = rest.strip_suffix(b"\r")?;
        let len: usize = std::str::from_utf8(digits).ok()?.parse().ok()?;
        Some(len.saturating_add(2))
    }
}

impl Transport for BenchConnection {
    fn round_trip(&mut self, payload: &[u8]) -> Result<(), MeasureError> {
        self.stream.write_all(payload).map_err(|err| classify(&err, self.io_timeout))?;
        self.read_response()
    }
}

/// Connector producing [`BenchConnection`] instances to a fixed address.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    /// Target address.
    pub addr: SocketAddr,
    /// Connect timeout per worker.
    pub connect_timeout: Duration,
    /// Send/receive timeout per worker.
    pub io_timeout: Duration,
}

impl TcpConnector {
    /// Builds a loopback connector for `port` with default timeouts.
    #[must_use]
    pub fn loopback(port: u16) -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], port)),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
        }
    }

    /// Overrides the send/receive timeout.
    #[must_use]
    pub const fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }
}

impl Connector for TcpConnector {
    type Transport = BenchConnection;

    fn connect(&self) -> Result<BenchConnection, MeasureError> {
        BenchConnection::connect(self.addr, self.connect_timeout, self.io_timeout)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Maps an I/O error to a measurement error, separating timeouts.
fn classify(err: &io::Error, timeout: Duration) -> MeasureError {
    match err.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => MeasureError::ReadTimeout {
            timeout_ms: timeout.as_millis(),
        },
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe => {
            MeasureError::ConnectionClosed
        }
        _ => MeasureError::ConnectionFailure(err.to_string()),
    }
}

/// Wraps a socket option failure.
fn connection_failure(err: io::Error) -> MeasureError {
    MeasureError::ConnectionFailure(err.to_string())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
