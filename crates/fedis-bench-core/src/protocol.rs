// crates/fedis-bench-core/src/protocol.rs
// ============================================================================
// Module: Wire Protocol Encoder
// Description: Array-of-bulk-strings request framing for the server-under-test.
// Purpose: Turn benchmark commands into deterministic request payloads.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Requests are framed as `*<argc>\r\n` followed by `$<len>\r\n<bytes>\r\n` for
//! every argument. Encoding is pure and deterministic; responses are never
//! decoded here.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Line terminator closing every frame element.
const CRLF: &[u8] = b"\r\n";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Ordered, non-empty command argument list.
///
/// # Invariants
/// - The first argument (command name) is always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Raw argument bytes in wire order.
    args: Vec<Vec<u8>>,
}

impl Command {
    /// Starts a command with its name as the first argument.
    #[must_use]
    pub fn new(name: impl AsRef<[u8]>) -> Self {
        Self {
            args: vec![name.as_ref().to_vec()],
        }
    }

    /// Appends an argument (text or raw bytes).
    #[must_use]
    pub fn arg(mut self, value: impl AsRef<[u8]>) -> Self {
        self.args.push(value.as_ref().to_vec());
        self
    }

    /// Encodes the command into its wire request.
    #[must_use]
    pub fn encode(&self) -> WireRequest {
        WireRequest(frame(&self.args))
    }
}

/// Encoded request bytes ready to be written to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest(Vec<u8>);

impl WireRequest {
    /// Returns the encoded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the request, returning the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl AsRef<[u8]> for WireRequest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Protocol encoding errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A command must carry at least one argument.
    #[error("command must contain at least one argument")]
    EmptyCommand,
}

// ============================================================================
// SECTION: Encoding
// ============================================================================

/// Encodes an argument list into a wire request.
///
/// # Errors
///
/// Returns [`ProtocolError::EmptyCommand`] when `args` is empty.
pub fn encode<A: AsRef<[u8]>>(args: &[A]) -> Result<WireRequest, ProtocolError> {
    if args.is_empty() {
        return Err(ProtocolError::EmptyCommand);
    }
    Ok(WireRequest(frame(args)))
}

/// Builds the `SET key value` request.
#[must_use]
pub fn set_command(key: &str, value: &str) -> WireRequest {
    Command::new("SET").arg(key).arg(value).encode()
}

/// Builds the `GET key` request.
#[must_use]
pub fn get_command(key: &str) -> WireRequest {
    Command::new("GET").arg(key).encode()
}

/// Builds the `PING` request.
#[must_use]
pub fn ping_command() -> WireRequest {
    Command::new("PING").encode()
}

/// Writes the array header and every bulk-string element.
fn frame<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let body_len: usize = args.iter().map(|arg| arg.as_ref().len() + 16).sum();
    let mut out = Vec::with_capacity(body_len + 16);
    out.push(b'*');
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(CRLF);
    for arg in args {
        let bytes = arg.as_ref();
        out.push(b'$');
        out.extend_from_slice(bytes.len().to_string().as_bytes());
        out.extend_from_slice(CRLF);
        out.extend_from_slice(bytes);
        out.extend_from_slice(CRLF);
    }
    out
}

// ============================================================================
// SECTION: Tests
// ============================================================================
