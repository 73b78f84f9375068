// crates/fedis-bench-config/src/env.rs
// ============================================================================
// Module: Bench Environment
// Description: Environment variable names and strict readers.
// Purpose: Centralize env parsing with strict UTF-8 validation.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Environment values are parsed with strict UTF-8 enforcement to avoid silent
//! misconfiguration. Invalid UTF-8, empty values, and non-positive numbers
//! fail closed.

// ============================================================================
// SECTION: Environment Constants
// ============================================================================

/// Environment keys recognized by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchEnv {
    /// Server port for the run (positive integer).
    Port,
    /// Server log verbosity forwarded to the child.
    Log,
    /// Concurrent worker count (positive integer).
    Clients,
    /// Seconds per timed measurement (positive integer).
    Duration,
    /// Timed repetitions per metric (positive integer).
    Runs,
    /// Concurrent key distribution (`sharded` or `hotkey`).
    Mode,
    /// Path to a TOML config file.
    Config,
}

impl BenchEnv {
    /// Every recognized key, in documentation order.
    pub const ALL: [Self; 7] = [
        Self::Port,
        Self::Log,
        Self::Clients,
        Self::Duration,
        Self::Runs,
        Self::Mode,
        Self::Config,
    ];

    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Port => "FEDIS_BENCH_PORT",
            Self::Log => "FEDIS_LOG",
            Self::Clients => "FEDIS_BENCH_CLIENTS",
            Self::Duration => "FEDIS_BENCH_DURATION",
            Self::Runs => "FEDIS_BENCH_RUNS",
            Self::Mode => "FEDIS_BENCH_MODE",
            Self::Config => "FEDIS_BENCH_CONFIG",
        }
    }

    /// Reads this key, rejecting invalid UTF-8 and blank values.
    ///
    /// # Errors
    ///
    /// Returns an error when the value is not UTF-8 or is blank.
    pub fn read(self) -> Result<Option<String>, String> {
        read_env_nonempty(self.as_str())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads an environment variable and enforces UTF-8 validity.
///
/// # Errors
///
/// Returns an error when the environment variable contains invalid UTF-8.
pub fn read_env_strict(name: &str) -> Result<Option<String>, String> {
    std::env::var_os(name).map_or(Ok(None), |raw| {
        raw.into_string().map(Some).map_err(|_| format!("{name} must be valid UTF-8"))
    })
}

/// Reads an environment variable and rejects empty values.
///
/// # Errors
///
/// Returns an error when the variable is set but empty or whitespace.
fn read_env_nonempty(name: &str) -> Result<Option<String>, String> {
    match read_env_strict(name)? {
        Some(value) if value.trim().is_empty() => Err(format!("{name} must not be empty")),
        Some(value) => Ok(Some(value)),
        None => Ok(None),
    }
}

/// Parses a strictly positive integer.
///
/// # Errors
///
/// Returns an error when the value is non-numeric, out of range, or zero.
pub fn parse_positive<T>(name: &str, raw: &str) -> Result<T, String>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let value: T =
        raw.trim().parse().map_err(|_| format!("{name} must be a positive integer"))?;
    if value == T::default() {
        return Err(format!("{name} must be greater than zero"));
    }
    Ok(value)
}
