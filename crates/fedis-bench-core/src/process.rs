// crates/fedis-bench-core/src/process.rs
// ============================================================================
// Module: Server Process Manager
// Description: Spawn, readiness-gate, and tear down the server-under-test.
// Purpose: Guarantee no orphaned server processes across harness runs.
// Dependencies: crate::readiness, crate::transport, nix (unix), thiserror
// ============================================================================

//! ## Overview
//! [`ServerLauncher::start`] spawns the server with its port and log level
//! passed through the environment, then polls readiness. The returned
//! [`ServerProcess`] is a drop guard: teardown (graceful terminate, bounded
//! wait, forced kill) runs on every exit path, including measurement errors
//! and panics. `stop` is idempotent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::path::PathBuf;
use std::process::Child;
use std::process::Command;
use std::process::ExitStatus;
use std::process::Stdio;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use thiserror::Error;

use crate::readiness::Acceptor;
use crate::readiness::AttemptOutcome;
use crate::readiness::ReadinessError;
use crate::readiness::ReadinessPolicy;
use crate::readiness::ReadinessProbe;
use crate::readiness::TcpAcceptor;
use crate::transport::BenchConnection;
use crate::transport::DEFAULT_IO_TIMEOUT;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable carrying the listening port to the server.
pub const SERVER_PORT_ENV: &str = "FEDIS_PORT";
/// Environment variable carrying the server log verbosity.
pub const SERVER_LOG_ENV: &str = "FEDIS_LOG";
/// Log verbosity used when nothing else is configured.
pub const DEFAULT_SERVER_LOG: &str = "error";
/// Default wait after a graceful terminate before forcing a kill.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(2);
/// Poll interval while waiting for the child to exit.
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(20);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server lifecycle failures.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The server command could not be spawned.
    #[error("failed to spawn server `{program}`: {error}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Spawn error.
        error: String,
    },
    /// The port never accepted a connection.
    #[error("server did not start on port {port} after {attempts} attempts: {last_error}")]
    StartupTimeout {
        /// Port polled for readiness.
        port: u16,
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        last_error: String,
    },
    /// The server exited before becoming ready.
    #[error("server exited before becoming ready: {status}")]
    ExitedEarly {
        /// Exit status description.
        status: String,
    },
    /// Delivering a termination signal failed.
    #[error("failed to signal server: {0}")]
    Signal(String),
    /// Waiting on or killing the child failed.
    #[error("server process io error: {0}")]
    Io(String),
}

// ============================================================================
// SECTION: Launcher
// ============================================================================

/// Describes how to start the server-under-test.
#[derive(Debug, Clone)]
pub struct ServerLauncher {
    /// Program to execute.
    pub program: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Working directory for the child.
    pub working_dir: Option<PathBuf>,
    /// Log verbosity override passed as `FEDIS_LOG`.
    pub log_level: Option<String>,
    /// Readiness polling parameters.
    pub readiness: ReadinessPolicy,
    /// Send/receive timeout for the readiness connection.
    pub io_timeout: Duration,
    /// Wait after graceful terminate before forcing a kill.
    pub stop_grace: Duration,
}

impl Default for ServerLauncher {
    fn default() -> Self {
        Self {
            program: "cargo".to_string(),
            args: vec!["run".to_string(), "--quiet".to_string()],
            working_dir: None,
            log_level: None,
            readiness: ReadinessPolicy::default(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            stop_grace: DEFAULT_STOP_GRACE,
        }
    }
}

impl ServerLauncher {
    /// Spawns the server on `port` and blocks until it accepts a connection.
    ///
    /// The child is owned by the returned guard before readiness polling
    /// starts, so a failed start still tears the process down.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] when the spawn fails, the child exits early,
    /// or the port never becomes reachable.
    pub fn start(
        &self,
        port: u16,
        env_overrides: &[(String, String)],
    ) -> Result<(ServerProcess, BenchConnection), ProcessError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdin(Stdio::null()).stdout(Stdio::null());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command.env(SERVER_PORT_ENV, port.to_string());
        command.env(SERVER_LOG_ENV, self.resolve_log_level());
        for (key, value) in env_overrides {
            command.env(key, value);
        }
        let child = command.spawn().map_err(|err| ProcessError::Spawn {
            program: self.program.clone(),
            error: err.to_string(),
        })?;
        let mut process = ServerProcess {
            child: Some(child),
            port,
            grace: self.stop_grace,
        };
        let mut acceptor = ChildAcceptor {
            process: &mut process,
            tcp: TcpAcceptor::loopback(port, self.io_timeout),
        };
        let connection =
            ReadinessProbe::new(self.readiness).wait(&mut acceptor).map_err(|err| match err {
                ReadinessError::TimedOut {
                    attempts,
                    last_error,
                } => ProcessError::StartupTimeout {
                    port,
                    attempts,
                    last_error,
                },
                ReadinessError::NoAttempts => ProcessError::StartupTimeout {
                    port,
                    attempts: 0,
                    last_error: "readiness policy allows no attempts".to_string(),
                },
                ReadinessError::Aborted {
                    reason, ..
                } => ProcessError::ExitedEarly {
                    status: reason,
                },
            })?;
        Ok((process, connection))
    }

    /// Resolves `FEDIS_LOG`: explicit override, inherited value, then quiet default.
    fn resolve_log_level(&self) -> String {
        self.log_level
            .clone()
            .or_else(|| env::var(SERVER_LOG_ENV).ok().filter(|value| !value.trim().is_empty()))
            .unwrap_or_else(|| DEFAULT_SERVER_LOG.to_string())
    }
}

/// Acceptor that aborts once the child has exited.
struct ChildAcceptor<'a> {
    /// Process being polled.
    process: &'a mut ServerProcess,
    /// Underlying TCP acceptor.
    tcp: TcpAcceptor,
}

impl Acceptor for ChildAcceptor<'_> {
    type Connection = BenchConnection;

    fn attempt(&mut self, timeout: Duration) -> AttemptOutcome<BenchConnection> {
        match self.process.try_exit_status() {
            Ok(Some(status)) => return AttemptOutcome::Abort(status.to_string()),
            Ok(None) => {}
            Err(err) => return AttemptOutcome::Abort(err.to_string()),
        }
        self.tcp.attempt(timeout)
    }
}

// ============================================================================
// SECTION: Process Guard
// ============================================================================

/// Owned server subprocess; terminated on `stop` or drop.
#[derive(Debug)]
pub struct ServerProcess {
    /// Child handle, `None` once reaped.
    child: Option<Child>,
    /// Listening port.
    port: u16,
    /// Wait after graceful terminate before forcing a kill.
    grace: Duration,
}

impl ServerProcess {
    /// Returns the listening port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the child's OS process id while it is owned.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Returns true until the child has been reaped.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Terminates the server: graceful signal, bounded wait, then forced kill.
    ///
    /// Returns the exit status on the first call and `None` afterwards. The
    /// child is killed and reaped even when signalling or polling fails.
    ///
    /// # Errors
    ///
    /// Returns [`ProcessError`] when signalling or reaping fails.
    pub fn stop(&mut self) -> Result<Option<ExitStatus>, ProcessError> {
        self.stop_with(request_terminate)
    }

    /// Runs teardown with the given graceful-termination request.
    fn stop_with(
        &mut self,
        terminate: impl FnOnce(&mut Child) -> Result<(), ProcessError>,
    ) -> Result<Option<ExitStatus>, ProcessError> {
        let Some(mut child) = self.child.take() else {
            return Ok(None);
        };
        match graceful_exit(&mut child, self.grace, terminate) {
            Ok(Some(status)) => Ok(Some(status)),
            Ok(None) => force_kill(&mut child).map(Some),
            Err(err) => {
                let _ = force_kill(&mut child);
                Err(err)
            }
        }
    }

    /// Returns the exit status if the child has already exited.
    fn try_exit_status(&mut self) -> Result<Option<ExitStatus>, ProcessError> {
        match self.child.as_mut() {
            Some(child) => child.try_wait().map_err(|err| ProcessError::Io(err.to_string())),
            None => Ok(None),
        }
    }
}

impl Drop for ServerProcess {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Requests termination and waits up to `grace`; `None` means still running.
fn graceful_exit(
    child: &mut Child,
    grace: Duration,
    terminate: impl FnOnce(&mut Child) -> Result<(), ProcessError>,
) -> Result<Option<ExitStatus>, ProcessError> {
    if let Some(status) = child.try_wait().map_err(|err| ProcessError::Io(err.to_string()))? {
        return Ok(Some(status));
    }
    terminate(child)?;
    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().map_err(|err| ProcessError::Io(err.to_string()))? {
            return Ok(Some(status));
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
    Ok(None)
}

/// Kills and reaps the child.
fn force_kill(child: &mut Child) -> Result<ExitStatus, ProcessError> {
    // Kill can race with a late exit; reaping below settles either way.
    let _ = child.kill();
    child.wait().map_err(|err| ProcessError::Io(err.to_string()))
}

/// Requests graceful termination.
#[cfg(unix)]
fn request_terminate(child: &mut Child) -> Result<(), ProcessError> {
    use nix::sys::signal::Signal;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = i32::try_from(child.id())
        .map_err(|_| ProcessError::Signal("process id out of range".to_string()))?;
    match kill(Pid::from_raw(raw), Signal::SIGTERM) {
        Ok(()) | Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(err) => Err(ProcessError::Signal(err.to_string())),
    }
}

/// Requests termination; non-unix targets have no graceful signal.
#[cfg(not(unix))]
fn request_terminate(child: &mut Child) -> Result<(), ProcessError> {
    child.kill().map_err(|err| ProcessError::Signal(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(all(test, unix))]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use std::process::Command;
    use std::process::Stdio;
    use std::time::Duration;
    use std::time::Instant;

    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    use super::ProcessError;
    use super::ServerProcess;

    fn sleeping_server() -> ServerProcess {
        let child = Command::new("sleep")
            .arg("30")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        ServerProcess {
            child: Some(child),
            port: 0,
            grace: Duration::from_millis(500),
        }
    }

    #[test]
    fn failed_terminate_still_kills_and_reaps_child() {
        let mut server = sleeping_server();
        let pid = Pid::from_raw(i32::try_from(server.pid().unwrap()).unwrap());
        let started = Instant::now();
        let result =
            server.stop_with(|_| Err(ProcessError::Signal("operation not permitted".to_string())));
        assert!(matches!(result, Err(ProcessError::Signal(_))));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!server.is_running());
        assert_eq!(kill(pid, None), Err(Errno::ESRCH));
        assert!(server.stop().unwrap().is_none());
    }

    #[test]
    fn graceful_stop_reports_exit_status() {
        let mut server = sleeping_server();
        let status = server.stop().unwrap();
        assert!(status.is_some_and(|status| !status.success()));
        assert!(!server.is_running());
    }
}
