//! Server lifecycle tests using stock system programs as stand-in servers.
// crates/fedis-bench-core/tests/process_integration.rs
// =============================================================================
// Module: Server Process Integration Tests
// Description: Spawn, readiness, and teardown against real child processes.
// Purpose: Verify startup failures surface and no child outlives its guard.
// =============================================================================

use std::time::Duration;

use fedis_bench_core::HarnessError;
use fedis_bench_core::NoopEventSink;
use fedis_bench_core::ProcessError;
use fedis_bench_core::QuickThresholds;
use fedis_bench_core::ReadinessPolicy;
use fedis_bench_core::ServerLauncher;
use fedis_bench_core::suite::run_quick;

type TestResult = Result<(), String>;

fn launcher(program: &str, args: &[&str], attempts: u32) -> ServerLauncher {
    ServerLauncher {
        program: program.to_string(),
        args: args.iter().map(ToString::to_string).collect(),
        readiness: ReadinessPolicy {
            attempts,
            attempt_timeout: Duration::from_millis(50),
            interval: Duration::from_millis(20),
        },
        stop_grace: Duration::from_millis(500),
        ..ServerLauncher::default()
    }
}

fn free_port() -> Result<u16, String> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").map_err(|err| err.to_string())?;
    Ok(listener.local_addr().map_err(|err| err.to_string())?.port())
}

#[test]
fn missing_program_is_a_spawn_error() -> TestResult {
    let launcher = launcher("fedis-bench-definitely-not-installed", &[], 3);
    match launcher.start(free_port()?, &[]) {
        Err(ProcessError::Spawn {
            program, ..
        }) if program == "fedis-bench-definitely-not-installed" => Ok(()),
        Err(err) => Err(format!("expected spawn error, got {err}")),
        Ok(_) => Err("expected spawn error, got a running server".to_string()),
    }
}

#[test]
fn quick_run_propagates_startup_failure() -> TestResult {
    let launcher = launcher("fedis-bench-definitely-not-installed", &[], 3);
    let thresholds = QuickThresholds {
        duration_sec: 1,
        set_ops_per_sec_min: 1.0,
        get_ops_per_sec_min: 1.0,
    };
    match run_quick(&launcher, free_port()?, &thresholds, &NoopEventSink) {
        Err(HarnessError::Process(ProcessError::Spawn {
            ..
        })) => Ok(()),
        Err(err) => Err(format!("expected process error, got {err}")),
        Ok(_) => Err("expected process error, got a report".to_string()),
    }
}

#[cfg(unix)]
#[test]
fn early_exit_is_detected_before_budget_runs_out() -> TestResult {
    let launcher = launcher("sh", &["-c", "exit 3"], 200);
    match launcher.start(free_port()?, &[]) {
        Err(ProcessError::ExitedEarly {
            status,
        }) => {
            if status.contains('3') {
                Ok(())
            } else {
                Err(format!("exit status not reported: {status}"))
            }
        }
        Err(err) => Err(format!("expected early exit, got {err}")),
        Ok(_) => Err("expected early exit, got a running server".to_string()),
    }
}

#[cfg(unix)]
#[test]
fn silent_server_times_out_and_is_reaped() -> TestResult {
    let launcher = launcher("sleep", &["30"], 4);
    let started = std::time::Instant::now();
    match launcher.start(free_port()?, &[]) {
        Err(ProcessError::StartupTimeout {
            attempts, ..
        }) if attempts == 4 => {}
        Err(err) => return Err(format!("expected startup timeout, got {err}")),
        Ok(_) => return Err("expected startup timeout, got a running server".to_string()),
    }
    // The guard's drop sends SIGTERM; `sleep` exits at once, well before 30s.
    if started.elapsed() > Duration::from_secs(10) {
        return Err("teardown waited for the child to exit on its own".to_string());
    }
    Ok(())
}

#[cfg(unix)]
#[test]
fn stop_is_idempotent() -> TestResult {
    use std::net::TcpListener;

    // Something must accept on the port for readiness to pass; the child
    // is an unrelated long-running program owned by the guard.
    let listener = TcpListener::bind("127.0.0.1:0").map_err(|err| err.to_string())?;
    let port = listener.local_addr().map_err(|err| err.to_string())?.port();
    let launcher = launcher("sleep", &["30"], 10);
    let (mut server, connection) = launcher.start(port, &[]).map_err(|err| err.to_string())?;
    drop(connection);
    if !server.is_running() || server.pid().is_none() || server.port() != port {
        return Err("server guard should own a running child".to_string());
    }
    let first = server.stop().map_err(|err| err.to_string())?;
    let second = server.stop().map_err(|err| err.to_string())?;
    if first.is_none() || second.is_some() || server.is_running() {
        return Err(format!("unexpected stop results: {first:?} then {second:?}"));
    }
    Ok(())
}

#[cfg(unix)]
#[test]
fn measurement_failure_still_reaps_server() -> TestResult {
    use std::fs;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Instant;

    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let pid_file = dir.path().join("server.pid");
    let script = format!("echo $$ > '{}'; exec sleep 30", pid_file.display());
    let launcher = launcher("sh", &["-c", script.as_str()], 200);
    let port = free_port()?;
    // Listen only once the pid is recorded; every accepted connection is closed at once.
    let watched = pid_file.clone();
    thread::spawn(move || {
        while !watched.exists() {
            thread::sleep(Duration::from_millis(10));
        }
        let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) else {
            return;
        };
        for stream in listener.incoming() {
            drop(stream);
        }
    });
    let thresholds = QuickThresholds {
        duration_sec: 1,
        set_ops_per_sec_min: 1.0,
        get_ops_per_sec_min: 1.0,
    };
    let started = Instant::now();
    match run_quick(&launcher, port, &thresholds, &NoopEventSink) {
        Err(HarnessError::Measure(_)) => {}
        Err(err) => return Err(format!("expected measurement error, got {err}")),
        Ok(_) => return Err("expected measurement error, got a report".to_string()),
    }
    if started.elapsed() > Duration::from_secs(10) {
        return Err("teardown waited for the child to exit on its own".to_string());
    }
    let raw = fs::read_to_string(&pid_file).map_err(|err| err.to_string())?;
    let pid = raw.trim().parse::<i32>().map_err(|err| err.to_string())?;
    match kill(Pid::from_raw(pid), None) {
        Err(Errno::ESRCH) => Ok(()),
        other => Err(format!("server pid {pid} still exists: {other:?}")),
    }
}
