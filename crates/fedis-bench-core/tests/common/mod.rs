// crates/fedis-bench-core/tests/common/mod.rs
// =============================================================================
// Module: Bench Core Test Helpers
// Description: In-process fake responder and record fixtures.
// Purpose: Exercise real sockets without spawning a server binary.
// =============================================================================

#![allow(dead_code, reason = "Test helpers are selectively used across suites.")]

use std::io::Read;
use std::io::Write;
use std::net::TcpListener;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::thread;

use fedis_bench_core::LatencyDistribution;
use fedis_bench_core::MetricsRecord;
use fedis_bench_core::record::ConcurrentMetrics;
use fedis_bench_core::record::SingleMetrics;

/// Loopback responder answering every received chunk with `+OK\r\n`.
pub struct FakeResponder {
    /// Bound port.
    pub port: u16,
    /// Chunks answered across all connections.
    pub answered: Arc<AtomicU64>,
}

/// Starts a responder that never closes connections.
pub fn spawn_responder() -> std::io::Result<FakeResponder> {
    spawn_responder_with_limit(None)
}

/// Starts a responder that closes each connection after `limit` replies.
pub fn spawn_responder_with_limit(limit: Option<u64>) -> std::io::Result<FakeResponder> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let port = listener.local_addr()?.port();
    let answered = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&answered);
    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(stream) = stream else {
                continue;
            };
            let counter = Arc::clone(&counter);
            thread::spawn(move || serve(stream, &counter, limit));
        }
    });
    Ok(FakeResponder {
        port,
        answered,
    })
}

/// Replies to each chunk until the peer closes or the limit is reached.
fn serve(mut stream: TcpStream, counter: &AtomicU64, limit: Option<u64>) {
    let mut buffer = [0u8; 4096];
    let mut replies = 0u64;
    loop {
        if limit.is_some_and(|limit| replies >= limit) {
            return;
        }
        match stream.read(&mut buffer) {
            Ok(0) | Err(_) => return,
            Ok(_) => {
                // Count before replying so a client never observes a reply the
                // counter has not seen yet.
                counter.fetch_add(1, Ordering::SeqCst);
                replies += 1;
                if stream.write_all(b"+OK\r\n").is_err() {
                    return;
                }
            }
        }
    }
}

/// Builds a metrics record with the given headline values.
pub fn record_with(
    single_set: f64,
    single_get: f64,
    ping_p99: f64,
    concurrent_set: f64,
    concurrent_get: f64,
) -> MetricsRecord {
    MetricsRecord {
        single: SingleMetrics {
            set_ops_sec_median: single_set,
            set_ops_sec_runs: vec![single_set],
            get_ops_sec_median: single_get,
            get_ops_sec_runs: vec![single_get],
            ping_latency_ms: LatencyDistribution {
                p50_ms: ping_p99 / 4.0,
                p95_ms: ping_p99 / 2.0,
                p99_ms: ping_p99,
                avg_ms: ping_p99 / 3.0,
            },
        },
        concurrent: ConcurrentMetrics {
            clients: 16,
            mode: fedis_bench_core::KeyMode::Sharded,
            set_ops_sec_median: concurrent_set,
            set_ops_sec_runs: vec![concurrent_set],
            get_ops_sec_median: concurrent_get,
            get_ops_sec_runs: vec![concurrent_get],
        },
    }
}
