/*!
 * Threads Compat - Stress Harness
 *
 * Launches adapter threads that contend on one mutex through `timed_lock`,
 * checks that the critical section is never entered twice, and prints a
 * JSON report.
 *
 * Environment variables:
 * - STRESS_THREADS: contending threads (default: 8)
 * - STRESS_ITERATIONS: acquisitions attempted per thread (default: 1000)
 * - STRESS_TIMEOUT_US: per-attempt deadline in microseconds (default: 500)
 */

use libc::{c_int, c_void};
use miette::{IntoDiagnostic, Result};
use parking_lot::Mutex as StatsMutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use threads_compat::{
    failure_count, init_tracing, resource_stats, Mutex, ResourceStats, Thread, ThreadError,
    Timespec, POLL_INTERVAL_NS,
};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy)]
struct StressConfig {
    threads: usize,
    iterations: usize,
    timeout: Duration,
}

impl StressConfig {
    fn from_env() -> Self {
        fn var(name: &str, default: u64) -> u64 {
            std::env::var(name)
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        }

        Self {
            threads: var("STRESS_THREADS", 8) as usize,
            iterations: var("STRESS_ITERATIONS", 1000) as usize,
            timeout: Duration::from_micros(var("STRESS_TIMEOUT_US", 500)),
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct WorkerTally {
    acquired: u64,
    timed_out: u64,
    errors: u64,
}

#[derive(Debug, Serialize)]
struct StressReport {
    threads: usize,
    iterations: usize,
    timeout_us: u128,
    poll_interval_ns: u64,
    acquired: u64,
    timed_out: u64,
    errors: u64,
    max_occupancy: usize,
    nonzero_exit_codes: usize,
    failures: u64,
    elapsed_ms: u128,
    resources_after: ResourceStats,
}

struct Shared {
    config: StressConfig,
    mutex: Mutex,
    occupancy: AtomicUsize,
    max_occupancy: AtomicUsize,
    tally: StatsMutex<WorkerTally>,
}

impl Shared {
    fn run_worker(&self) -> WorkerTally {
        let mut tally = WorkerTally::default();

        for _ in 0..self.config.iterations {
            let deadline = match Timespec::after(self.config.timeout) {
                Ok(deadline) => deadline,
                Err(_) => {
                    tally.errors += 1;
                    continue;
                }
            };

            match self.mutex.timed_lock(&deadline) {
                Ok(guard) => {
                    let inside = self.occupancy.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_occupancy.fetch_max(inside, Ordering::SeqCst);
                    std::hint::spin_loop();
                    self.occupancy.fetch_sub(1, Ordering::SeqCst);
                    if guard.unlock().is_err() {
                        tally.errors += 1;
                    }
                    tally.acquired += 1;
                }
                Err(ThreadError::TimedOut) => tally.timed_out += 1,
                Err(_) => tally.errors += 1,
            }
        }

        tally
    }
}

extern "C" fn worker(arg: *mut c_void) -> c_int {
    // SAFETY: main hands each worker one strong count via Arc::into_raw
    let shared = unsafe { Arc::from_raw(arg as *const Shared) };
    let tally = shared.run_worker();
    let failed = tally.errors > 0;

    let mut total = shared.tally.lock();
    total.acquired += tally.acquired;
    total.timed_out += tally.timed_out;
    total.errors += tally.errors;

    c_int::from(failed)
}

fn main() -> Result<()> {
    init_tracing();

    let config = StressConfig::from_env();
    info!(
        threads = config.threads,
        iterations = config.iterations,
        timeout_us = config.timeout.as_micros() as u64,
        poll_interval_ns = POLL_INTERVAL_NS,
        "Starting timed lock stress run"
    );

    let shared = Arc::new(Shared {
        config,
        mutex: Mutex::plain()?,
        occupancy: AtomicUsize::new(0),
        max_occupancy: AtomicUsize::new(0),
        tally: StatsMutex::new(WorkerTally::default()),
    });

    let start = Instant::now();
    let mut threads = Vec::with_capacity(config.threads);
    for _ in 0..config.threads {
        let arg = Arc::into_raw(shared.clone()) as *mut c_void;
        match Thread::spawn(worker, arg) {
            Ok(thread) => threads.push(thread),
            Err(err) => {
                // SAFETY: the worker never started, so reclaim its count
                drop(unsafe { Arc::from_raw(arg as *const Shared) });
                return Err(err.into());
            }
        }
    }

    let mut nonzero_exit_codes = 0;
    for thread in threads {
        if thread.join()? != 0 {
            nonzero_exit_codes += 1;
        }
    }
    let elapsed = start.elapsed();

    let tally = shared.tally.lock();
    let report = StressReport {
        threads: config.threads,
        iterations: config.iterations,
        timeout_us: config.timeout.as_micros(),
        poll_interval_ns: POLL_INTERVAL_NS,
        acquired: tally.acquired,
        timed_out: tally.timed_out,
        errors: tally.errors,
        max_occupancy: shared.max_occupancy.load(Ordering::SeqCst),
        nonzero_exit_codes,
        failures: failure_count(),
        elapsed_ms: elapsed.as_millis(),
        resources_after: resource_stats(),
    };

    if report.max_occupancy > 1 {
        warn!(
            max_occupancy = report.max_occupancy,
            "Critical section entered concurrently"
        );
    }

    println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
    Ok(())
}
