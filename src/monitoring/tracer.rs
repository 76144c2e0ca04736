/*!
 * Diagnostic Tracing
 * Structured reporting of native and internal failures using the tracing crate
 *
 * Every failure is emitted as an error-level event on the `threads_compat`
 * target, with a message carrying the fixed `[threads_compat]` prefix and
 * the failing call, native code and its description as structured fields.
 * Reporting is a side channel only: nothing here feeds back into the
 * result codes returned to callers.
 */

use nix::errno::Errno;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Fixed prefix identifying this subsystem in diagnostic output
pub const LOG_PREFIX: &str = "[threads_compat]";

static FAILURES: AtomicU64 = AtomicU64::new(0);

/// Initialize structured tracing for binaries embedding this crate
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - THREADS_COMPAT_TRACE_JSON: Enable JSON output (default: false)
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("THREADS_COMPAT_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .init();
        info!("{} tracing initialized with JSON output", LOG_PREFIX);
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .compact(),
            )
            .init();
        info!("{} tracing initialized", LOG_PREFIX);
    }
}

/// Report a failed native call with its errno description
pub fn report_native_failure(call: &'static str, code: i32) {
    FAILURES.fetch_add(1, Ordering::Relaxed);
    let description = Errno::from_raw(code).desc();
    error!(
        target: "threads_compat",
        call,
        code,
        description,
        "{} {} error: {} {}",
        LOG_PREFIX,
        call,
        code,
        description
    );
}

/// Report an internal failure that has no native error code
pub fn report_failure(operation: &'static str, detail: &str) {
    FAILURES.fetch_add(1, Ordering::Relaxed);
    error!(
        target: "threads_compat",
        operation,
        detail,
        "{} {} {}",
        LOG_PREFIX,
        operation,
        detail
    );
}

/// Report an anomaly that does not fail the operation
pub fn report_anomaly(operation: &'static str, detail: &str) {
    warn!(
        target: "threads_compat",
        operation,
        detail,
        "{} {} {}",
        LOG_PREFIX,
        operation,
        detail
    );
}

/// Number of failures reported since process start, native and internal
pub fn failure_count() -> u64 {
    FAILURES.load(Ordering::Relaxed)
}
