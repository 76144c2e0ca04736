/*!
 * Build-Time Limits
 *
 * Constants fixed at compile time. Override the poll interval by exporting
 * `THREADS_COMPAT_POLL_INTERVAL_NS` (decimal nanoseconds) when building.
 */

use crate::core::time::Timespec;

/// Default sleep between non-blocking lock attempts (1µs)
pub const DEFAULT_POLL_INTERVAL_NS: u64 = 1_000;

/// Sleep between non-blocking lock attempts in the timed-lock emulator
///
/// Bounds both polling overhead and how stale a timeout decision can be.
/// It is not a floor on acquisition latency: a free mutex is taken on the
/// first attempt.
pub const POLL_INTERVAL_NS: u64 = parse_nanos(
    option_env!("THREADS_COMPAT_POLL_INTERVAL_NS"),
    DEFAULT_POLL_INTERVAL_NS,
);

/// Poll interval as a timespec
#[inline]
pub const fn poll_interval() -> Timespec {
    Timespec::from_nanos(POLL_INTERVAL_NS)
}

const fn parse_nanos(value: Option<&str>, default: u64) -> u64 {
    let bytes = match value {
        Some(value) => value.as_bytes(),
        None => return default,
    };
    assert!(
        !bytes.is_empty(),
        "THREADS_COMPAT_POLL_INTERVAL_NS must not be empty"
    );

    let mut nanos: u64 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let digit = bytes[i];
        assert!(
            digit.is_ascii_digit(),
            "THREADS_COMPAT_POLL_INTERVAL_NS must be a decimal integer"
        );
        nanos = match nanos.checked_mul(10) {
            Some(n) => match n.checked_add((digit - b'0') as u64) {
                Some(n) => n,
                None => panic!("THREADS_COMPAT_POLL_INTERVAL_NS overflows u64"),
            },
            None => panic!("THREADS_COMPAT_POLL_INTERVAL_NS overflows u64"),
        };
        i += 1;
    }
    nanos
}
