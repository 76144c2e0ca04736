/*!
 * Error Types
 * Result taxonomy for thread, mutex and condition variable operations
 */

use crate::core::time::Timespec;
use miette::Diagnostic;
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Process-wide result codes, stable across all operations
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadStatus {
    Success = 0,
    Error = 1,
    NoMem = 2,
    TimedOut = 3,
    /// Only produced by non-blocking try-lock
    Busy = 4,
}

impl ThreadStatus {
    /// Status code for any operation result
    pub fn of<T>(result: &ThreadResult<T>) -> Self {
        match result {
            Ok(_) => ThreadStatus::Success,
            Err(err) => err.status(),
        }
    }

    #[inline]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// Thread primitive errors with miette diagnostics
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ThreadError {
    #[error("Unsupported mutex type requested: {0}")]
    #[diagnostic(
        code(threads::unsupported_mutex_type),
        help("Only plain and plain|recursive mutexes are supported.")
    )]
    UnsupportedMutexType(i32),

    #[error("Out of memory")]
    #[diagnostic(code(threads::out_of_memory))]
    OutOfMemory,

    #[error("Mutex is held by another owner")]
    #[diagnostic(code(threads::busy))]
    Busy,

    #[error("Deadline expired")]
    #[diagnostic(
        code(threads::timed_out),
        help("The deadline is compared against CLOCK_REALTIME.")
    )]
    TimedOut,

    #[error("Sleep interrupted with {remaining} remaining")]
    #[diagnostic(code(threads::interrupted))]
    Interrupted { remaining: Timespec },

    #[error("{call} failed: {code} {description}")]
    #[diagnostic(code(threads::native_failure))]
    Native {
        call: &'static str,
        code: i32,
        description: &'static str,
    },

    #[error("Invalid timestamp: {0}")]
    #[diagnostic(
        code(threads::invalid_timestamp),
        help("Check the deadline and the configured poll interval.")
    )]
    InvalidTimestamp(String),
}

impl ThreadError {
    /// Native call failure with its errno description
    pub fn native(call: &'static str, code: i32) -> Self {
        ThreadError::Native {
            call,
            code,
            description: Errno::from_raw(code).desc(),
        }
    }

    /// Result code reported for this error
    pub fn status(&self) -> ThreadStatus {
        match self {
            ThreadError::OutOfMemory => ThreadStatus::NoMem,
            ThreadError::Busy => ThreadStatus::Busy,
            ThreadError::TimedOut => ThreadStatus::TimedOut,
            ThreadError::UnsupportedMutexType(_)
            | ThreadError::Interrupted { .. }
            | ThreadError::Native { .. }
            | ThreadError::InvalidTimestamp(_) => ThreadStatus::Error,
        }
    }
}

/// Result type for thread primitive operations
pub type ThreadResult<T> = std::result::Result<T, ThreadError>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(ThreadStatus::Success.code(), 0);
        assert_eq!(ThreadStatus::Error.code(), 1);
        assert_eq!(ThreadStatus::NoMem.code(), 2);
        assert_eq!(ThreadStatus::TimedOut.code(), 3);
        assert_eq!(ThreadStatus::Busy.code(), 4);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(ThreadError::OutOfMemory.status(), ThreadStatus::NoMem);
        assert_eq!(ThreadError::TimedOut.status(), ThreadStatus::TimedOut);
        assert_eq!(ThreadError::Busy.status(), ThreadStatus::Busy);
        assert_eq!(
            ThreadError::UnsupportedMutexType(4).status(),
            ThreadStatus::Error
        );
        assert_eq!(
            ThreadError::native("pthread_mutex_lock", libc::EINVAL).status(),
            ThreadStatus::Error
        );
    }

    #[test]
    fn test_status_of_result() {
        let ok: ThreadResult<()> = Ok(());
        let timed_out: ThreadResult<()> = Err(ThreadError::TimedOut);
        assert_eq!(ThreadStatus::of(&ok), ThreadStatus::Success);
        assert_eq!(ThreadStatus::of(&timed_out), ThreadStatus::TimedOut);
    }

    #[test]
    fn test_native_error_display() {
        let err = ThreadError::native("pthread_mutex_init", libc::EINVAL);
        let text = err.to_string();
        assert!(text.starts_with("pthread_mutex_init failed: "));
        assert!(text.contains(&libc::EINVAL.to_string()));
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&ThreadStatus::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }
}
