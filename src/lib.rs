/*!
 * Threads Compat Library
 *
 * C11-style threads, mutexes and condition variables on top of the native
 * pthread library, including timed mutex acquisition for platforms whose
 * pthreads only offer blocking lock and try-lock.
 *
 * # Example
 *
 * ```
 * use std::time::Duration;
 * use threads_compat::{Mutex, Timespec, ThreadError};
 *
 * let mutex = Mutex::plain()?;
 * let deadline = Timespec::after(Duration::from_millis(10))?;
 * let guard = mutex.timed_lock(&deadline)?;
 * assert_eq!(mutex.try_lock().map(drop), Err(ThreadError::Busy));
 * guard.unlock()?;
 * # Ok::<(), ThreadError>(())
 * ```
 */

pub mod core;
#[cfg(feature = "c-abi")]
pub mod ffi;
pub mod monitoring;
pub mod sync;
pub mod thread;

// Re-exports
pub use crate::core::{ThreadError, ThreadResult, ThreadStatus, Timespec, POLL_INTERVAL_NS};
pub use monitoring::{failure_count, init_tracing, resource_stats, ResourceStats};
pub use sync::{Condvar, Mutex, MutexGuard, MutexType, PollingAcquirer, RealtimeClock};
pub use thread::{sleep, yield_now, Thread, ThreadStart};
