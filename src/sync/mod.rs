/*!
 * Synchronization Primitives
 *
 * Mutexes and condition variables forwarded to the native pthread library,
 * plus the one primitive it lacks: a mutex acquisition bounded by a
 * deadline, emulated by polling the non-blocking lock.
 *
 * # Layers
 *
 * - `raw`: unsafe pass-through over caller-owned native storage
 * - `Mutex` / `Condvar`: owned storage, guard-based locking
 * - `timed`: the polling emulator behind `Mutex::timed_lock`
 */

mod condvar;
mod mutex;
pub mod raw;
pub mod timed;

pub use condvar::Condvar;
pub use mutex::{Mutex, MutexGuard};
pub use raw::MutexType;
pub use timed::{PollingAcquirer, RealtimeClock, TimeSource, TryAcquire};
