/*!
 * Owned Condition Variable
 *
 * Thin owner of a native condition variable. Waits take the guard of the
 * mutex they release, so the mutex is provably held by the caller. Spurious
 * wakeups are possible; callers re-check their predicate.
 */

use super::mutex::MutexGuard;
use super::raw;
use crate::core::errors::ThreadResult;
use crate::core::time::Timespec;
use std::cell::UnsafeCell;
use std::fmt;

pub struct Condvar {
    inner: Box<UnsafeCell<libc::pthread_cond_t>>,
}

// SAFETY: native condition variables are shared between threads by design
// and the storage is pinned on the heap.
unsafe impl Send for Condvar {}
unsafe impl Sync for Condvar {}

impl Condvar {
    /// Create a condition variable; `OutOfMemory` if the native library
    /// reports ENOMEM
    pub fn new() -> ThreadResult<Self> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_COND_INITIALIZER));
        // SAFETY: fresh storage, pinned by the box
        unsafe { raw::cond_init(inner.get())? };
        Ok(Self { inner })
    }

    /// Atomically release the guarded mutex and wait for a wakeup
    pub fn wait(&self, guard: &mut MutexGuard<'_>) -> ThreadResult<()> {
        // SAFETY: the guard proves the mutex is held by this thread
        unsafe { raw::cond_wait(self.inner.get(), guard.mutex().raw()) }
    }

    /// `wait` bounded by `deadline` on the realtime clock
    ///
    /// Returns `Err(ThreadError::TimedOut)` when the deadline passes. The
    /// mutex is re-acquired in every case.
    pub fn timed_wait(&self, guard: &mut MutexGuard<'_>, deadline: &Timespec) -> ThreadResult<()> {
        // SAFETY: the guard proves the mutex is held by this thread
        unsafe { raw::cond_timedwait(self.inner.get(), guard.mutex().raw(), deadline) }
    }

    pub fn signal(&self) -> ThreadResult<()> {
        // SAFETY: initialized in new
        unsafe { raw::cond_signal(self.inner.get()) }
    }

    pub fn broadcast(&self) -> ThreadResult<()> {
        // SAFETY: initialized in new
        unsafe { raw::cond_broadcast(self.inner.get()) }
    }
}

impl Drop for Condvar {
    fn drop(&mut self) {
        // SAFETY: waiters borrow self, so none remain. Failure is reported
        // by the raw layer.
        let _ = unsafe { raw::cond_destroy(self.inner.get()) };
    }
}

impl fmt::Debug for Condvar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Condvar").finish_non_exhaustive()
    }
}
