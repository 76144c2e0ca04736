/*!
 * Owned Mutex
 *
 * A native mutex in heap storage that never moves, destroyed on drop.
 * Locking hands out a `MutexGuard`, which unlocks when dropped.
 */

use super::raw::{self, MutexType, RawMutex};
use super::timed::PollingAcquirer;
use crate::core::errors::ThreadResult;
use crate::core::time::Timespec;
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem;

/// Plain or recursive native mutex
pub struct Mutex {
    inner: Box<UnsafeCell<libc::pthread_mutex_t>>,
    kind: MutexType,
}

// SAFETY: pthread mutexes are designed to be shared between threads and the
// storage is pinned on the heap for the mutex's whole life.
unsafe impl Send for Mutex {}
unsafe impl Sync for Mutex {}

impl Mutex {
    /// Create a mutex of the given type
    ///
    /// Only `PLAIN` and `PLAIN | RECURSIVE` are accepted; anything else is
    /// rejected before a native call is made.
    pub fn new(kind: MutexType) -> ThreadResult<Self> {
        let inner = Box::new(UnsafeCell::new(libc::PTHREAD_MUTEX_INITIALIZER));
        // SAFETY: fresh storage, pinned by the box
        unsafe { raw::mutex_init(inner.get(), kind)? };
        Ok(Self { inner, kind })
    }

    pub fn plain() -> ThreadResult<Self> {
        Self::new(MutexType::PLAIN)
    }

    pub fn recursive() -> ThreadResult<Self> {
        Self::new(MutexType::PLAIN | MutexType::RECURSIVE)
    }

    #[inline]
    pub fn kind(&self) -> MutexType {
        self.kind
    }

    /// Block until the mutex is acquired
    pub fn lock(&self) -> ThreadResult<MutexGuard<'_>> {
        // SAFETY: initialized in new
        unsafe { raw::mutex_lock(self.raw())? };
        Ok(MutexGuard::new(self))
    }

    /// Acquire without blocking; `ThreadError::Busy` if held elsewhere
    pub fn try_lock(&self) -> ThreadResult<MutexGuard<'_>> {
        // SAFETY: initialized in new
        unsafe { raw::mutex_trylock(self.raw())? };
        Ok(MutexGuard::new(self))
    }

    /// Acquire before `deadline` (realtime clock) or fail with `TimedOut`
    pub fn timed_lock(&self, deadline: &Timespec) -> ThreadResult<MutexGuard<'_>> {
        self.timed_lock_with(&PollingAcquirer::realtime(), deadline)
    }

    /// `timed_lock` with a caller-supplied acquirer
    pub fn timed_lock_with<C>(
        &self,
        acquirer: &PollingAcquirer<C>,
        deadline: &Timespec,
    ) -> ThreadResult<MutexGuard<'_>>
    where
        C: super::timed::TimeSource,
    {
        // SAFETY: the raw handle does not outlive self
        let target = unsafe { RawMutex::new(self.raw()) };
        acquirer.acquire(&target, deadline)?;
        Ok(MutexGuard::new(self))
    }

    /// Unlock a mutex whose guard was forgotten
    ///
    /// # Safety
    ///
    /// The calling thread must hold the lock and no live guard may refer to
    /// that acquisition.
    pub unsafe fn force_unlock(&self) -> ThreadResult<()> {
        raw::mutex_unlock(self.raw())
    }

    #[inline]
    pub(crate) fn raw(&self) -> *mut libc::pthread_mutex_t {
        self.inner.get()
    }
}

impl Drop for Mutex {
    fn drop(&mut self) {
        // SAFETY: no guard can outlive the borrow of self. Failure is
        // reported by the raw layer.
        let _ = unsafe { raw::mutex_destroy(self.raw()) };
    }
}

impl fmt::Debug for Mutex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutex").field("kind", &self.kind).finish()
    }
}

/// Proof that the current thread holds a `Mutex`
///
/// Not `Send`: pthread mutexes must be unlocked by the owning thread.
#[must_use = "dropping the guard unlocks the mutex immediately"]
pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
    _not_send: PhantomData<*const ()>,
}

impl<'a> MutexGuard<'a> {
    #[inline]
    fn new(mutex: &'a Mutex) -> Self {
        Self {
            mutex,
            _not_send: PhantomData,
        }
    }

    #[inline]
    pub fn mutex(&self) -> &'a Mutex {
        self.mutex
    }

    /// Unlock now, surfacing the native result
    pub fn unlock(self) -> ThreadResult<()> {
        let mutex = self.mutex;
        mem::forget(self);
        // SAFETY: the guard proved ownership and has been consumed
        unsafe { mutex.force_unlock() }
    }
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: the guard proves ownership. Failure is reported by the raw layer.
        let _ = unsafe { self.mutex.force_unlock() };
    }
}

impl fmt::Debug for MutexGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexGuard").field("mutex", self.mutex).finish()
    }
}
