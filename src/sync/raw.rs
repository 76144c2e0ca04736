/*!
 * Native Pass-Through Layer
 *
 * One-to-one forwarding of mutex and condition variable operations to
 * pthreads over caller-owned storage, with native error codes translated
 * into `ThreadError` and every unexpected failure reported to the
 * diagnostic sink. The owned wrappers in `sync::mutex` and `sync::condvar`
 * and the C ABI exports both sit on top of these functions.
 *
 * # Safety
 *
 * Every pointer handed to these functions must reference storage that is
 * valid for the native type, stays at a fixed address for the lifetime of
 * the primitive, and is used according to the pthread rules (initialized
 * once before use, destroyed once when no longer in use, unlocked only by
 * its owner).
 */

use super::timed::{PollingAcquirer, TryAcquire};
use crate::core::errors::{ThreadError, ThreadResult};
use crate::core::time::Timespec;
use crate::monitoring::{self, report_failure, report_native_failure, Resource};
use libc::{c_int, pthread_cond_t, pthread_mutex_t, pthread_mutexattr_t};
use std::fmt;
use std::mem::MaybeUninit;
use std::ops::BitOr;

/// Translate a pthread return code, reporting failures
#[inline]
pub(crate) fn check(call: &'static str, err: c_int) -> ThreadResult<()> {
    if err == 0 {
        Ok(())
    } else {
        report_native_failure(call, err);
        Err(ThreadError::native(call, err))
    }
}

/// Requested mutex variant, as a bit set
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct MutexType(i32);

impl MutexType {
    pub const PLAIN: MutexType = MutexType(1 << 0);
    pub const RECURSIVE: MutexType = MutexType(1 << 1);
    /// Accepted as a value but rejected by `mutex_init`
    pub const TIMED: MutexType = MutexType(1 << 2);

    #[inline]
    pub const fn from_bits(bits: i32) -> Self {
        MutexType(bits)
    }

    #[inline]
    pub const fn bits(self) -> i32 {
        self.0
    }

    /// Plain or plain|recursive; every other combination is rejected
    #[inline]
    pub const fn is_supported(self) -> bool {
        self.0 == Self::PLAIN.0 || self.0 == (Self::PLAIN.0 | Self::RECURSIVE.0)
    }

    #[inline]
    pub const fn is_recursive(self) -> bool {
        self.0 & Self::RECURSIVE.0 != 0
    }
}

impl BitOr for MutexType {
    type Output = MutexType;

    fn bitor(self, rhs: MutexType) -> MutexType {
        MutexType(self.0 | rhs.0)
    }
}

impl fmt::Debug for MutexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MutexType({:#x})", self.0)
    }
}

/// Initialize a mutex of the requested type
///
/// Unsupported types are rejected before any native call is made. The
/// attribute object is destroyed on every path; a failure to destroy it is
/// reported but never replaces the init result.
///
/// # Safety
///
/// `mutex` must point to writable, uninitialized (or destroyed) mutex storage.
pub unsafe fn mutex_init(mutex: *mut pthread_mutex_t, kind: MutexType) -> ThreadResult<()> {
    if !kind.is_supported() {
        report_failure(
            "mtx_init",
            &format!("unsupported type requested: {}", kind.bits()),
        );
        return Err(ThreadError::UnsupportedMutexType(kind.bits()));
    }

    let mut attr = MaybeUninit::<pthread_mutexattr_t>::uninit();
    check(
        "pthread_mutexattr_init",
        libc::pthread_mutexattr_init(attr.as_mut_ptr()),
    )?;

    let result = init_with_attr(mutex, attr.as_mut_ptr(), kind);

    // Reported by check; the init result stands
    let _ = check(
        "pthread_mutexattr_destroy",
        libc::pthread_mutexattr_destroy(attr.as_mut_ptr()),
    );

    if result.is_ok() {
        monitoring::acquired(Resource::Mutex);
    }
    result
}

unsafe fn init_with_attr(
    mutex: *mut pthread_mutex_t,
    attr: *mut pthread_mutexattr_t,
    kind: MutexType,
) -> ThreadResult<()> {
    if kind.is_recursive() {
        check(
            "pthread_mutexattr_settype PTHREAD_MUTEX_RECURSIVE",
            libc::pthread_mutexattr_settype(attr, libc::PTHREAD_MUTEX_RECURSIVE),
        )?;
    }
    check("pthread_mutex_init", libc::pthread_mutex_init(mutex, attr))
}

/// # Safety
///
/// `mutex` must be initialized and not locked.
pub unsafe fn mutex_destroy(mutex: *mut pthread_mutex_t) -> ThreadResult<()> {
    check("pthread_mutex_destroy", libc::pthread_mutex_destroy(mutex))?;
    monitoring::released(Resource::Mutex);
    Ok(())
}

/// # Safety
///
/// `mutex` must be initialized.
pub unsafe fn mutex_lock(mutex: *mut pthread_mutex_t) -> ThreadResult<()> {
    check("pthread_mutex_lock", libc::pthread_mutex_lock(mutex))
}

/// Non-blocking lock; `Busy` if another owner holds it
///
/// # Safety
///
/// `mutex` must be initialized.
pub unsafe fn mutex_trylock(mutex: *mut pthread_mutex_t) -> ThreadResult<()> {
    match libc::pthread_mutex_trylock(mutex) {
        libc::EBUSY => Err(ThreadError::Busy),
        err => check("pthread_mutex_trylock", err),
    }
}

/// Lock, giving up once `deadline` on the realtime clock has passed
///
/// # Safety
///
/// `mutex` must be initialized.
pub unsafe fn mutex_timedlock(
    mutex: *mut pthread_mutex_t,
    deadline: &Timespec,
) -> ThreadResult<()> {
    PollingAcquirer::realtime().acquire(&RawMutex::new(mutex), deadline)
}

/// # Safety
///
/// `mutex` must be initialized and held by the calling thread.
pub unsafe fn mutex_unlock(mutex: *mut pthread_mutex_t) -> ThreadResult<()> {
    check("pthread_mutex_unlock", libc::pthread_mutex_unlock(mutex))
}

/// Borrowed native mutex exposed to the timed-lock emulator
pub struct RawMutex {
    ptr: *mut pthread_mutex_t,
}

impl RawMutex {
    /// # Safety
    ///
    /// `ptr` must reference an initialized mutex that outlives the value.
    #[inline]
    pub unsafe fn new(ptr: *mut pthread_mutex_t) -> Self {
        Self { ptr }
    }
}

impl TryAcquire for RawMutex {
    #[inline]
    fn try_acquire(&self) -> ThreadResult<()> {
        // SAFETY: guaranteed by RawMutex::new
        unsafe { mutex_trylock(self.ptr) }
    }
}

/// # Safety
///
/// `cond` must point to writable, uninitialized (or destroyed) storage.
pub unsafe fn cond_init(cond: *mut pthread_cond_t) -> ThreadResult<()> {
    match libc::pthread_cond_init(cond, std::ptr::null()) {
        0 => {
            monitoring::acquired(Resource::Condvar);
            Ok(())
        }
        libc::ENOMEM => {
            report_native_failure("pthread_cond_init", libc::ENOMEM);
            Err(ThreadError::OutOfMemory)
        }
        err => check("pthread_cond_init", err),
    }
}

/// # Safety
///
/// `cond` must be initialized with no waiters.
pub unsafe fn cond_destroy(cond: *mut pthread_cond_t) -> ThreadResult<()> {
    check("pthread_cond_destroy", libc::pthread_cond_destroy(cond))?;
    monitoring::released(Resource::Condvar);
    Ok(())
}

/// # Safety
///
/// `cond` must be initialized; `mutex` must be held by the calling thread.
pub unsafe fn cond_wait(cond: *mut pthread_cond_t, mutex: *mut pthread_mutex_t) -> ThreadResult<()> {
    check("pthread_cond_wait", libc::pthread_cond_wait(cond, mutex))
}

/// Wait until signalled or `deadline` passes (`TimedOut`)
///
/// # Safety
///
/// `cond` must be initialized; `mutex` must be held by the calling thread.
pub unsafe fn cond_timedwait(
    cond: *mut pthread_cond_t,
    mutex: *mut pthread_mutex_t,
    deadline: &Timespec,
) -> ThreadResult<()> {
    // Same realtime base as Timespec::now; the caller's deadline is taken as-is
    let abstime = deadline.to_libc();
    match libc::pthread_cond_timedwait(cond, mutex, &abstime) {
        libc::ETIMEDOUT => Err(ThreadError::TimedOut),
        err => check("pthread_cond_timedwait", err),
    }
}

/// # Safety
///
/// `cond` must be initialized.
pub unsafe fn cond_signal(cond: *mut pthread_cond_t) -> ThreadResult<()> {
    check("pthread_cond_signal", libc::pthread_cond_signal(cond))
}

/// # Safety
///
/// `cond` must be initialized.
pub unsafe fn cond_broadcast(cond: *mut pthread_cond_t) -> ThreadResult<()> {
    check("pthread_cond_broadcast", libc::pthread_cond_broadcast(cond))
}
