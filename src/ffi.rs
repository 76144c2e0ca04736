/*!
 * C11 `<threads.h>` ABI
 *
 * Exported with the `c-abi` feature. Storage types are the native ones
 * (`mtx_t` = `pthread_mutex_t`, `cnd_t` = `pthread_cond_t`, `thrd_t` =
 * `pthread_t`) and every function returns the process-wide status codes.
 *
 * The unit tests below and `tests/c_abi_test.rs` only build with the
 * feature enabled: `cargo test --features c-abi`.
 */

use crate::core::errors::{ThreadError, ThreadStatus};
use crate::core::time::Timespec;
use crate::monitoring::report_failure;
use crate::sync::raw::{self, MutexType};
use crate::thread::{self, Thread, ThreadStart};
use libc::{c_int, c_void, pthread_cond_t, pthread_mutex_t, pthread_t, timespec};

#[allow(non_camel_case_types)]
pub type mtx_t = pthread_mutex_t;
#[allow(non_camel_case_types)]
pub type cnd_t = pthread_cond_t;
#[allow(non_camel_case_types)]
pub type thrd_t = pthread_t;

#[inline]
fn status(result: crate::core::ThreadResult<()>) -> c_int {
    ThreadStatus::of(&result).code()
}

/// # Safety
///
/// `mutex` must point to writable `mtx_t` storage.
#[no_mangle]
pub unsafe extern "C" fn mtx_init(mutex: *mut mtx_t, kind: c_int) -> c_int {
    status(raw::mutex_init(mutex, MutexType::from_bits(kind)))
}

/// # Safety
///
/// `mutex` must be initialized and unlocked.
#[no_mangle]
pub unsafe extern "C" fn mtx_destroy(mutex: *mut mtx_t) {
    // Reported by the raw layer; C11 gives no way to return it
    let _ = raw::mutex_destroy(mutex);
}

/// # Safety
///
/// `mutex` must be initialized.
#[no_mangle]
pub unsafe extern "C" fn mtx_lock(mutex: *mut mtx_t) -> c_int {
    status(raw::mutex_lock(mutex))
}

/// # Safety
///
/// `mutex` must be initialized.
#[no_mangle]
pub unsafe extern "C" fn mtx_trylock(mutex: *mut mtx_t) -> c_int {
    status(raw::mutex_trylock(mutex))
}

/// # Safety
///
/// `mutex` must be initialized; `time_point` must be readable.
#[no_mangle]
pub unsafe extern "C" fn mtx_timedlock(mutex: *mut mtx_t, time_point: *const timespec) -> c_int {
    let Some(time_point) = time_point.as_ref() else {
        report_failure("mtx_timedlock", "null time point");
        return ThreadStatus::Error.code();
    };
    status(raw::mutex_timedlock(mutex, &Timespec::from_libc(time_point)))
}

/// # Safety
///
/// `mutex` must be held by the calling thread.
#[no_mangle]
pub unsafe extern "C" fn mtx_unlock(mutex: *mut mtx_t) -> c_int {
    status(raw::mutex_unlock(mutex))
}

/// # Safety
///
/// `thr` must be writable; `func` must be safe to call with `arg` on
/// another thread.
#[no_mangle]
pub unsafe extern "C" fn thrd_create(thr: *mut thrd_t, func: ThreadStart, arg: *mut c_void) -> c_int {
    match Thread::spawn(func, arg) {
        Ok(thread) => {
            *thr = thread.as_raw();
            ThreadStatus::Success.code()
        }
        Err(err) => err.status().code(),
    }
}

/// # Safety
///
/// `thr` must be a joinable thread created by `thrd_create`; `res` may be
/// null.
#[no_mangle]
pub unsafe extern "C" fn thrd_join(thr: thrd_t, res: *mut c_int) -> c_int {
    match Thread::from_raw(thr).join() {
        Ok(result) => {
            if !res.is_null() {
                *res = result;
            }
            ThreadStatus::Success.code()
        }
        Err(err) => err.status().code(),
    }
}

/// 0 on success, -1 if interrupted (remaining written when non-null),
/// -2 on any other failure
///
/// # Safety
///
/// `duration` must be readable; `remaining` may be null.
#[no_mangle]
pub unsafe extern "C" fn thrd_sleep(duration: *const timespec, remaining: *mut timespec) -> c_int {
    let Some(duration) = duration.as_ref() else {
        report_failure("thrd_sleep", "null duration");
        return -2;
    };
    match thread::sleep(&Timespec::from_libc(duration)) {
        Ok(()) => 0,
        Err(ThreadError::Interrupted { remaining: left }) => {
            if !remaining.is_null() {
                *remaining = left.to_libc();
            }
            -1
        }
        Err(_) => -2,
    }
}

#[no_mangle]
pub extern "C" fn thrd_yield() {
    thread::yield_now();
}

/// # Safety
///
/// `cond` must point to writable `cnd_t` storage.
#[no_mangle]
pub unsafe extern "C" fn cnd_init(cond: *mut cnd_t) -> c_int {
    status(raw::cond_init(cond))
}

/// # Safety
///
/// `cond` must be initialized with no waiters.
#[no_mangle]
pub unsafe extern "C" fn cnd_destroy(cond: *mut cnd_t) {
    // Reported by the raw layer; C11 gives no way to return it
    let _ = raw::cond_destroy(cond);
}

/// # Safety
///
/// `cond` must be initialized; `mutex` must be held by the calling thread.
#[no_mangle]
pub unsafe extern "C" fn cnd_wait(cond: *mut cnd_t, mutex: *mut mtx_t) -> c_int {
    status(raw::cond_wait(cond, mutex))
}

/// # Safety
///
/// As `cnd_wait`; `time_point` must be readable.
#[no_mangle]
pub unsafe extern "C" fn cnd_timedwait(
    cond: *mut cnd_t,
    mutex: *mut mtx_t,
    time_point: *const timespec,
) -> c_int {
    let Some(time_point) = time_point.as_ref() else {
        report_failure("cnd_timedwait", "null time point");
        return ThreadStatus::Error.code();
    };
    status(raw::cond_timedwait(cond, mutex, &Timespec::from_libc(time_point)))
}

/// # Safety
///
/// `cond` must be initialized.
#[no_mangle]
pub unsafe extern "C" fn cnd_signal(cond: *mut cnd_t) -> c_int {
    status(raw::cond_signal(cond))
}

/// # Safety
///
/// `cond` must be initialized.
#[no_mangle]
pub unsafe extern "C" fn cnd_broadcast(cond: *mut cnd_t) -> c_int {
    status(raw::cond_broadcast(cond))
}
