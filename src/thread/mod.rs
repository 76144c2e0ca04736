/*!
 * Threads
 *
 * Launches native threads for start routines with an integer result, and
 * forwards sleep and yield to the native library.
 *
 * # Example
 *
 * ```
 * use std::ffi::c_void;
 * use threads_compat::thread::Thread;
 *
 * extern "C" fn seven(_arg: *mut c_void) -> i32 {
 *     7
 * }
 *
 * let thread = Thread::spawn(seven, std::ptr::null_mut()).unwrap();
 * assert_eq!(thread.join().unwrap(), 7);
 * ```
 */

mod handoff;

pub use handoff::ThreadStart;

use crate::core::errors::{ThreadError, ThreadResult};
use crate::core::time::Timespec;
use crate::monitoring::{report_anomaly, report_native_failure};
use crate::sync::raw::check;
use handoff::{trampoline, RawAlloc, ThreadHandoff};
use libc::{c_int, c_void};
use nix::errno::Errno;
use std::alloc;
use std::fmt;

/// Native entry point handed to a launcher
pub(crate) type NativeStart = extern "C" fn(*mut c_void) -> *mut c_void;

/// Starts `start(arg)` on a new native thread, writing its id; 0 or an errno
pub(crate) type Launcher =
    unsafe fn(native: *mut libc::pthread_t, start: NativeStart, arg: *mut c_void) -> c_int;

unsafe fn native_launch(native: *mut libc::pthread_t, start: NativeStart, arg: *mut c_void) -> c_int {
    libc::pthread_create(native, std::ptr::null(), start, arg)
}

/// Joinable native thread
///
/// `join` consumes the handle, so a thread's result is read at most once.
#[must_use = "dropping a Thread without join leaks its handoff record"]
pub struct Thread {
    native: libc::pthread_t,
}

// SAFETY: a pthread_t is an opaque id, valid to join from any thread
unsafe impl Send for Thread {}

impl Thread {
    /// Start `start(arg)` on a new native thread
    ///
    /// Fails with `OutOfMemory` if the handoff record cannot be allocated
    /// (no thread is launched), or a native error if launch fails (the
    /// record is freed before returning).
    pub fn spawn(start: ThreadStart, arg: *mut c_void) -> ThreadResult<Thread> {
        Self::spawn_with(alloc::alloc, native_launch, start, arg)
    }

    /// `spawn` over an explicit record allocator and native launcher
    ///
    /// The launcher is only invoked once the record exists.
    pub(crate) fn spawn_with(
        raw_alloc: RawAlloc,
        launch: Launcher,
        start: ThreadStart,
        arg: *mut c_void,
    ) -> ThreadResult<Thread> {
        let record = ThreadHandoff::allocate_with(raw_alloc, start, arg)?;

        let mut native = mem_zeroed_thread();
        // SAFETY: trampoline takes ownership of the record on success
        let err = unsafe { launch(&mut native, trampoline, record.as_ptr().cast::<c_void>()) };

        if let Err(e) = check("pthread_create", err) {
            // SAFETY: the thread never started, so the record is still ours
            unsafe { ThreadHandoff::release(record) };
            return Err(e);
        }

        Ok(Thread { native })
    }

    /// Wrap a native thread id
    ///
    /// # Safety
    ///
    /// `native` must be a joinable thread that is not joined or detached
    /// elsewhere, and whose start routine returns either null or a record
    /// produced by this module.
    pub unsafe fn from_raw(native: libc::pthread_t) -> Thread {
        Thread { native }
    }

    #[inline]
    pub fn as_raw(&self) -> libc::pthread_t {
        self.native
    }

    /// Wait for the thread to finish and return its start routine's result
    ///
    /// A thread that returned a null native result (not started through
    /// `spawn`) yields 0. A native join failure frees nothing.
    pub fn join(self) -> ThreadResult<c_int> {
        let mut native_result: *mut c_void = std::ptr::null_mut();
        // SAFETY: self is consumed, so the thread is joined exactly once
        check("pthread_join", unsafe {
            libc::pthread_join(self.native, &mut native_result)
        })?;

        // SAFETY: the thread has terminated and its record is now ours
        match unsafe { ThreadHandoff::reclaim(native_result) } {
            Some(result) => Ok(result),
            None => {
                report_anomaly("thrd_join", "joined thread returned NULL (not our wrapper?)");
                Ok(0)
            }
        }
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread").finish_non_exhaustive()
    }
}

#[inline]
fn mem_zeroed_thread() -> libc::pthread_t {
    // SAFETY: pthread_t is an integer or pointer id on every supported
    // target; zero is only a placeholder until pthread_create fills it.
    unsafe { std::mem::zeroed() }
}

/// Sleep for `duration`
///
/// Returns `Interrupted { remaining }` if a signal cut the sleep short.
pub fn sleep(duration: &Timespec) -> ThreadResult<()> {
    let request = duration.to_libc();
    let mut remaining = Timespec::ZERO.to_libc();

    // SAFETY: both pointers reference live stack values
    if unsafe { libc::nanosleep(&request, &mut remaining) } == 0 {
        return Ok(());
    }

    match Errno::last() {
        Errno::EINTR => Err(ThreadError::Interrupted {
            remaining: Timespec::from_libc(&remaining),
        }),
        errno => {
            let code = errno as i32;
            report_native_failure("nanosleep", code);
            Err(ThreadError::native("nanosleep", code))
        }
    }
}

/// Give up the processor once
pub fn yield_now() {
    if let Err(errno) = nix::sched::sched_yield() {
        report_native_failure("sched_yield", errno as i32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::resource_stats;
    use serial_test::serial;
    use std::cell::Cell;
    use std::time::{Duration, Instant};

    thread_local! {
        static LAUNCHES: Cell<u32> = const { Cell::new(0) };
    }

    unsafe fn refusing_launch(
        _native: *mut libc::pthread_t,
        _start: NativeStart,
        _arg: *mut c_void,
    ) -> c_int {
        LAUNCHES.with(|n| n.set(n.get() + 1));
        libc::EAGAIN
    }

    extern "C" fn negate(arg: *mut c_void) -> c_int {
        -(arg as isize as c_int)
    }

    extern "C" fn foreign_start(_arg: *mut c_void) -> *mut c_void {
        std::ptr::null_mut()
    }

    #[test]
    #[serial]
    fn test_launch_failure_frees_record() {
        let baseline = resource_stats().handoffs;
        LAUNCHES.with(|n| n.set(0));

        let result =
            Thread::spawn_with(alloc::alloc, refusing_launch, negate, std::ptr::null_mut());

        assert!(matches!(
            result,
            Err(ThreadError::Native { call: "pthread_create", code, .. }) if code == libc::EAGAIN
        ));
        assert_eq!(LAUNCHES.with(Cell::get), 1);
        assert_eq!(resource_stats().handoffs, baseline);
    }

    #[test]
    #[serial]
    fn test_allocation_failure_launches_nothing() {
        unsafe fn exhausted(_layout: std::alloc::Layout) -> *mut u8 {
            std::ptr::null_mut()
        }

        let baseline = resource_stats().handoffs;
        LAUNCHES.with(|n| n.set(0));

        let result = Thread::spawn_with(exhausted, refusing_launch, negate, std::ptr::null_mut());

        assert!(matches!(result, Err(ThreadError::OutOfMemory)));
        assert_eq!(LAUNCHES.with(Cell::get), 0);
        assert_eq!(resource_stats().handoffs, baseline);
    }

    #[test]
    #[serial]
    fn test_spawn_join_result() {
        let thread = Thread::spawn(negate, 17 as *mut c_void).unwrap();
        assert_eq!(thread.join().unwrap(), -17);
    }

    #[test]
    fn test_join_foreign_thread_yields_zero() {
        let mut native = mem_zeroed_thread();
        let err = unsafe {
            libc::pthread_create(&mut native, std::ptr::null(), foreign_start, std::ptr::null_mut())
        };
        assert_eq!(err, 0);

        let thread = unsafe { Thread::from_raw(native) };
        assert_eq!(thread.join().unwrap(), 0);
    }

    #[test]
    fn test_sleep_duration() {
        let start = Instant::now();
        sleep(&Timespec::from(Duration::from_millis(20))).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_sleep_invalid_duration_is_native_error() {
        let result = sleep(&Timespec::new(0, 2_000_000_000));
        assert!(matches!(
            result,
            Err(ThreadError::Native { call: "nanosleep", code, .. }) if code == libc::EINVAL
        ));
    }

    #[test]
    fn test_yield_returns() {
        yield_now();
    }
}
