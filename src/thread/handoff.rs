/*!
 * Thread Handoff Record
 *
 * The native start routine returns an untyped pointer and join hands that
 * pointer back. The handoff record rides on it: the creator allocates it,
 * the spawned thread owns it while running and returns it as its native
 * result, and the joiner reads the integer result and frees it.
 *
 * ```text
 *   allocate ──> [creator] ──pthread_create──> [thread: run, store result]
 *                    │                                   │
 *                    └─ launch failed: release            └─ return record ──> [joiner: reclaim]
 * ```
 */

use crate::core::errors::{ThreadError, ThreadResult};
use crate::monitoring::{self, report_failure, Resource};
use libc::{c_int, c_void};
use std::alloc::{self, Layout};
use std::mem;
use std::ptr::NonNull;

/// Start routine: one pointer-sized argument, integer result
pub type ThreadStart = unsafe extern "C" fn(*mut c_void) -> c_int;

/// Raw allocator for handoff records; null on exhaustion
pub(crate) type RawAlloc = unsafe fn(Layout) -> *mut u8;

pub(crate) struct ThreadHandoff {
    start: ThreadStart,
    arg: *mut c_void,
    result: c_int,
}

// A zero-sized allocation must never be requested
const _: () = assert!(mem::size_of::<ThreadHandoff>() > 0);

impl ThreadHandoff {
    const LAYOUT: Layout = Layout::new::<ThreadHandoff>();

    /// Allocate a record for `start(arg)` with a zeroed result slot
    ///
    /// `raw_alloc` is `std::alloc::alloc` outside tests.
    pub(crate) fn allocate_with(
        raw_alloc: RawAlloc,
        start: ThreadStart,
        arg: *mut c_void,
    ) -> ThreadResult<NonNull<Self>> {
        // SAFETY: LAYOUT has non-zero size (checked at compile time)
        let raw = unsafe { raw_alloc(Self::LAYOUT) }.cast::<ThreadHandoff>();
        let Some(record) = NonNull::new(raw) else {
            report_failure("thrd_create", "out of memory?");
            return Err(ThreadError::OutOfMemory);
        };

        // SAFETY: freshly allocated with the layout of ThreadHandoff
        unsafe {
            record.as_ptr().write(ThreadHandoff {
                start,
                arg,
                result: 0,
            })
        };
        monitoring::acquired(Resource::Handoff);
        Ok(record)
    }

    /// Free a record that was never handed to a running thread
    ///
    /// # Safety
    ///
    /// `record` must come from `allocate_with` and not be referenced elsewhere.
    pub(crate) unsafe fn release(record: NonNull<Self>) {
        alloc::dealloc(record.as_ptr().cast::<u8>(), Self::LAYOUT);
        monitoring::released(Resource::Handoff);
    }

    /// Take back the record a joined thread returned
    ///
    /// `None` for a null native result, i.e. a thread this crate did not
    /// start; nothing is freed in that case.
    ///
    /// # Safety
    ///
    /// A non-null `native_result` must be a record returned by `trampoline`
    /// from a thread that has terminated, and must not be reclaimed twice.
    pub(crate) unsafe fn reclaim(native_result: *mut c_void) -> Option<c_int> {
        let record = NonNull::new(native_result.cast::<ThreadHandoff>())?;
        let result = record.as_ref().result;
        Self::release(record);
        Some(result)
    }
}

/// Native entry point for every spawned thread
///
/// Runs the user routine, stores its result in the record and returns the
/// record itself so it survives until joined.
pub(crate) extern "C" fn trampoline(arg: *mut c_void) -> *mut c_void {
    let record = arg.cast::<ThreadHandoff>();
    // SAFETY: the creator handed exclusive ownership of the record to this
    // thread; it is not touched by anyone else until join.
    unsafe {
        let result = ((*record).start)((*record).arg);
        (*record).result = result;
    }
    arg
}
