/*!
 * Resource Accounting
 *
 * Live counts of native objects created through this crate. A count only
 * drops when the native destroy call succeeds, so a failed destroy shows up
 * as a leak.
 */

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

static LIVE_MUTEXES: AtomicUsize = AtomicUsize::new(0);
static LIVE_CONDVARS: AtomicUsize = AtomicUsize::new(0);
static LIVE_HANDOFFS: AtomicUsize = AtomicUsize::new(0);

/// Kind of tracked native resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    Mutex,
    Condvar,
    /// Thread handoff record, live from spawn until join
    Handoff,
}

impl Resource {
    #[inline]
    fn counter(self) -> &'static AtomicUsize {
        match self {
            Resource::Mutex => &LIVE_MUTEXES,
            Resource::Condvar => &LIVE_CONDVARS,
            Resource::Handoff => &LIVE_HANDOFFS,
        }
    }
}

/// Snapshot of live native resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub mutexes: usize,
    pub condvars: usize,
    pub handoffs: usize,
}

#[inline]
pub(crate) fn acquired(resource: Resource) {
    resource.counter().fetch_add(1, Ordering::Relaxed);
}

#[inline]
pub(crate) fn released(resource: Resource) {
    resource.counter().fetch_sub(1, Ordering::Relaxed);
}

/// Current live resource counts
pub fn resource_stats() -> ResourceStats {
    ResourceStats {
        mutexes: LIVE_MUTEXES.load(Ordering::Relaxed),
        condvars: LIVE_CONDVARS.load(Ordering::Relaxed),
        handoffs: LIVE_HANDOFFS.load(Ordering::Relaxed),
    }
}
