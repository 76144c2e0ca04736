/*!
 * Timed Lock Emulation
 *
 * The native library offers only "lock or block forever" and "try lock,
 * fail immediately". `PollingAcquirer` builds a deadline-bounded lock out
 * of the non-blocking attempt plus a sleep:
 *
 * ```text
 *   Polling ──try_acquire ok──────────────> Acquired
 *      │  ├──try_acquire busy──> sample now
 *      │  └──other failure─────────────────> Error
 *      │            ├──now > deadline──────> TimedOut
 *      │            ├──clock failure───────> Error
 *      └────────────┴──sleep(pause) / yield (pause == 0)
 * ```
 *
 * The pause is the configured poll interval, shrunk to exactly the time
 * remaining once `now` is within one interval of the deadline, so the last
 * wake-up lands on the deadline instead of a full interval past it. If the
 * clock steps backwards out of that final interval the pause goes back to
 * the full interval. The calling thread never blocks on the native lock
 * itself, only in its own sleeps.
 *
 * # Known limitation
 *
 * The deadline is compared against `CLOCK_REALTIME`. A deadline computed
 * against another time base times out systematically early or late.
 */

use crate::core::errors::{ThreadError, ThreadResult};
use crate::core::limits::poll_interval;
use crate::core::time::Timespec;
use crate::monitoring::report_failure;
use crate::thread;
use tracing::trace;

/// A lock that can be attempted without blocking
pub trait TryAcquire {
    /// `Ok` when acquired, `Err(ThreadError::Busy)` when held elsewhere,
    /// any other error is fatal to the acquisition
    fn try_acquire(&self) -> ThreadResult<()>;
}

/// Clock and pause primitives used between attempts
pub trait TimeSource {
    /// Sample the clock deadlines are measured against
    fn now(&self) -> ThreadResult<Timespec>;

    /// Sleep for a non-zero duration
    fn sleep(&self, duration: &Timespec) -> ThreadResult<()>;

    /// Give up the processor once
    fn yield_now(&self);
}

/// Realtime clock with native sleep and yield
#[derive(Debug, Clone, Copy, Default)]
pub struct RealtimeClock;

impl TimeSource for RealtimeClock {
    #[inline]
    fn now(&self) -> ThreadResult<Timespec> {
        Timespec::now()
    }

    fn sleep(&self, duration: &Timespec) -> ThreadResult<()> {
        match thread::sleep(duration) {
            // A signal cut the nap short; the next poll re-evaluates anyway
            Err(ThreadError::Interrupted { .. }) => Ok(()),
            other => other,
        }
    }

    #[inline]
    fn yield_now(&self) {
        thread::yield_now();
    }
}

/// Deadline-bounded acquisition by polling a non-blocking lock
#[derive(Debug, Clone)]
pub struct PollingAcquirer<C: TimeSource = RealtimeClock> {
    clock: C,
    interval: Timespec,
}

impl PollingAcquirer<RealtimeClock> {
    /// Realtime clock with the build-time poll interval
    pub const fn realtime() -> Self {
        Self {
            clock: RealtimeClock,
            interval: poll_interval(),
        }
    }
}

impl<C: TimeSource> PollingAcquirer<C> {
    pub fn new(clock: C, interval: Timespec) -> Self {
        Self { clock, interval }
    }

    #[inline]
    pub fn interval(&self) -> Timespec {
        self.interval
    }

    /// Poll `lock` until acquired, `deadline` has passed, or a failure
    ///
    /// Returns `Err(ThreadError::TimedOut)` once a clock sample is strictly
    /// past the deadline. A lock that is free on the first attempt is
    /// acquired without touching the clock.
    pub fn acquire<L>(&self, lock: &L, deadline: &Timespec) -> ThreadResult<()>
    where
        L: TryAcquire + ?Sized,
    {
        if !deadline.is_normalized() {
            return reported(Err(ThreadError::InvalidTimestamp(format!(
                "deadline {} is not normalized",
                deadline
            ))));
        }

        // Start of the final, shrunk interval; computed on first contention
        let mut final_interval_start: Option<Timespec> = None;
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            match lock.try_acquire() {
                Ok(()) => {
                    trace!(attempts, "timed lock acquired");
                    return Ok(());
                }
                Err(ThreadError::Busy) => {}
                Err(err) => return Err(err),
            }

            let now = self.clock.now()?;
            if now > *deadline {
                trace!(attempts, %deadline, "timed lock deadline passed");
                return Err(ThreadError::TimedOut);
            }

            let threshold = match final_interval_start {
                Some(threshold) => threshold,
                None => {
                    let threshold = reported(deadline.checked_sub(&self.interval))?;
                    *final_interval_start.insert(threshold)
                }
            };

            let pause = if now >= threshold {
                reported(deadline.checked_sub(&now))?
            } else {
                self.interval
            };

            if pause.is_zero() {
                self.clock.yield_now();
            } else {
                self.clock.sleep(&pause)?;
            }
        }
    }
}

/// Send timestamp arithmetic failures to the diagnostic sink
fn reported<T>(result: ThreadResult<T>) -> ThreadResult<T> {
    if let Err(err) = &result {
        report_failure("mtx_timedlock", &err.to_string());
    }
    result
}

impl Default for PollingAcquirer<RealtimeClock> {
    fn default() -> Self {
        Self::realtime()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::failure_count;
    use pretty_assertions::assert_eq;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Clock that moves only on sleep, yield (1ns) or a scripted jump
    #[derive(Default)]
    struct ManualClock {
        current: Cell<Timespec>,
        jumps: RefCell<VecDeque<Timespec>>,
        sleeps: RefCell<Vec<Timespec>>,
        yields: Cell<u32>,
        samples: Cell<u32>,
        fail_now: Cell<bool>,
    }

    impl ManualClock {
        fn at(nanos: u64) -> Rc<Self> {
            let clock = Self::default();
            clock.current.set(Timespec::from_nanos(nanos));
            Rc::new(clock)
        }

        fn script(&self, samples: &[u64]) {
            self.jumps
                .borrow_mut()
                .extend(samples.iter().map(|n| Timespec::from_nanos(*n)));
        }
    }

    impl TimeSource for Rc<ManualClock> {
        fn now(&self) -> ThreadResult<Timespec> {
            self.samples.set(self.samples.get() + 1);
            if self.fail_now.get() {
                return Err(ThreadError::native("clock_gettime", libc::EINVAL));
            }
            if let Some(jump) = self.jumps.borrow_mut().pop_front() {
                self.current.set(jump);
            }
            Ok(self.current.get())
        }

        fn sleep(&self, duration: &Timespec) -> ThreadResult<()> {
            self.sleeps.borrow_mut().push(*duration);
            let advanced = self.current.get().checked_add(duration.as_duration().unwrap())?;
            self.current.set(advanced);
            Ok(())
        }

        fn yield_now(&self) {
            self.yields.set(self.yields.get() + 1);
            let tick = self.current.get().checked_add(std::time::Duration::from_nanos(1));
            self.current.set(tick.unwrap());
        }
    }

    /// Lock that is busy until the shared clock reaches `free_at`
    struct ReleasedAt {
        clock: Rc<ManualClock>,
        free_at: Timespec,
        attempts: Cell<u32>,
    }

    impl TryAcquire for ReleasedAt {
        fn try_acquire(&self) -> ThreadResult<()> {
            self.attempts.set(self.attempts.get() + 1);
            if self.clock.current.get() >= self.free_at {
                Ok(())
            } else {
                Err(ThreadError::Busy)
            }
        }
    }

    fn released_at(clock: &Rc<ManualClock>, nanos: u64) -> ReleasedAt {
        ReleasedAt {
            clock: clock.clone(),
            free_at: Timespec::from_nanos(nanos),
            attempts: Cell::new(0),
        }
    }

    struct Failing;

    impl TryAcquire for Failing {
        fn try_acquire(&self) -> ThreadResult<()> {
            Err(ThreadError::native("pthread_mutex_trylock", libc::EINVAL))
        }
    }

    #[test]
    fn test_free_lock_acquired_without_sampling() {
        let clock = ManualClock::at(5_000);
        let acquirer = PollingAcquirer::new(clock.clone(), Timespec::from_nanos(1_000));
        let lock = released_at(&clock, 0);

        acquirer.acquire(&lock, &Timespec::from_nanos(10_000)).unwrap();

        assert_eq!(lock.attempts.get(), 1);
        assert_eq!(clock.samples.get(), 0);
        assert!(clock.sleeps.borrow().is_empty());
    }

    #[test]
    fn test_past_deadline_times_out_without_sleeping() {
        let clock = ManualClock::at(20_000);
        let acquirer = PollingAcquirer::new(clock.clone(), Timespec::from_nanos(1_000));
        let lock = released_at(&clock, u64::MAX >> 2);

        let result = acquirer.acquire(&lock, &Timespec::from_nanos(10_000));

        assert_eq!(result, Err(ThreadError::TimedOut));
        assert!(clock.sleeps.borrow().is_empty());
        assert_eq!(clock.yields.get(), 0);
    }

    #[test]
    fn test_full_intervals_then_shrink_to_deadline() {
        let clock = ManualClock::at(0);
        let acquirer = PollingAcquirer::new(clock.clone(), Timespec::from_nanos(1_000));
        let lock = released_at(&clock, u64::MAX >> 2);

        let result = acquirer.acquire(&lock, &Timespec::from_nanos(3_500));
        assert_eq!(result, Err(ThreadError::TimedOut));

        // 0 -> 1000 -> 2000 -> 3000, then only 500 remain
        let sleeps: Vec<u64> = clock
            .sleeps
            .borrow()
            .iter()
            .map(|s| s.nsec as u64)
            .collect();
        assert_eq!(sleeps, vec![1_000, 1_000, 1_000, 500]);
        // Woke exactly on the deadline (not past it), so one zero pause
        assert_eq!(clock.yields.get(), 1);
    }

    #[test]
    fn test_acquired_within_one_interval_of_release() {
        let clock = ManualClock::at(0);
        let interval = 1_000;
        let acquirer = PollingAcquirer::new(clock.clone(), Timespec::from_nanos(interval));
        let lock = released_at(&clock, 4_321);

        acquirer.acquire(&lock, &Timespec::from_nanos(100_000)).unwrap();

        let acquired_at = clock.current.get();
        assert!(acquired_at >= Timespec::from_nanos(4_321));
        assert!(acquired_at <= Timespec::from_nanos(4_321 + interval));
    }

    #[test]
    fn test_clock_regression_resets_to_full_interval() {
        let clock = ManualClock::at(0);
        let acquirer = PollingAcquirer::new(clock.clone(), Timespec::from_nanos(1_000));
        let lock = released_at(&clock, u64::MAX >> 2);

        // Inside the final interval, then stepped back, then past the deadline
        clock.script(&[9_500, 5_000, 10_001]);
        let result = acquirer.acquire(&lock, &Timespec::from_nanos(10_000));

        assert_eq!(result, Err(ThreadError::TimedOut));
        assert_eq!(
            *clock.sleeps.borrow(),
            vec![Timespec::from_nanos(500), Timespec::from_nanos(1_000)]
        );
    }

    #[test]
    fn test_zero_pause_yields_instead_of_sleeping() {
        let clock = ManualClock::at(0);
        let acquirer = PollingAcquirer::new(clock.clone(), Timespec::from_nanos(1_000));
        let lock = released_at(&clock, u64::MAX >> 2);

        clock.script(&[10_000, 10_001]);
        let result = acquirer.acquire(&lock, &Timespec::from_nanos(10_000));

        assert_eq!(result, Err(ThreadError::TimedOut));
        assert_eq!(clock.yields.get(), 1);
        assert!(clock.sleeps.borrow().is_empty());
    }

    #[test]
    fn test_zero_interval_never_sleeps() {
        let clock = ManualClock::at(0);
        let acquirer = PollingAcquirer::new(clock.clone(), Timespec::ZERO);
        let lock = released_at(&clock, u64::MAX >> 2);

        clock.script(&[1, 2, 3, 11]);
        let result = acquirer.acquire(&lock, &Timespec::from_nanos(10));

        assert_eq!(result, Err(ThreadError::TimedOut));
        assert_eq!(clock.yields.get(), 3);
        assert!(clock.sleeps.borrow().is_empty());
    }

    #[test]
    fn test_native_failure_is_not_retried() {
        let clock = ManualClock::at(0);
        let acquirer = PollingAcquirer::new(clock.clone(), Timespec::from_nanos(1_000));

        let result = acquirer.acquire(&Failing, &Timespec::from_nanos(10_000));

        assert!(matches!(result, Err(ThreadError::Native { .. })));
        assert_eq!(clock.samples.get(), 0);
    }

    #[test]
    fn test_clock_failure_is_error() {
        let clock = ManualClock::at(0);
        clock.fail_now.set(true);
        let acquirer = PollingAcquirer::new(clock.clone(), Timespec::from_nanos(1_000));
        let lock = released_at(&clock, u64::MAX >> 2);

        let result = acquirer.acquire(&lock, &Timespec::from_nanos(10_000));
        assert!(matches!(result, Err(ThreadError::Native { .. })));
    }

    #[test]
    fn test_interval_longer_than_deadline_is_fatal() {
        let clock = ManualClock::at(0);
        let acquirer = PollingAcquirer::new(clock.clone(), Timespec::from_nanos(1_000));
        let lock = released_at(&clock, u64::MAX >> 2);
        let before = failure_count();

        let result = acquirer.acquire(&lock, &Timespec::from_nanos(500));
        assert!(matches!(result, Err(ThreadError::InvalidTimestamp(_))));
        assert!(failure_count() > before);
    }

    #[test]
    fn test_unnormalized_deadline_rejected() {
        let clock = ManualClock::at(0);
        let acquirer = PollingAcquirer::new(clock.clone(), Timespec::from_nanos(1_000));
        let lock = released_at(&clock, 0);

        let before = failure_count();

        let result = acquirer.acquire(&lock, &Timespec::new(1, 2_000_000_000));
        assert!(matches!(result, Err(ThreadError::InvalidTimestamp(_))));
        assert_eq!(lock.attempts.get(), 0);
        assert!(failure_count() > before);
    }
}
