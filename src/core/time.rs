/*!
 * Timestamps
 *
 * `Timespec` is the (seconds, nanoseconds) pair used for deadlines, sleep
 * durations and clock samples. Arithmetic is checked: a subtraction borrows
 * at most one second into the nanosecond field and anything still negative
 * afterwards is reported as `InvalidTimestamp`, never clamped.
 *
 * # Time base
 *
 * `Timespec::now()` samples `CLOCK_REALTIME`, the same clock the native
 * condition-variable timed wait uses by default. Deadlines built against any
 * other clock will be compared against the wrong base; nothing here tries to
 * detect or correct that.
 */

use crate::core::errors::{ThreadError, ThreadResult};
use crate::monitoring::report_native_failure;
use nix::time::{clock_gettime, ClockId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Nanoseconds in one second
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Absolute timestamp or relative duration
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timespec {
    pub sec: i64,
    pub nsec: i64,
}

impl Timespec {
    pub const ZERO: Timespec = Timespec { sec: 0, nsec: 0 };

    #[inline]
    pub const fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }
    }

    /// Build a normalized timespec from a nanosecond count
    pub const fn from_nanos(nanos: u64) -> Self {
        Self {
            sec: (nanos / NANOS_PER_SEC as u64) as i64,
            nsec: (nanos % NANOS_PER_SEC as u64) as i64,
        }
    }

    /// Sample the realtime clock
    pub fn now() -> ThreadResult<Self> {
        match clock_gettime(ClockId::CLOCK_REALTIME) {
            Ok(ts) => Ok(Self::new(ts.tv_sec() as i64, ts.tv_nsec() as i64)),
            Err(errno) => {
                let code = errno as i32;
                report_native_failure("clock_gettime", code);
                Err(ThreadError::native("clock_gettime", code))
            }
        }
    }

    /// Deadline `duration` from now on the realtime clock
    pub fn after(duration: Duration) -> ThreadResult<Self> {
        Self::now()?.checked_add(duration)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.sec == 0 && self.nsec == 0
    }

    /// Nanoseconds within `[0, 1s)` and non-negative seconds
    #[inline]
    pub const fn is_normalized(&self) -> bool {
        self.sec >= 0 && self.nsec >= 0 && self.nsec < NANOS_PER_SEC
    }

    /// `self - other`, borrowing one second if the nanosecond field underflows
    ///
    /// Fails with `InvalidTimestamp` if either field is still negative after
    /// the borrow.
    pub fn checked_sub(&self, other: &Timespec) -> ThreadResult<Timespec> {
        let invalid = || {
            ThreadError::InvalidTimestamp(format!("{} - {} is negative or out of range", self, other))
        };

        let mut sec = self.sec.checked_sub(other.sec).ok_or_else(invalid)?;
        let mut nsec = self.nsec.checked_sub(other.nsec).ok_or_else(invalid)?;

        if nsec < 0 {
            nsec = nsec.checked_add(NANOS_PER_SEC).ok_or_else(invalid)?;
            sec = sec.checked_sub(1).ok_or_else(invalid)?;
        }

        if sec < 0 || nsec < 0 {
            return Err(invalid());
        }

        Ok(Timespec { sec, nsec })
    }

    /// `self + duration` with nanosecond carry
    pub fn checked_add(&self, duration: Duration) -> ThreadResult<Timespec> {
        let overflow = || ThreadError::InvalidTimestamp(format!("{} + {:?} overflows", self, duration));

        let add_sec = i64::try_from(duration.as_secs()).map_err(|_| overflow())?;
        let mut sec = self.sec.checked_add(add_sec).ok_or_else(overflow)?;
        let mut nsec = self
            .nsec
            .checked_add(i64::from(duration.subsec_nanos()))
            .ok_or_else(overflow)?;

        if nsec >= NANOS_PER_SEC {
            nsec -= NANOS_PER_SEC;
            sec = sec.checked_add(1).ok_or_else(overflow)?;
        }

        Ok(Timespec { sec, nsec })
    }

    /// Convert to a `Duration`; `None` if the value is not a valid duration
    pub fn as_duration(&self) -> Option<Duration> {
        if !self.is_normalized() {
            return None;
        }
        Some(Duration::new(self.sec as u64, self.nsec as u32))
    }

    #[inline]
    pub fn to_libc(self) -> libc::timespec {
        libc::timespec {
            tv_sec: self.sec as libc::time_t,
            tv_nsec: self.nsec as _,
        }
    }

    #[inline]
    pub fn from_libc(ts: &libc::timespec) -> Self {
        Self::new(ts.tv_sec as i64, ts.tv_nsec as i64)
    }
}

impl From<Duration> for Timespec {
    fn from(duration: Duration) -> Self {
        Self {
            sec: duration.as_secs().min(i64::MAX as u64) as i64,
            nsec: i64::from(duration.subsec_nanos()),
        }
    }
}

impl fmt::Display for Timespec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}s", self.sec, self.nsec)
    }
}
