//! Utilities to deal with time sources.
//!
//! The engine reads two kinds of time: a monotonic reading used for call durations and sampling
//! windows, and a wall-clock reading used for snapshot timestamps. Both are provided by a
//! [`Clock`], so tests can drive time explicitly with a [`ManualClock`].

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};

/// A source of monotonic and wall-clock time.
pub trait Clock {
    /// Returns the monotonic time elapsed since an arbitrary, fixed origin.
    fn monotonic(&self) -> Duration;

    /// Returns the current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Returns the monotonic time in whole milliseconds.
    fn monotonic_ms(&self) -> u64 {
        duration_to_millis(self.monotonic())
    }
}

/// The system clock, measuring monotonic time from its own creation.
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// Creates a new system clock with its origin at the current instant.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same underlying time, so a test can keep one handle and pass another to the
/// component under test.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tripwire_common::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let handle = clock.clone();
///
/// clock.advance(Duration::from_millis(500));
/// assert_eq!(handle.monotonic_ms(), 500);
/// ```
#[derive(Clone)]
pub struct ManualClock {
    inner: Rc<ManualClockInner>,
}

struct ManualClockInner {
    epoch: DateTime<Utc>,
    elapsed: Cell<Duration>,
}

impl ManualClock {
    /// Creates a manual clock starting at the unix epoch with zero elapsed time.
    pub fn new() -> Self {
        Self::starting_at(DateTime::UNIX_EPOCH)
    }

    /// Creates a manual clock whose wall-clock reading starts at `epoch`.
    pub fn starting_at(epoch: DateTime<Utc>) -> Self {
        Self {
            inner: Rc::new(ManualClockInner {
                epoch,
                elapsed: Cell::new(Duration::ZERO),
            }),
        }
    }

    /// Moves the clock forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        let elapsed = self.inner.elapsed.get();
        self.inner.elapsed.set(elapsed + delta);
    }

    /// Moves the clock forward by `ms` milliseconds.
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ManualClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualClock")
            .field("epoch", &self.inner.epoch)
            .field("elapsed", &self.inner.elapsed.get())
            .finish()
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> Duration {
        self.inner.elapsed.get()
    }

    fn now(&self) -> DateTime<Utc> {
        TimeDelta::from_std(self.inner.elapsed.get())
            .ok()
            .and_then(|elapsed| self.inner.epoch.checked_add_signed(elapsed))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// Converts a duration into whole milliseconds, saturating at `u64::MAX`.
pub fn duration_to_millis(duration: Duration) -> u64 {
    duration.as_millis().try_into().unwrap_or(u64::MAX)
}

/// Converts a duration into whole nanoseconds, saturating at `u64::MAX`.
pub fn duration_to_nanos(duration: Duration) -> u64 {
    duration.as_nanos().try_into().unwrap_or(u64::MAX)
}

/// Returns the duration as fractional milliseconds.
pub fn duration_to_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared() {
        let clock = ManualClock::new();
        let other = clock.clone();

        clock.advance_ms(1500);
        assert_eq!(other.monotonic_ms(), 1500);
        assert_eq!(other.now().timestamp_millis(), 1500);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let first = clock.monotonic();
        let second = clock.monotonic();
        assert!(second >= first);
    }

    #[test]
    fn test_duration_conversions() {
        let duration = Duration::from_micros(2500);
        assert_eq!(duration_to_millis(duration), 2);
        assert_eq!(duration_to_nanos(duration), 2_500_000);
        similar_asserts::assert_eq!(duration_to_millis_f64(duration), 2.5);
    }
}
