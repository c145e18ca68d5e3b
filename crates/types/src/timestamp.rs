// This file is part of Warden.
//
// Warden is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Warden is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Warden.
// If not, see https://www.gnu.org/licenses/.

//! Timestamps and clocks for time-gated authorization checks.

use std::{
    fmt,
    fmt::{Debug, Display, Formatter},
    ops::{Add, AddAssign, Sub, SubAssign},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use chrono::{DateTime, TimeZone, Utc};

/// A point in time expressed as seconds since the epoch.
///
/// Can be shifted by adding or subtracting a `Duration`. Recovery delays,
/// proposal expiries and quota windows are all expressed as comparisons
/// between timestamps read from a [`Clock`] at call time.

// Doesn't derive Debug because it has a custom implementation.
#[derive(Clone, Copy, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Minimum timestamp value
    pub const MIN: Timestamp = Timestamp(u64::MIN);
    /// Maximum timestamp value
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Create a new timestamp from seconds since the epoch.
    pub fn new(seconds_since_epoch: u64) -> Self {
        Self(seconds_since_epoch)
    }

    /// Create a new timestamp representing the current time.
    pub fn now() -> Self {
        Self(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_secs(),
        )
    }

    /// Returns the number of seconds since the epoch of this timestamp.
    pub fn seconds_since_epoch(self) -> u64 {
        self.0
    }
}

impl From<u64> for Timestamp {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, duration: Duration) -> Self::Output {
        Self(self.0 + duration.as_secs())
    }
}

impl AddAssign<Duration> for Timestamp {
    fn add_assign(&mut self, duration: Duration) {
        *self = *self + duration;
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Self;

    fn sub(self, duration: Duration) -> Self::Output {
        Self(self.0 - duration.as_secs())
    }
}

impl SubAssign<Duration> for Timestamp {
    fn sub_assign(&mut self, duration: Duration) {
        *self = *self - duration
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let datetime = i64::try_from(self.0)
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
        match datetime {
            Some(datetime) => Display::fmt(&datetime, f),
            None => write!(f, "later than {}", DateTime::<Utc>::MAX_UTC),
        }
    }
}

impl Debug for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({} = {})", self.0, self)
    }
}

/// A source of the current time.
///
/// Time gates compare against `now()` read at call time, never cached.
pub trait Clock: Debug + Send + Sync {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the system time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually advanced clock for tests and scripted runs.
#[derive(Debug, Default)]
pub struct SimClock {
    now: AtomicU64,
}

impl SimClock {
    /// Create a clock starting at the given time.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start.seconds_since_epoch()),
        }
    }

    /// Set the current time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now.seconds_since_epoch(), Ordering::SeqCst);
    }

    /// Move the current time forward.
    pub fn advance(&self, duration: Duration) {
        self.now.fetch_add(duration.as_secs(), Ordering::SeqCst);
    }
}

impl Clock for SimClock {
    fn now(&self) -> Timestamp {
        Timestamp::new(self.now.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_wrapping_and_unwrapping_seconds() {
        assert_eq!(Timestamp::new(123).seconds_since_epoch(), 123);
    }

    #[test]
    fn test_now() {
        let actual_now_seconds = Timestamp::now().seconds_since_epoch();
        let expected_now_seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("current time should be after epoch")
            .as_secs();
        assert!(actual_now_seconds - expected_now_seconds < 2);
    }

    #[test]
    fn test_adding_duration() {
        let mut timestamp = Timestamp::new(100);
        let duration = Duration::from_millis(12345);
        let expected_sum = Timestamp::new(112);
        assert_eq!(timestamp + duration, expected_sum);
        timestamp += duration;
        assert_eq!(timestamp, expected_sum);
    }

    #[test]
    fn test_subtracting_duration() {
        let mut timestamp = Timestamp::new(112);
        let duration = Duration::from_millis(12345);
        let expected_difference = Timestamp::new(100);
        assert_eq!(timestamp - duration, expected_difference);
        timestamp -= duration;
        assert_eq!(timestamp, expected_difference);
    }

    #[test]
    fn test_in_bounds_display() {
        let actual = Timestamp::new(100).to_string();
        assert_eq!(actual, "1970-01-01 00:01:40 UTC");
    }

    #[test]
    fn test_out_of_bounds_display() {
        let actual = Timestamp::new(1 << 44).to_string();
        assert_eq!(actual, "later than +262143-12-31 23:59:59.999999999 UTC");
    }

    #[test]
    fn test_debug() {
        let actual = format!("{:?}", Timestamp::new(100));
        assert_eq!(actual, "Timestamp(100 = 1970-01-01 00:01:40 UTC)");
    }

    #[test]
    fn test_sim_clock_advances() {
        let clock = SimClock::new(Timestamp::new(1_000));
        assert_eq!(clock.now(), Timestamp::new(1_000));
        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), Timestamp::new(1_090));
        clock.set(Timestamp::new(50));
        assert_eq!(clock.now(), Timestamp::new(50));
    }
}
