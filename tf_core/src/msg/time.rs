use std::{fmt, time::Duration};

use chrono::{TimeDelta, Utc};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// A point in time, stored the way `builtin_interfaces/Time` does.
///
/// `nanosec` is always below one second, so the derived ordering is the
/// chronological one. [`Time::ZERO`] doubles as "latest available" in lookups.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time {
    pub sec: i32,
    pub nanosec: u32,
}

impl Time {
    pub const ZERO: Time = Time { sec: 0, nanosec: 0 };
    pub const MIN: Time = Time {
        sec: i32::MIN,
        nanosec: 0,
    };
    pub const MAX: Time = Time {
        sec: i32::MAX,
        nanosec: 999_999_999,
    };

    /// Builds a stamp, carrying excess nanoseconds into seconds.
    pub fn new(sec: i32, nanosec: u32) -> Self {
        Self::from_nanos(i64::from(sec) * NANOS_PER_SEC + i64::from(nanosec))
    }

    /// Saturates at [`Time::MIN`] and [`Time::MAX`].
    pub fn from_nanos(nanos: i64) -> Self {
        let sec = nanos.div_euclid(NANOS_PER_SEC);
        if sec < i64::from(i32::MIN) {
            return Self::MIN;
        }
        if sec > i64::from(i32::MAX) {
            return Self::MAX;
        }
        Self {
            sec: sec as i32,
            nanosec: nanos.rem_euclid(NANOS_PER_SEC) as u32,
        }
    }

    pub fn from_sec_f64(secs: f64) -> Self {
        Self::from_nanos((secs * 1e9).round() as i64)
    }

    pub fn to_nanos(self) -> i64 {
        i64::from(self.sec) * NANOS_PER_SEC + i64::from(self.nanosec)
    }

    pub fn to_sec_f64(self) -> f64 {
        self.to_nanos() as f64 * 1e-9
    }

    /// Wall clock time, saturating at [`Time::MAX`] once seconds no longer fit an `i32`.
    pub fn now() -> Self {
        let now = Utc::now();
        Self::from_timestamp(now.timestamp(), now.timestamp_subsec_nanos())
    }

    fn from_timestamp(sec: i64, nanosec: u32) -> Self {
        match i32::try_from(sec) {
            // leap seconds are reported as nanosec >= 1e9
            Ok(sec) => Self {
                sec,
                nanosec: nanosec % 1_000_000_000,
            },
            Err(_) if sec < 0 => Self::MIN,
            Err(_) => Self::MAX,
        }
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    /// Signed distance from `earlier` to `self`.
    pub fn since(self, earlier: Time) -> TimeDelta {
        TimeDelta::nanoseconds(self.to_nanos() - earlier.to_nanos())
    }

    pub fn saturating_sub(self, duration: Duration) -> Self {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        Self::from_nanos(self.to_nanos().saturating_sub(nanos))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9}", self.to_sec_f64())
    }
}
