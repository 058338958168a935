//! Nanosecond-precision timestamps and the arithmetic the scheduler runs on.
//!
//! A [`Timestamp`] is a `(seconds, nanoseconds)` pair that is always stored
//! normalized: `nanoseconds < 1_000_000_000` and never negative. The same type
//! doubles as a duration when used as a period.

use core::fmt;
use core::ops::Add;
use core::time::Duration;
use serde::{Deserialize, Serialize};

/// Nanoseconds in one second.
pub const NSEC_PER_SEC: u64 = 1_000_000_000;

const NSEC_PER_SEC_I128: i128 = NSEC_PER_SEC as i128;

/// Normalized `(seconds, nanoseconds)` point on a clock, or a duration.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(from = "TimestampRepr", into = "TimestampRepr")]
pub struct Timestamp {
    seconds: u64,
    nanoseconds: u32,
}

/// Wire form; normalized on the way in.
#[derive(Serialize, Deserialize)]
struct TimestampRepr {
    seconds: u64,
    nanoseconds: u64,
}

impl From<TimestampRepr> for Timestamp {
    fn from(repr: TimestampRepr) -> Self {
        normalize(repr.seconds, repr.nanoseconds)
    }
}

impl From<Timestamp> for TimestampRepr {
    fn from(ts: Timestamp) -> Self {
        Self {
            seconds: ts.seconds,
            nanoseconds: u64::from(ts.nanoseconds),
        }
    }
}

impl Timestamp {
    /// The zero timestamp.
    pub const ZERO: Timestamp = Timestamp {
        seconds: 0,
        nanoseconds: 0,
    };

    /// Create a timestamp, carrying excess nanoseconds into seconds.
    pub fn new(seconds: u64, nanoseconds: u64) -> Self {
        normalize(seconds, nanoseconds)
    }

    /// Create a timestamp from a nanosecond count.
    pub fn from_nanos(nanos: u64) -> Self {
        normalize(0, nanos)
    }

    /// Create a timestamp from signed parts as received across the binding
    /// boundary. Negative totals clamp to [`Timestamp::ZERO`].
    pub fn from_signed_parts(seconds: i64, nanoseconds: i64) -> Self {
        let total = i128::from(seconds) * NSEC_PER_SEC_I128 + i128::from(nanoseconds);
        Self::from_total_nanos(total)
    }

    /// Build from a signed total, saturating at both ends of the range.
    fn from_total_nanos(total: i128) -> Self {
        if total <= 0 {
            return Self::ZERO;
        }
        let seconds = total / NSEC_PER_SEC_I128;
        let nanoseconds = total % NSEC_PER_SEC_I128;
        match u64::try_from(seconds) {
            Ok(seconds) => Self {
                seconds,
                // Remainder is in [0, 1e9).
                nanoseconds: nanoseconds as u32,
            },
            Err(_) => Self {
                seconds: u64::MAX,
                nanoseconds: (NSEC_PER_SEC - 1) as u32,
            },
        }
    }

    /// Whole seconds.
    #[inline]
    pub fn seconds(&self) -> u64 {
        self.seconds
    }

    /// Sub-second nanoseconds, always below one second.
    #[inline]
    pub fn nanoseconds(&self) -> u32 {
        self.nanoseconds
    }

    /// Total nanoseconds.
    #[inline]
    pub fn as_nanos(&self) -> u128 {
        u128::from(self.seconds) * u128::from(NSEC_PER_SEC) + u128::from(self.nanoseconds)
    }

    /// Total nanoseconds as `i64`, saturating after ~292 years.
    #[inline]
    pub fn as_nanos_i64(&self) -> i64 {
        i64::try_from(self.as_nanos()).unwrap_or(i64::MAX)
    }

    /// Interpret as a duration.
    #[inline]
    pub fn as_duration(&self) -> Duration {
        Duration::new(self.seconds, self.nanoseconds)
    }

    /// Check for the zero timestamp.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.nanoseconds == 0
    }

    /// `self + duration + extra_nanos`, normalized.
    pub fn add_with_offset(&self, duration: Timestamp, extra_nanos: i64) -> Timestamp {
        add(*self, duration, extra_nanos)
    }

    /// Signed nanoseconds from `self` to `later`.
    pub fn delta_to(&self, later: Timestamp) -> i64 {
        delta(*self, later)
    }

    fn total_nanos_i128(&self) -> i128 {
        i128::from(self.seconds) * NSEC_PER_SEC_I128 + i128::from(self.nanoseconds)
    }
}

/// Carry nanoseconds ≥ 1e9 into seconds.
pub fn normalize(seconds: u64, nanoseconds: u64) -> Timestamp {
    let carry = nanoseconds / NSEC_PER_SEC;
    Timestamp {
        seconds: seconds.saturating_add(carry),
        // Remainder is in [0, 1e9).
        nanoseconds: (nanoseconds % NSEC_PER_SEC) as u32,
    }
}

/// `ts + duration + extra_nanos`.
///
/// The signed offset shifts a wake time within a period without touching the
/// period itself. A negative offset borrows from the seconds; the result
/// saturates at zero.
pub fn add(ts: Timestamp, duration: Timestamp, extra_nanos: i64) -> Timestamp {
    let total =
        ts.total_nanos_i128() + duration.total_nanos_i128() + i128::from(extra_nanos);
    Timestamp::from_total_nanos(total)
}

/// Signed nanoseconds from `a` to `b`; positive when `b` is after `a`.
///
/// Saturates at the `i64` range (differences beyond ~292 years).
pub fn delta(a: Timestamp, b: Timestamp) -> i64 {
    let diff = b.total_nanos_i128() - a.total_nanos_i128();
    i64::try_from(diff).unwrap_or(if diff < 0 { i64::MIN } else { i64::MAX })
}

/// Strict ordering by seconds, then nanoseconds.
#[inline]
pub fn less_than(a: Timestamp, b: Timestamp) -> bool {
    if a.seconds == b.seconds {
        a.nanoseconds < b.nanoseconds
    } else {
        a.seconds < b.seconds
    }
}

impl Add for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Timestamp) -> Timestamp {
        add(self, rhs, 0)
    }
}

impl From<Duration> for Timestamp {
    fn from(duration: Duration) -> Self {
        Self {
            seconds: duration.as_secs(),
            nanoseconds: duration.subsec_nanos(),
        }
    }
}

impl From<Timestamp> for Duration {
    fn from(ts: Timestamp) -> Self {
        ts.as_duration()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s {}ns", self.seconds, self.nanoseconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_carries() {
        let ts = normalize(1, 2_500_000_000);
        assert_eq!(ts.seconds(), 3);
        assert_eq!(ts.nanoseconds(), 500_000_000);

        let exact = normalize(0, NSEC_PER_SEC);
        assert_eq!(exact, Timestamp::new(1, 0));
    }

    #[test]
    fn test_add_carries_second_boundary() {
        let ts = Timestamp::new(10, 999_999_999);
        let next = add(ts, Timestamp::from_nanos(1), 0);
        assert_eq!(next, Timestamp::new(11, 0));
    }

    #[test]
    fn test_add_negative_offset_borrows() {
        let ts = Timestamp::new(5, 100);
        let shifted = add(ts, Timestamp::ZERO, -200);
        assert_eq!(shifted.seconds(), 4);
        assert_eq!(shifted.nanoseconds(), 999_999_900);
    }

    #[test]
    fn test_add_saturates_at_zero() {
        let shifted = add(Timestamp::new(0, 10), Timestamp::ZERO, -1_000);
        assert_eq!(shifted, Timestamp::ZERO);
    }

    #[test]
    fn test_delta_sign() {
        let a = Timestamp::new(1, 900_000_000);
        let b = Timestamp::new(2, 100_000_000);
        assert_eq!(delta(a, b), 200_000_000);
        assert_eq!(delta(b, a), -200_000_000);
        assert_eq!(delta(a, a), 0);
    }

    #[test]
    fn test_less_than() {
        assert!(less_than(Timestamp::new(1, 5), Timestamp::new(1, 6)));
        assert!(less_than(Timestamp::new(1, 999), Timestamp::new(2, 0)));
        assert!(!less_than(Timestamp::new(2, 0), Timestamp::new(2, 0)));
        assert_eq!(
            less_than(Timestamp::new(3, 1), Timestamp::new(2, 7)),
            Timestamp::new(3, 1) < Timestamp::new(2, 7)
        );
    }

    #[test]
    fn test_signed_parts_clamp() {
        assert_eq!(Timestamp::from_signed_parts(-1, 0), Timestamp::ZERO);
        assert_eq!(
            Timestamp::from_signed_parts(2, -500_000_000),
            Timestamp::new(1, 500_000_000)
        );
    }

    #[test]
    fn test_duration_conversion() {
        let ts = Timestamp::from(Duration::from_millis(1_500));
        assert_eq!(ts, Timestamp::new(1, 500_000_000));
        assert_eq!(ts.as_duration(), Duration::from_millis(1_500));
        assert_eq!(ts.as_nanos_i64(), 1_500_000_000);
    }

    #[test]
    fn test_display() {
        assert_eq!(Timestamp::new(3, 42).to_string(), "3s 42ns");
    }

    #[test]
    fn test_serde_normalizes() -> Result<(), serde_json::Error> {
        let ts: Timestamp = serde_json::from_str(r#"{"seconds":1,"nanoseconds":1500000000}"#)?;
        assert_eq!(ts, Timestamp::new(2, 500_000_000));
        let json = serde_json::to_string(&ts)?;
        assert_eq!(json, r#"{"seconds":2,"nanoseconds":500000000}"#);
        Ok(())
    }
}
