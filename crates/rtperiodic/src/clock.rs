//! Clock source.
//!
//! [`now`] reads the host's monotonic clock and is the only time base used
//! for deadlines. [`realtime_now`] reads the wall clock and is meant for
//! logging and diagnostics only.

use std::cell::Cell;

use crate::error::RTResult;
use crate::platform;
use crate::timespec::Timestamp;

thread_local! {
    static LAST_SEEN: Cell<Timestamp> = const { Cell::new(Timestamp::ZERO) };
}

/// Current monotonic time.
///
/// # Errors
///
/// Returns [`crate::RTError::ClockUnavailable`] if the clock service cannot
/// be queried.
///
/// # Panics
///
/// Panics if the clock reads earlier than a previous reading on the same
/// thread. That means the host clock is broken and nothing built on it can
/// be trusted.
pub fn now() -> RTResult<Timestamp> {
    let ts = platform::monotonic_now()?;
    LAST_SEEN.with(|last| {
        check_monotonic(last.get(), ts);
        last.set(ts);
    });
    Ok(ts)
}

fn check_monotonic(previous: Timestamp, current: Timestamp) {
    assert!(
        current >= previous,
        "monotonic clock went backwards: {current} after {previous}"
    );
}

/// Current wall-clock time since the Unix epoch.
///
/// # Errors
///
/// Returns [`crate::RTError::ClockUnavailable`] if the clock service cannot
/// be queried.
pub fn realtime_now() -> RTResult<Timestamp> {
    platform::realtime_now()
}

/// Monotonic time in nanoseconds, saturating at `i64::MAX`.
///
/// # Errors
///
/// See [`now`].
pub fn monotonic_nanos() -> RTResult<i64> {
    Ok(now()?.as_nanos_i64())
}

/// Wall-clock time in nanoseconds since the Unix epoch, saturating.
///
/// # Errors
///
/// See [`realtime_now`].
pub fn realtime_nanos() -> RTResult<i64> {
    Ok(realtime_now()?.as_nanos_i64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "monotonic clock went backwards")]
    fn test_backwards_reading_is_fatal() {
        check_monotonic(Timestamp::new(5, 0), Timestamp::new(4, 999_999_999));
    }

    #[test]
    fn test_equal_reading_is_accepted() {
        let ts = Timestamp::new(5, 0);
        check_monotonic(ts, ts);
    }

    #[test]
    fn test_now_is_monotonic() -> RTResult {
        let mut previous = now()?;
        for _ in 0..10_000 {
            let current = now()?;
            assert!(current >= previous);
            previous = current;
        }
        Ok(())
    }

    #[test]
    fn test_now_advances_across_sleep() -> RTResult {
        let before = now()?;
        std::thread::sleep(std::time::Duration::from_millis(2));
        let after = now()?;
        assert!(before.delta_to(after) >= 2_000_000);
        Ok(())
    }

    #[test]
    fn test_realtime_is_after_2020() -> RTResult {
        // 2020-01-01T00:00:00Z
        assert!(realtime_now()?.seconds() > 1_577_836_800);
        Ok(())
    }
}
