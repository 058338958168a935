//! Absolute-time waiter.

use tracing::trace;

use crate::clock;
use crate::error::RTResult;
use crate::platform;
use crate::timespec::{Timestamp, delta};

/// Block the calling thread until the monotonic clock reaches `target`.
///
/// Returns the lateness measured before sleeping: `target - now` in
/// nanoseconds. A negative value means the deadline had already passed and
/// the call returned without blocking. Signal interruptions are retried
/// internally and never shorten the wait.
///
/// # Errors
///
/// Returns [`crate::RTError::ClockUnavailable`] if the clock cannot be read,
/// or [`crate::RTError::WaitFailed`] if the sleep primitive fails for any
/// reason other than an interruption.
pub fn wait_until_absolute(target: Timestamp) -> RTResult<i64> {
    let now = clock::now()?;
    let lateness = delta(now, target);
    if lateness < 0 {
        trace!(lateness, "deadline already passed");
        return Ok(lateness);
    }
    platform::sleep_until(target, now)?;
    Ok(lateness)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timespec::add;

    #[test]
    fn test_past_target_returns_negative_without_blocking() -> RTResult {
        let now = clock::now()?;
        let past = Timestamp::from_signed_parts(0, now.as_nanos_i64() - 5_000_000);
        let lateness = wait_until_absolute(past)?;
        assert!(lateness <= -5_000_000);
        assert!(clock::now()?.delta_to(now).abs() < 5_000_000);
        Ok(())
    }

    #[test]
    fn test_future_target_blocks_until_deadline() -> RTResult {
        let start = clock::now()?;
        let target = add(start, Timestamp::from_nanos(3_000_000), 0);
        let lateness = wait_until_absolute(target)?;
        let woke = clock::now()?;
        assert!(lateness >= 0 && lateness <= 3_000_000);
        assert!(!woke.lt(&target));
        Ok(())
    }

    #[cfg(target_os = "linux")]
    mod interrupted {
        use std::mem;
        use std::os::unix::thread::JoinHandleExt;
        use std::ptr;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        use super::*;
        use crate::error::{RTError, last_errno};

        type TestResult = Result<(), Box<dyn std::error::Error>>;

        static DELIVERED: AtomicUsize = AtomicUsize::new(0);

        extern "C" fn count_signal(_signal: libc::c_int) {
            DELIVERED.fetch_add(1, Ordering::Relaxed);
        }

        /// SIGUSR1 handler installed without `SA_RESTART`, so every
        /// delivery interrupts a sleeping thread with `EINTR`.
        fn install_interrupting_handler() -> RTResult {
            // SAFETY: an all-zero sigaction is a valid empty action.
            let mut action: libc::sigaction = unsafe { mem::zeroed() };
            action.sa_sigaction = count_signal as *const () as libc::sighandler_t;
            action.sa_flags = 0;
            // SAFETY: `sa_mask` is a live, writable sigset_t.
            let rc = unsafe { libc::sigemptyset(&mut action.sa_mask) };
            if rc != 0 {
                return Err(RTError::WaitFailed { errno: last_errno() });
            }
            // SAFETY: `action` is fully initialized and the handler only
            // touches an atomic.
            let rc = unsafe { libc::sigaction(libc::SIGUSR1, &action, ptr::null_mut()) };
            if rc != 0 {
                return Err(RTError::WaitFailed { errno: last_errno() });
            }
            Ok(())
        }

        #[test]
        fn test_signals_do_not_shorten_wait() -> TestResult {
            install_interrupting_handler()?;

            let waiter = std::thread::spawn(|| -> RTResult<(Timestamp, i64, Timestamp)> {
                let target = add(clock::now()?, Timestamp::from_nanos(150_000_000), 0);
                let lateness = wait_until_absolute(target)?;
                Ok((target, lateness, clock::now()?))
            });

            let native = waiter.as_pthread_t();
            for _ in 0..5 {
                std::thread::sleep(Duration::from_millis(15));
                // SAFETY: the waiter has not been joined, so its pthread_t
                // is still valid even if the body already returned.
                let rc = unsafe { libc::pthread_kill(native, libc::SIGUSR1) };
                assert_eq!(rc, 0);
            }

            let (target, lateness, woke) = waiter.join().map_err(|_| "waiting thread panicked")??;
            assert!(DELIVERED.load(Ordering::Relaxed) > 0);
            assert!(lateness >= 0);
            assert!(woke >= target);
            Ok(())
        }
    }
}
