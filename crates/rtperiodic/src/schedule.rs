//! Deadline bookkeeping for one periodic thread.
//!
//! Deadlines advance by addition from the previous deadline, never from the
//! time a wait was entered, so a late wake does not shift the grid.

use parking_lot::Mutex;
use tracing::warn;

use crate::clock;
use crate::config::{OverrunPolicy, PeriodicParameters};
use crate::error::{RTError, RTResult};
use crate::timespec::{Timestamp, add};
use crate::waiter;

#[derive(Debug)]
struct ScheduleState {
    resync_to_clock: bool,
    next_trigger: Timestamp,
    period: Timestamp,
    consecutive_overruns: u32,
}

/// Shared schedule of a periodic thread.
///
/// Owned jointly by the handle and the running thread. The lock is never
/// held while sleeping.
#[derive(Debug)]
pub struct PeriodicSchedule {
    periodic: bool,
    overrun: OverrunPolicy,
    state: Mutex<ScheduleState>,
}

impl PeriodicSchedule {
    /// Build a schedule. Without an explicit start the first deadline is
    /// anchored to the clock when the thread first runs.
    pub fn new(periodic: Option<PeriodicParameters>, overrun: OverrunPolicy) -> Self {
        let state = match periodic {
            Some(params) => ScheduleState {
                resync_to_clock: params.start.is_none(),
                next_trigger: params.start.unwrap_or(Timestamp::ZERO),
                period: params.period,
                consecutive_overruns: 0,
            },
            None => ScheduleState {
                resync_to_clock: false,
                next_trigger: Timestamp::ZERO,
                period: Timestamp::ZERO,
                consecutive_overruns: 0,
            },
        };
        Self {
            periodic: periodic.is_some(),
            overrun,
            state: Mutex::new(state),
        }
    }

    /// Whether period operations are allowed.
    pub fn is_periodic(&self) -> bool {
        self.periodic
    }

    /// Configured period, if periodic.
    pub fn period(&self) -> Option<Timestamp> {
        self.periodic.then(|| self.state.lock().period)
    }

    /// Number of back-to-back missed deadlines so far.
    pub fn consecutive_overruns(&self) -> u32 {
        self.state.lock().consecutive_overruns
    }

    fn require_periodic(&self) -> RTResult {
        if self.periodic {
            Ok(())
        } else {
            Err(RTError::NotPeriodic)
        }
    }

    /// Anchor the schedule to the clock if no deadline has been set yet.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::ClockUnavailable`] if the clock cannot be read.
    pub fn resync_if_pending(&self) -> RTResult {
        let mut state = self.state.lock();
        if state.resync_to_clock {
            state.next_trigger = clock::now()?;
            state.resync_to_clock = false;
        }
        Ok(())
    }

    /// Advance the deadline by one period plus `phase_offset_ns` and sleep
    /// until it. Returns the lateness, negative when the deadline had
    /// already passed.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::NotPeriodic`] on a non-periodic schedule, or any
    /// clock or wait failure.
    pub fn wait_for_next_period(&self, phase_offset_ns: i64) -> RTResult<i64> {
        self.require_periodic()?;
        let target = {
            let mut state = self.state.lock();
            if state.resync_to_clock {
                state.next_trigger = clock::now()?;
                state.resync_to_clock = false;
            }
            state.next_trigger = add(state.next_trigger, state.period, phase_offset_ns);
            state.next_trigger
        };

        let lateness = waiter::wait_until_absolute(target)?;
        self.record_lateness(lateness)?;
        Ok(lateness)
    }

    fn record_lateness(&self, lateness: i64) -> RTResult {
        let mut state = self.state.lock();
        if lateness >= 0 {
            state.consecutive_overruns = 0;
            return Ok(());
        }
        state.consecutive_overruns = state.consecutive_overruns.saturating_add(1);
        if let Some(limit) = self.overrun.resync_after
            && state.consecutive_overruns >= limit
        {
            warn!(
                missed = state.consecutive_overruns,
                lateness_ns = lateness,
                "Persistent overrun; re-anchoring schedule to the clock"
            );
            state.next_trigger = clock::now()?;
            state.consecutive_overruns = 0;
        }
        Ok(())
    }

    /// One-shot wait to an absolute timestamp. Allowed on any schedule.
    ///
    /// # Errors
    ///
    /// Any clock or wait failure.
    pub fn wait_until(&self, target: Timestamp) -> RTResult<i64> {
        waiter::wait_until_absolute(target)
    }

    /// Re-anchor the next deadline to the current time.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::NotPeriodic`] on a non-periodic schedule, or
    /// [`RTError::ClockUnavailable`].
    pub fn set_next_period_to_clock(&self) -> RTResult {
        self.require_periodic()?;
        let now = clock::now()?;
        let mut state = self.state.lock();
        state.next_trigger = now;
        state.resync_to_clock = false;
        state.consecutive_overruns = 0;
        Ok(())
    }

    /// Re-anchor the next deadline to `timestamp`.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::NotPeriodic`] on a non-periodic schedule.
    pub fn set_next_period(&self, timestamp: Timestamp) -> RTResult {
        self.require_periodic()?;
        let mut state = self.state.lock();
        state.next_trigger = timestamp;
        state.resync_to_clock = false;
        state.consecutive_overruns = 0;
        Ok(())
    }

    /// Current deadline anchor.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::NotPeriodic`] on a non-periodic schedule.
    pub fn next_period(&self) -> RTResult<Timestamp> {
        self.require_periodic()?;
        Ok(self.state.lock().next_trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn periodic(period_ns: u64) -> PeriodicSchedule {
        PeriodicSchedule::new(
            Some(PeriodicParameters::from_nanos(period_ns)),
            OverrunPolicy::default(),
        )
    }

    #[test]
    fn test_non_periodic_rejects_period_operations() {
        let schedule = PeriodicSchedule::new(None, OverrunPolicy::default());
        assert_eq!(schedule.wait_for_next_period(0), Err(RTError::NotPeriodic));
        assert_eq!(schedule.set_next_period(Timestamp::ZERO), Err(RTError::NotPeriodic));
        assert_eq!(schedule.set_next_period_to_clock(), Err(RTError::NotPeriodic));
        assert_eq!(schedule.next_period(), Err(RTError::NotPeriodic));
        assert_eq!(schedule.period(), None);
    }

    #[test]
    fn test_explicit_start_is_used_as_anchor() -> RTResult {
        let start = Timestamp::new(42, 999_999_999);
        let schedule = PeriodicSchedule::new(
            Some(PeriodicParameters::from_nanos(10).with_start(start)),
            OverrunPolicy::default(),
        );
        schedule.resync_if_pending()?;
        assert_eq!(schedule.next_period()?, start);
        Ok(())
    }

    #[test]
    fn test_lazy_resync_anchors_to_clock() -> RTResult {
        let schedule = periodic(1_000_000);
        assert_eq!(schedule.next_period()?, Timestamp::ZERO);
        let before = clock::now()?;
        schedule.resync_if_pending()?;
        let anchor = schedule.next_period()?;
        assert!(anchor >= before);
        // A second resync is a no-op.
        schedule.resync_if_pending()?;
        assert_eq!(schedule.next_period()?, anchor);
        Ok(())
    }

    #[test]
    fn test_deadlines_advance_by_period() -> RTResult {
        let schedule = periodic(1_000_000);
        schedule.resync_if_pending()?;
        let anchor = schedule.next_period()?;
        for k in 1..=5_u64 {
            schedule.wait_for_next_period(0)?;
            assert_eq!(
                schedule.next_period()?,
                add(anchor, Timestamp::from_nanos(k * 1_000_000), 0)
            );
        }
        Ok(())
    }

    #[test]
    fn test_phase_offset_shifts_deadline() -> RTResult {
        let schedule = periodic(1_000_000);
        schedule.set_next_period_to_clock()?;
        let anchor = schedule.next_period()?;
        schedule.wait_for_next_period(250_000)?;
        assert_eq!(schedule.next_period()?, add(anchor, Timestamp::from_nanos(1_250_000), 0));
        Ok(())
    }

    #[test]
    fn test_overrun_counts_and_catches_up() -> RTResult {
        let schedule = periodic(1_000);
        schedule.set_next_period(Timestamp::new(0, 1))?;
        assert!(schedule.wait_for_next_period(0)? < 0);
        assert!(schedule.wait_for_next_period(0)? < 0);
        assert_eq!(schedule.consecutive_overruns(), 2);
        assert_eq!(schedule.next_period()?, Timestamp::from_nanos(2_001));
        Ok(())
    }

    #[test]
    fn test_overrun_policy_resyncs() -> RTResult {
        let schedule = PeriodicSchedule::new(
            Some(PeriodicParameters::from_nanos(1_000)),
            OverrunPolicy::resync_after(2),
        );
        schedule.set_next_period(Timestamp::new(0, 1))?;
        assert!(schedule.wait_for_next_period(0)? < 0);
        assert_eq!(schedule.consecutive_overruns(), 1);
        let before = clock::now()?;
        assert!(schedule.wait_for_next_period(0)? < 0);
        assert_eq!(schedule.consecutive_overruns(), 0);
        assert!(schedule.next_period()? >= before);
        Ok(())
    }
}
