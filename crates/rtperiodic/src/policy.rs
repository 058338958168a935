//! Real-time policy mapping.
//!
//! A [`RealtimePolicy`] turns an abstract `(priority, periodic, period)`
//! request into native scheduling attributes for the calling thread. The
//! implementation is chosen at build time:
//!
//! - **Linux**: `FixedPriorityPolicy`, POSIX `SCHED_FIFO` plus a priority
//! - **Apple**: `TimeConstraintPolicy`, a Mach `{period, computation,
//!   constraint}` triple plus an importance hint
//! - **Other**: `BestEffortPolicy`, no native real-time class
//!
//! The thread lifecycle only ever talks to the trait.

use core::fmt;
use std::sync::Arc;

use crate::error::{RTError, RTResult};
use crate::platform;
use crate::timespec::Timestamp;

pub use crate::platform::PlatformPolicy as DefaultPolicy;

/// Scheduling request handed to a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyRequest {
    /// Scheduler-class-relative priority
    pub priority: i32,
    /// Whether the thread runs on a fixed period
    pub periodic: bool,
    /// Period; ignored for non-periodic threads
    pub period: Timestamp,
}

/// Legal priority range of a scheduling class, inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityRange {
    /// Lowest legal priority
    pub min: i32,
    /// Highest legal priority
    pub max: i32,
}

impl PriorityRange {
    /// Check if `priority` lies within the range.
    #[inline]
    pub fn contains(&self, priority: i32) -> bool {
        (self.min..=self.max).contains(&priority)
    }

    /// Reject priorities outside the range.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidPriority`] when `priority` is out of range.
    pub fn check(&self, priority: i32) -> RTResult {
        if self.contains(priority) {
            Ok(())
        } else {
            Err(RTError::InvalidPriority {
                requested: priority,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// Strategy that applies native real-time scheduling to the calling thread.
pub trait RealtimePolicy: fmt::Debug + Send + Sync {
    /// Short name of the native policy, for logs.
    fn name(&self) -> &'static str;

    /// Legal priority range for this policy.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::SchedulingPolicy`] if the OS query fails.
    fn priority_range(&self) -> RTResult<PriorityRange>;

    /// Apply `request` to the calling thread.
    ///
    /// Partial configuration is not rolled back on failure. A missing
    /// privilege degrades to a warning rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidPriority`] or [`RTError::SchedulingPolicy`].
    fn apply(&self, request: &PolicyRequest) -> RTResult;
}

/// Shared instance of the build-selected policy.
pub fn default_policy() -> Arc<dyn RealtimePolicy> {
    Arc::new(DefaultPolicy::default())
}

/// Highest legal priority of the default policy.
///
/// # Errors
///
/// Returns [`RTError::SchedulingPolicy`] if the OS query fails.
pub fn maximum_priority() -> RTResult<i32> {
    Ok(DefaultPolicy::default().priority_range()?.max)
}

/// Lowest legal priority of the default policy.
///
/// # Errors
///
/// Returns [`RTError::SchedulingPolicy`] if the OS query fails.
pub fn minimum_priority() -> RTResult<i32> {
    Ok(DefaultPolicy::default().priority_range()?.min)
}

/// `(scheduling class, priority)` of the calling thread.
///
/// # Errors
///
/// Returns [`RTError::SchedulingPolicy`] if the OS query fails.
pub fn current_thread_scheduling() -> RTResult<(i32, i32)> {
    platform::current_thread_scheduling()
}

/// Computation budget as a share of the period.
pub const COMPUTATION_PERCENT: u64 = 90;

/// Completion constraint as a share of the period.
pub const CONSTRAINT_PERCENT: u64 = 95;

/// Ratio converting host ticks to nanoseconds: `nanos = ticks * numer / denom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimebaseRatio {
    /// Numerator
    pub numer: u32,
    /// Denominator, never zero
    pub denom: u32,
}

impl TimebaseRatio {
    /// One tick per nanosecond.
    pub const IDENTITY: TimebaseRatio = TimebaseRatio { numer: 1, denom: 1 };

    /// Convert host ticks to nanoseconds, saturating.
    pub fn ticks_to_nanos(&self, ticks: u64) -> u64 {
        let nanos = u128::from(ticks) * u128::from(self.numer) / u128::from(self.denom.max(1));
        u64::try_from(nanos).unwrap_or(u64::MAX)
    }

    /// Convert nanoseconds to host ticks, saturating.
    pub fn nanos_to_ticks(&self, nanos: u64) -> u64 {
        let ticks = u128::from(nanos) * u128::from(self.denom) / u128::from(self.numer.max(1));
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }
}

/// Time-constraint triple in host ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeConstraint {
    /// Nominal period
    pub period: u32,
    /// Computation budget per period
    pub computation: u32,
    /// Deadline for the computation, relative to the period start
    pub constraint: u32,
}

impl TimeConstraint {
    /// Derive the triple from a period: computation at 90 %, constraint at
    /// 95 %. Values beyond `u32::MAX` ticks saturate.
    pub fn from_period(period: Timestamp, ratio: TimebaseRatio) -> Self {
        let period_nanos = u64::try_from(period.as_nanos()).unwrap_or(u64::MAX);
        let period_ticks = ratio.nanos_to_ticks(period_nanos);
        let share = |percent: u64| {
            let ticks = u128::from(period_ticks) * u128::from(percent) / 100;
            u32::try_from(ticks).unwrap_or(u32::MAX)
        };
        Self {
            period: u32::try_from(period_ticks).unwrap_or(u32::MAX),
            computation: share(COMPUTATION_PERCENT),
            constraint: share(CONSTRAINT_PERCENT),
        }
    }
}
