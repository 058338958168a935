//! Thread configuration.
//!
//! [`ThreadConfig`] carries everything needed to create a periodic thread:
//! priority, optional periodic parameters, CPU affinity and the overrun
//! policy. It round-trips through serde so tools can load it from JSON.

use serde::{Deserialize, Serialize};

use crate::affinity;
use crate::error::{RTError, RTResult};
use crate::policy::{self, RealtimePolicy};
use crate::timespec::Timestamp;

/// Period and optional absolute start of a periodic thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicParameters {
    /// Interval between consecutive deadlines.
    pub period: Timestamp,
    /// Monotonic timestamp of the first deadline. `None` anchors the
    /// schedule to the clock on the first wait.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Timestamp>,
}

impl PeriodicParameters {
    /// Periodic parameters anchored lazily to the clock.
    pub fn new(period: Timestamp) -> Self {
        Self {
            period,
            start: None,
        }
    }

    /// Periodic parameters from a period in nanoseconds.
    pub fn from_nanos(period_ns: u64) -> Self {
        Self::new(Timestamp::from_nanos(period_ns))
    }

    /// Anchor the first deadline at `start` instead of the clock.
    #[must_use]
    pub fn with_start(mut self, start: Timestamp) -> Self {
        self.start = Some(start);
        self
    }
}

/// What to do when deadlines keep being missed.
///
/// The schedule always advances by whole periods from the previous
/// deadline. Under a persistent overrun every wait returns immediately with
/// negative lateness until the thread catches up. Setting `resync_after`
/// re-anchors the schedule to the clock after that many consecutive misses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrunPolicy {
    /// Consecutive missed deadlines before re-anchoring; `None` never does.
    #[serde(default)]
    pub resync_after: Option<u32>,
}

impl OverrunPolicy {
    /// Never re-anchor; deadlines stay on the original grid.
    pub const fn catch_up() -> Self {
        Self { resync_after: None }
    }

    /// Re-anchor after `misses` consecutive missed deadlines.
    pub const fn resync_after(misses: u32) -> Self {
        Self {
            resync_after: Some(misses),
        }
    }
}

/// A validated priority for the default scheduling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriorityParameters {
    priority: i32,
}

impl PriorityParameters {
    /// Check `priority` against the default policy's range.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidPriority`] when out of range.
    pub fn new(priority: i32) -> RTResult<Self> {
        policy::default_policy().priority_range()?.check(priority)?;
        Ok(Self { priority })
    }

    /// Highest priority of the default policy.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::SchedulingPolicy`] if the range cannot be queried.
    pub fn max() -> RTResult<Self> {
        Ok(Self {
            priority: policy::maximum_priority()?,
        })
    }

    /// Lowest priority of the default policy.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::SchedulingPolicy`] if the range cannot be queried.
    pub fn min() -> RTResult<Self> {
        Ok(Self {
            priority: policy::minimum_priority()?,
        })
    }

    /// Raw priority value.
    pub fn get(&self) -> i32 {
        self.priority
    }
}

/// Full description of a real-time thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadConfig {
    /// Prefix for the native thread name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Scheduler-class-relative priority.
    pub priority: i32,
    /// Periodic parameters; `None` for a one-shot real-time thread.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periodic: Option<PeriodicParameters>,
    /// Logical CPUs the thread is pinned to; empty means no pinning.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affinity: Vec<usize>,
    /// Overrun handling.
    #[serde(default)]
    pub overrun: OverrunPolicy,
}

impl ThreadConfig {
    /// Non-periodic thread at `priority`.
    pub fn new(priority: i32) -> Self {
        Self {
            name: None,
            priority,
            periodic: None,
            affinity: Vec::new(),
            overrun: OverrunPolicy::default(),
        }
    }

    /// Periodic thread at `priority`, anchored lazily to the clock.
    pub fn periodic(priority: i32, period: Timestamp) -> Self {
        Self {
            periodic: Some(PeriodicParameters::new(period)),
            ..Self::new(priority)
        }
    }

    /// Set the thread name prefix.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Anchor the first deadline at `start`. No effect on non-periodic threads.
    #[must_use]
    pub fn with_start(mut self, start: Timestamp) -> Self {
        if let Some(periodic) = self.periodic.as_mut() {
            periodic.start = Some(start);
        }
        self
    }

    /// Pin the thread to `cpus`.
    #[must_use]
    pub fn with_affinity(mut self, cpus: impl Into<Vec<usize>>) -> Self {
        self.affinity = cpus.into();
        self
    }

    /// Set the overrun policy.
    #[must_use]
    pub fn with_overrun_policy(mut self, overrun: OverrunPolicy) -> Self {
        self.overrun = overrun;
        self
    }

    /// Whether the thread runs on a fixed period.
    pub fn is_periodic(&self) -> bool {
        self.periodic.is_some()
    }

    /// Validate against the default policy.
    ///
    /// # Errors
    ///
    /// See [`ThreadConfig::validate_with`].
    pub fn validate(&self) -> RTResult {
        self.validate_with(policy::default_policy().as_ref())
    }

    /// Validate against `policy`.
    ///
    /// # Errors
    ///
    /// Returns [`RTError::InvalidPriority`] when the priority is outside the
    /// policy's range, [`RTError::Unsupported`] when affinity is requested on
    /// a host without CPU pinning, and [`RTError::InvalidConfig`] for a zero
    /// period, an out-of-range CPU index or a zero overrun threshold.
    pub fn validate_with(&self, policy: &dyn RealtimePolicy) -> RTResult {
        policy.priority_range()?.check(self.priority)?;

        if let Some(periodic) = &self.periodic
            && periodic.period.is_zero()
        {
            return Err(RTError::invalid_config("period must be greater than 0"));
        }

        if !self.affinity.is_empty() {
            affinity::validate_cpus(&self.affinity)?;
        }

        if self.overrun.resync_after == Some(0) {
            return Err(RTError::invalid_config(
                "overrun resync threshold must be greater than 0",
            ));
        }
        Ok(())
    }

    /// Create a configuration builder.
    #[must_use]
    pub fn builder() -> ThreadConfigBuilder {
        ThreadConfigBuilder::default()
    }
}

/// Builder for [`ThreadConfig`].
///
/// The priority defaults to the minimum of the default policy.
#[derive(Debug, Default)]
pub struct ThreadConfigBuilder {
    name: Option<String>,
    priority: Option<i32>,
    periodic: Option<PeriodicParameters>,
    affinity: Vec<usize>,
    overrun: OverrunPolicy,
}

impl ThreadConfigBuilder {
    /// Set the thread name prefix.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the priority.
    #[must_use]
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Make the thread periodic with `period`.
    #[must_use]
    pub fn period(mut self, period: Timestamp) -> Self {
        let start = self.periodic.and_then(|p| p.start);
        self.periodic = Some(PeriodicParameters { period, start });
        self
    }

    /// Set the period in nanoseconds.
    #[must_use]
    pub fn period_ns(self, period_ns: u64) -> Self {
        self.period(Timestamp::from_nanos(period_ns))
    }

    /// Anchor the first deadline at `start`. Requires a period.
    #[must_use]
    pub fn start(mut self, start: Timestamp) -> Self {
        if let Some(periodic) = self.periodic.as_mut() {
            periodic.start = Some(start);
        }
        self
    }

    /// Pin the thread to `cpus`.
    #[must_use]
    pub fn affinity(mut self, cpus: impl Into<Vec<usize>>) -> Self {
        self.affinity = cpus.into();
        self
    }

    /// Set the overrun policy.
    #[must_use]
    pub fn overrun(mut self, overrun: OverrunPolicy) -> Self {
        self.overrun = overrun;
        self
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// See [`ThreadConfig::validate`].
    pub fn build(self) -> RTResult<ThreadConfig> {
        let priority = match self.priority {
            Some(priority) => priority,
            None => policy::minimum_priority()?,
        };
        let config = ThreadConfig {
            name: self.name,
            priority,
            periodic: self.periodic,
            affinity: self.affinity,
            overrun: self.overrun,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_periodic_constructor() {
        let config = ThreadConfig::periodic(10, Timestamp::from_nanos(1_000_000));
        assert!(config.is_periodic());
        assert_eq!(config.periodic.map(|p| p.start), Some(None));
    }

    #[test]
    fn test_with_start_ignored_when_not_periodic() {
        let config = ThreadConfig::new(10).with_start(Timestamp::new(5, 0));
        assert!(config.periodic.is_none());
    }

    #[test]
    fn test_builder_defaults_to_minimum_priority() -> RTResult {
        let config = ThreadConfig::builder().period_ns(1_000_000).build()?;
        assert_eq!(config.priority, policy::minimum_priority()?);
        assert_eq!(config.periodic.map(|p| p.period.as_nanos()), Some(1_000_000));
        Ok(())
    }

    #[test]
    fn test_builder_start_keeps_period() -> RTResult {
        let config = ThreadConfig::builder()
            .period_ns(2_000_000)
            .start(Timestamp::new(3, 0))
            .build()?;
        let periodic = config.periodic.ok_or(RTError::NotPeriodic)?;
        assert_eq!(periodic.start, Some(Timestamp::new(3, 0)));
        assert_eq!(periodic.period, Timestamp::from_nanos(2_000_000));
        Ok(())
    }

    #[test]
    fn test_validate_rejects_zero_period() -> RTResult {
        let config = ThreadConfig::periodic(policy::minimum_priority()?, Timestamp::ZERO);
        assert!(matches!(config.validate(), Err(RTError::InvalidConfig(_))));
        Ok(())
    }

    #[test]
    fn test_validate_rejects_out_of_range_priority() -> RTResult {
        let config = ThreadConfig::new(policy::maximum_priority()? + 1);
        assert!(matches!(
            config.validate(),
            Err(RTError::InvalidPriority { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_validate_rejects_zero_resync_threshold() -> RTResult {
        let config = ThreadConfig::new(policy::minimum_priority()?)
            .with_overrun_policy(OverrunPolicy::resync_after(0));
        assert!(matches!(config.validate(), Err(RTError::InvalidConfig(_))));
        Ok(())
    }

    #[test]
    fn test_validate_rejects_huge_cpu_index() -> RTResult {
        let config = ThreadConfig::new(policy::minimum_priority()?).with_affinity(vec![usize::MAX]);
        assert!(matches!(
            config.validate(),
            Err(RTError::InvalidConfig(_) | RTError::Unsupported(_))
        ));
        Ok(())
    }

    #[test]
    fn test_priority_parameters_bounds() -> RTResult {
        let max = PriorityParameters::max()?;
        let min = PriorityParameters::min()?;
        assert!(min.get() <= max.get());
        assert_eq!(PriorityParameters::new(max.get())?, max);
        assert!(PriorityParameters::new(max.get() + 1).is_err());
        Ok(())
    }

    #[test]
    fn test_json_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let config = ThreadConfig::periodic(20, Timestamp::from_nanos(500_000))
            .with_name("control")
            .with_overrun_policy(OverrunPolicy::resync_after(3));
        let json = serde_json::to_string(&config)?;
        let back: ThreadConfig = serde_json::from_str(&json)?;
        assert_eq!(back, config);
        Ok(())
    }

    #[test]
    fn test_json_minimal_document() -> Result<(), Box<dyn std::error::Error>> {
        let config: ThreadConfig = serde_json::from_str(
            r#"{"priority": 5, "periodic": {"period": {"seconds": 0, "nanoseconds": 1000000}}}"#,
        )?;
        assert_eq!(config.priority, 5);
        assert!(config.affinity.is_empty());
        assert_eq!(config.overrun, OverrunPolicy::catch_up());
        Ok(())
    }
}
