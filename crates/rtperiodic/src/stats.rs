//! Wake-up latency statistics for periodic loops.
//!
//! Each sample is the signed distance between a deadline and the moment the
//! thread actually woke: positive when late. Missed deadlines (negative
//! lateness from a wait) are counted separately.

use serde::Serialize;

/// Default number of samples kept for percentiles.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 10_000;

/// Wake-up latency collector.
///
/// # RT-Safety
///
/// `record` is O(1) and does not allocate once the ring buffer is full.
/// Percentiles reuse a scratch buffer.
#[derive(Debug, Clone)]
pub struct LatenessStats {
    samples: u64,
    overruns: u64,
    min_ns: i64,
    max_ns: i64,
    sum_ns: i128,
    recent: Vec<i64>,
    capacity: usize,
    next_index: usize,
    scratch: Vec<i64>,
}

impl Default for LatenessStats {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SAMPLE_CAPACITY)
    }
}

impl LatenessStats {
    /// Collector with the default sample capacity.
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector keeping at most `capacity` samples for percentiles.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: 0,
            overruns: 0,
            min_ns: i64::MAX,
            max_ns: i64::MIN,
            sum_ns: 0,
            recent: Vec::with_capacity(capacity),
            capacity,
            next_index: 0,
            scratch: Vec::with_capacity(capacity),
        }
    }

    /// Record one wake-up.
    ///
    /// * `wake_latency_ns` - actual wake time minus deadline
    /// * `overrun` - the wait reported a missed deadline
    pub fn record(&mut self, wake_latency_ns: i64, overrun: bool) {
        self.samples += 1;
        if overrun {
            self.overruns += 1;
        }
        self.min_ns = self.min_ns.min(wake_latency_ns);
        self.max_ns = self.max_ns.max(wake_latency_ns);
        self.sum_ns += i128::from(wake_latency_ns);

        if self.capacity == 0 {
            return;
        }
        if self.recent.len() < self.capacity {
            self.recent.push(wake_latency_ns);
        } else if let Some(slot) = self.recent.get_mut(self.next_index) {
            *slot = wake_latency_ns;
            self.next_index = (self.next_index + 1) % self.capacity;
        }
    }

    /// Total samples recorded.
    pub fn samples(&self) -> u64 {
        self.samples
    }

    /// Missed deadlines recorded.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }

    /// Smallest latency, if any sample was recorded.
    pub fn min_ns(&self) -> Option<i64> {
        (self.samples > 0).then_some(self.min_ns)
    }

    /// Largest latency, if any sample was recorded.
    pub fn max_ns(&self) -> Option<i64> {
        (self.samples > 0).then_some(self.max_ns)
    }

    /// Mean latency over all samples.
    pub fn mean_ns(&self) -> f64 {
        if self.samples == 0 {
            return 0.0;
        }
        self.sum_ns as f64 / self.samples as f64
    }

    /// Latency at `percentile` (0.0 to 1.0) over the retained samples.
    pub fn percentile_ns(&mut self, percentile: f64) -> i64 {
        if self.recent.is_empty() {
            return 0;
        }
        let percentile = percentile.clamp(0.0, 1.0);
        self.scratch.clear();
        self.scratch.extend_from_slice(&self.recent);

        let len = self.scratch.len();
        let index = ((len as f64 * percentile) as usize).min(len.saturating_sub(1));
        let (_, value, _) = self.scratch.select_nth_unstable(index);
        *value
    }

    /// Serializable snapshot.
    pub fn summary(&mut self) -> LatenessSummary {
        LatenessSummary {
            samples: self.samples,
            overruns: self.overruns,
            min_ns: self.min_ns().unwrap_or(0),
            max_ns: self.max_ns().unwrap_or(0),
            mean_ns: self.mean_ns(),
            p50_ns: self.percentile_ns(0.50),
            p99_ns: self.percentile_ns(0.99),
        }
    }

    /// Forget all samples.
    pub fn reset(&mut self) {
        *self = Self::with_capacity(self.capacity);
    }
}

/// Snapshot of [`LatenessStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatenessSummary {
    /// Total samples
    pub samples: u64,
    /// Missed deadlines
    pub overruns: u64,
    /// Smallest wake latency
    pub min_ns: i64,
    /// Largest wake latency
    pub max_ns: i64,
    /// Mean wake latency
    pub mean_ns: f64,
    /// Median over retained samples
    pub p50_ns: i64,
    /// 99th percentile over retained samples
    pub p99_ns: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let mut stats = LatenessStats::new();
        assert_eq!(stats.min_ns(), None);
        assert_eq!(stats.max_ns(), None);
        assert_eq!(stats.percentile_ns(0.99), 0);
        assert_eq!(stats.summary().samples, 0);
    }

    #[test]
    fn test_record() {
        let mut stats = LatenessStats::new();
        stats.record(-500, false);
        stats.record(1_500, false);
        stats.record(20_000, true);

        assert_eq!(stats.samples(), 3);
        assert_eq!(stats.overruns(), 1);
        assert_eq!(stats.min_ns(), Some(-500));
        assert_eq!(stats.max_ns(), Some(20_000));
        assert!((stats.mean_ns() - 7_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_percentiles() {
        let mut stats = LatenessStats::new();
        for i in 0..100_i64 {
            stats.record(i * 1_000, false);
        }
        let p99 = stats.percentile_ns(0.99);
        assert!((97_000..=99_000).contains(&p99), "p99 was {p99}");
        assert_eq!(stats.percentile_ns(0.0), 0);
    }

    #[test]
    fn test_ring_buffer_keeps_latest() {
        let mut stats = LatenessStats::with_capacity(3);
        for i in 1..=5_i64 {
            stats.record(i, false);
        }
        let mut kept = stats.recent.clone();
        kept.sort_unstable();
        assert_eq!(kept, vec![3, 4, 5]);
        assert_eq!(stats.samples(), 5);
        assert_eq!(stats.min_ns(), Some(1));
    }

    #[test]
    fn test_zero_capacity_still_counts() {
        let mut stats = LatenessStats::with_capacity(0);
        stats.record(10, true);
        assert_eq!(stats.samples(), 1);
        assert_eq!(stats.overruns(), 1);
        assert_eq!(stats.percentile_ns(0.5), 0);
    }

    #[test]
    fn test_reset() {
        let mut stats = LatenessStats::with_capacity(8);
        stats.record(10, true);
        stats.reset();
        assert_eq!(stats.samples(), 0);
        assert_eq!(stats.overruns(), 0);
        assert_eq!(stats.min_ns(), None);
    }

    #[test]
    fn test_summary_serializes() -> Result<(), serde_json::Error> {
        let mut stats = LatenessStats::new();
        stats.record(42, false);
        let json = serde_json::to_value(stats.summary())?;
        assert_eq!(json["max_ns"], 42);
        assert_eq!(json["overruns"], 0);
        Ok(())
    }
}
