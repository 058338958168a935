//! Property-based tests for timestamp arithmetic and statistics.

use proptest::prelude::*;
use quickcheck_macros::quickcheck;
use rtperiodic::LatenessStats;
use rtperiodic::timespec::{NSEC_PER_SEC, Timestamp, add, delta, less_than, normalize};

/// Keeps sums of three values far from `u64::MAX` seconds.
const MAX_SECONDS: u64 = 1 << 40;

fn timestamp() -> impl Strategy<Value = Timestamp> {
    (0..MAX_SECONDS, 0..NSEC_PER_SEC).prop_map(|(s, ns)| Timestamp::new(s, ns))
}

fn period() -> impl Strategy<Value = Timestamp> {
    (0_u64..3_600, 0..NSEC_PER_SEC).prop_map(|(s, ns)| Timestamp::new(s, ns))
}

proptest! {
    #[test]
    fn normalize_preserves_total(seconds in 0..MAX_SECONDS, nanos in any::<u64>()) {
        let ts = normalize(seconds, nanos);
        prop_assert!(u64::from(ts.nanoseconds()) < NSEC_PER_SEC);
        prop_assert_eq!(
            ts.as_nanos(),
            u128::from(seconds) * u128::from(NSEC_PER_SEC) + u128::from(nanos)
        );
    }

    #[test]
    fn add_is_associative(ts in timestamp(), p1 in period(), p2 in period()) {
        prop_assert_eq!(add(add(ts, p1, 0), p2, 0), add(ts, add(p1, p2, 0), 0));
    }

    #[test]
    fn add_result_is_normalized(ts in timestamp(), p in period(), offset in -(NSEC_PER_SEC as i64)..NSEC_PER_SEC as i64) {
        let sum = add(ts, p, offset);
        prop_assert!(u64::from(sum.nanoseconds()) < NSEC_PER_SEC);
    }

    #[test]
    fn delta_matches_add(ts in timestamp(), p in period()) {
        let later = add(ts, p, 0);
        prop_assert_eq!(i128::from(delta(ts, later)), i128::try_from(p.as_nanos()).unwrap_or(i128::MAX));
        prop_assert_eq!(delta(later, ts), -delta(ts, later));
    }

    #[test]
    fn less_than_agrees_with_delta(a in timestamp(), b in timestamp()) {
        prop_assert_eq!(less_than(a, b), delta(a, b) > 0);
        prop_assert_eq!(less_than(a, b), a < b);
    }

    #[test]
    fn k_periods_equal_repeated_addition(anchor in timestamp(), period_ns in 1_u64..100_000_000, k in 0_u64..1_000) {
        let period = Timestamp::from_nanos(period_ns);
        let mut deadline = anchor;
        for _ in 0..k {
            deadline = add(deadline, period, 0);
        }
        prop_assert_eq!(deadline, add(anchor, Timestamp::from_nanos(period_ns * k), 0));
    }
}

#[quickcheck]
fn signed_parts_never_denormalized(seconds: i64, nanos: i64) -> bool {
    let ts = Timestamp::from_signed_parts(seconds, nanos);
    u64::from(ts.nanoseconds()) < NSEC_PER_SEC
}

#[quickcheck]
fn signed_parts_round_trip(nanos: u32, seconds: u32) -> bool {
    let ts = Timestamp::from_signed_parts(i64::from(seconds), i64::from(nanos));
    ts.as_nanos_i64() == i64::from(seconds) * NSEC_PER_SEC as i64 + i64::from(nanos)
}

#[quickcheck]
fn stats_bounds_contain_percentiles(samples: Vec<i32>) {
    if samples.is_empty() {
        return;
    }
    let mut stats = LatenessStats::with_capacity(samples.len());
    for &sample in &samples {
        stats.record(i64::from(sample), sample < 0);
    }

    let p50 = stats.percentile_ns(0.50);
    let p99 = stats.percentile_ns(0.99);
    let (Some(min), Some(max)) = (stats.min_ns(), stats.max_ns()) else {
        return;
    };
    assert!(min <= p50 && p50 <= p99 && p99 <= max);
    assert_eq!(
        stats.overruns(),
        samples.iter().filter(|&&s| s < 0).count() as u64
    );
}
