//! Throughput and linger-time estimation.
//!
//! Both estimators work off RTT bounds observed across all available paths in
//! the current scheduling pass, not just the path being estimated:
//!
//! - [`estimate_deliverable_bytes`] predicts how much a path could send
//!   within a time budget, modelling slow start as geometric doubling and
//!   congestion avoidance as linear growth, then scales by lambda.
//! - [`estimate_linger_time`] predicts how long data queued on a path takes
//!   to drain, interpolating between the smallest and largest observed RTT
//!   by how full the path's congestion window is.

use std::time::Duration;

use serde::Serialize;

use super::lambda::Lambda;
use super::path::PathSnapshot;

/// Upper bound on RTT rounds modelled during slow start.
pub const SLOW_START_RTT_CAP: u64 = 16;

/// Smallest and largest RTT observed during one scheduling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RttBounds {
    min: Option<Duration>,
    max: Option<Duration>,
}

impl RttBounds {
    /// Bounds with no observations.
    pub const fn new() -> Self {
        Self { min: None, max: None }
    }

    /// Build bounds from every measured RTT in `paths`.
    pub fn from_paths<'a>(paths: impl IntoIterator<Item = &'a PathSnapshot>) -> Self {
        let mut bounds = Self::new();
        for path in paths {
            bounds.observe(path.srtt);
        }
        bounds
    }

    /// Forget all observations.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Widen the bounds with one RTT sample. Zero (unmeasured) is ignored.
    pub fn observe(&mut self, rtt: Duration) {
        if rtt.is_zero() {
            return;
        }
        self.min = Some(self.min.map_or(rtt, |m| m.min(rtt)));
        self.max = Some(self.max.map_or(rtt, |m| m.max(rtt)));
    }

    pub fn min(&self) -> Option<Duration> {
        self.min
    }

    pub fn max(&self) -> Option<Duration> {
        self.max
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none()
    }

    /// Midpoint of the bounds, zero when nothing was observed.
    pub fn average(&self) -> Duration {
        match (self.min, self.max) {
            (Some(min), Some(max)) => min + (max - min) / 2,
            _ => Duration::ZERO,
        }
    }
}

/// Number of average RTTs needed to cover `budget`, at least one.
fn rtt_rounds(bounds: &RttBounds, budget: Duration) -> u64 {
    let avg = bounds.average().as_nanos();
    if avg == 0 {
        return 1;
    }
    let rounds = budget.as_nanos().div_ceil(avg).max(1);
    u64::try_from(rounds).unwrap_or(u64::MAX)
}

/// Segments a path could send over `rounds` RTTs.
fn segments_over(path: &PathSnapshot, rounds: u64) -> u128 {
    let cwnd = u128::from(path.cwnd);
    match path.ssthresh {
        None => {
            let n = rounds.min(SLOW_START_RTT_CAP);
            cwnd * ((1u128 << n) - 1)
        }
        Some(ssthresh) => {
            let ca_cwnd = cwnd.max(u128::from(ssthresh) + 1);
            let n = u128::from(rounds);
            (ca_cwnd + (n - 1) / 2).saturating_mul(n)
        }
    }
}

/// Bytes `path` is expected to deliver within `budget`, scaled by `lambda`.
pub fn estimate_deliverable_bytes(
    path: &PathSnapshot,
    bounds: &RttBounds,
    lambda: Lambda,
    budget: Duration,
) -> u64 {
    let segments = segments_over(path, rtt_rounds(bounds, budget));
    let bytes = segments
        .saturating_mul(u128::from(path.mss))
        .saturating_mul(u128::from(lambda.millis()))
        / u128::from(Lambda::SCALE);
    u64::try_from(bytes).unwrap_or(u64::MAX)
}

/// Time data queued on `path` would take to drain.
///
/// Never shorter than the path's own RTT.
pub fn estimate_linger_time(path: &PathSnapshot, bounds: &RttBounds) -> Duration {
    let min = bounds.min().unwrap_or(Duration::ZERO);
    let max = bounds.max().unwrap_or(Duration::ZERO);
    let inflight = u128::from(path.packets_in_flight) + 1;
    let cwnd = u128::from(path.cwnd.max(1));

    let estimate = if inflight >= cwnd {
        max
    } else {
        let slope = max.saturating_sub(min).as_nanos();
        let offset = slope * inflight / cwnd;
        min + Duration::from_nanos(u64::try_from(offset).unwrap_or(u64::MAX))
    };

    estimate.max(path.srtt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipath::path::DEFAULT_MSS;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn bounds(min: u64, max: u64) -> RttBounds {
        let mut b = RttBounds::new();
        b.observe(ms(min));
        b.observe(ms(max));
        b
    }

    #[test]
    fn test_bounds_ignore_unmeasured() {
        let mut b = RttBounds::new();
        b.observe(Duration::ZERO);
        assert!(b.is_empty());
        assert_eq!(b.average(), Duration::ZERO);

        b.observe(ms(30));
        b.observe(ms(10));
        assert_eq!(b.min(), Some(ms(10)));
        assert_eq!(b.max(), Some(ms(30)));
        assert_eq!(b.average(), ms(20));

        b.reset();
        assert!(b.is_empty());
    }

    #[test]
    fn test_average_of_extreme_bounds() {
        let mut b = RttBounds::new();
        b.observe(ms(10));
        b.observe(Duration::MAX);
        assert_eq!(b.average(), ms(10) + (Duration::MAX - ms(10)) / 2);
        assert_eq!(rtt_rounds(&b, Duration::MAX), 2);
    }

    #[test]
    fn test_rtt_rounds_round_up() {
        let b = bounds(10, 30);
        assert_eq!(rtt_rounds(&b, ms(20)), 1);
        assert_eq!(rtt_rounds(&b, ms(21)), 2);
        assert_eq!(rtt_rounds(&b, Duration::ZERO), 1);
        assert_eq!(rtt_rounds(&RttBounds::new(), ms(500)), 1);
    }

    #[test]
    fn test_slow_start_estimate() {
        let path = PathSnapshot { cwnd: 10, ..PathSnapshot::new(1) };
        // avg 55ms, budget 100ms: two rounds, 10 * (2^2 - 1) = 30 segments
        let bytes = estimate_deliverable_bytes(&path, &bounds(10, 100), Lambda::ONE, ms(100));
        assert_eq!(bytes, 30 * u64::from(DEFAULT_MSS));
    }

    #[test]
    fn test_slow_start_caps_rounds() {
        let path = PathSnapshot { cwnd: 1, mss: 1, ..PathSnapshot::new(1) };
        let bytes = estimate_deliverable_bytes(&path, &bounds(1, 1), Lambda::ONE, Duration::from_secs(3600));
        assert_eq!(bytes, (1 << SLOW_START_RTT_CAP) - 1);
    }

    #[test]
    fn test_congestion_avoidance_estimate() {
        let path = PathSnapshot { cwnd: 8, ssthresh: Some(20), mss: 1000, ..PathSnapshot::new(1) };
        // ca_cwnd = 21, three rounds: (21 + 1) * 3 = 66 segments
        let bytes = estimate_deliverable_bytes(&path, &bounds(10, 10), Lambda::ONE, ms(30));
        assert_eq!(bytes, 66_000);

        let scaled = estimate_deliverable_bytes(&path, &bounds(10, 10), Lambda::from_millis(1200), ms(30));
        assert_eq!(scaled, 79_200);
    }

    #[test]
    fn test_linger_interpolates() {
        let path = PathSnapshot {
            srtt: ms(10),
            cwnd: 10,
            packets_in_flight: 4,
            ..PathSnapshot::new(1)
        };
        // 10ms + 90ms * 5/10
        assert_eq!(estimate_linger_time(&path, &bounds(10, 100)), ms(55));
    }

    #[test]
    fn test_linger_full_window_uses_max() {
        let path = PathSnapshot {
            srtt: ms(20),
            cwnd: 10,
            packets_in_flight: 9,
            ..PathSnapshot::new(1)
        };
        assert_eq!(estimate_linger_time(&path, &bounds(10, 100)), ms(100));
    }

    #[test]
    fn test_linger_never_below_own_rtt() {
        let path = PathSnapshot { srtt: ms(100), cwnd: 50, packets_in_flight: 1, ..PathSnapshot::new(1) };
        assert_eq!(estimate_linger_time(&path, &bounds(10, 100)), ms(100));
    }

    #[test]
    fn test_zero_cwnd_does_not_panic() {
        let path = PathSnapshot { srtt: ms(5), cwnd: 0, ..PathSnapshot::new(1) };
        assert_eq!(estimate_linger_time(&path, &bounds(10, 100)), ms(100));
        assert_eq!(estimate_deliverable_bytes(&path, &bounds(10, 100), Lambda::ONE, ms(50)), 0);
    }
}
