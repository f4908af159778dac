//! Process-wide scheduling counters.
//!
//! Connections fold their per-connection counters in here. Nothing in the
//! decision path ever reads these values.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Aggregate scheduler counters.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    connections_active: AtomicU64,
    connections_total: AtomicU64,
    decisions_total: AtomicU64,
    hol_prevented_total: AtomicU64,
    no_path_total: AtomicU64,
    lambda_updates_total: AtomicU64,
}

impl SchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_active.fetch_add(1, Ordering::Relaxed);
        self.connections_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a released connection's counters into the aggregate.
    pub fn connection_closed(&self, decisions: u64, hol_prevented: u64, no_path: u64, lambda_updates: u64) {
        // Saturate at zero if a release is reported without a matching open.
        let _ = self
            .connections_active
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)));
        self.decisions_total.fetch_add(decisions, Ordering::Relaxed);
        self.hol_prevented_total.fetch_add(hol_prevented, Ordering::Relaxed);
        self.no_path_total.fetch_add(no_path, Ordering::Relaxed);
        self.lambda_updates_total.fetch_add(lambda_updates, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_total: self.connections_total.load(Ordering::Relaxed),
            decisions_total: self.decisions_total.load(Ordering::Relaxed),
            hol_prevented_total: self.hol_prevented_total.load(Ordering::Relaxed),
            no_path_total: self.no_path_total.load(Ordering::Relaxed),
            lambda_updates_total: self.lambda_updates_total.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`SchedulerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub connections_active: u64,
    pub connections_total: u64,
    pub decisions_total: u64,
    pub hol_prevented_total: u64,
    pub no_path_total: u64,
    pub lambda_updates_total: u64,
}

impl StatsSnapshot {
    /// Share of decisions that overrode the candidate to avoid HoL blocking.
    pub fn hol_prevention_ratio(&self) -> f64 {
        if self.decisions_total == 0 {
            0.0
        } else {
            self.hol_prevented_total as f64 / self.decisions_total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close_accounting() {
        let stats = SchedulerStats::new();
        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed(10, 2, 1, 3);

        let snap = stats.snapshot();
        assert_eq!(snap.connections_active, 1);
        assert_eq!(snap.connections_total, 2);
        assert_eq!(snap.decisions_total, 10);
        assert_eq!(snap.hol_prevented_total, 2);
        assert_eq!(snap.no_path_total, 1);
        assert_eq!(snap.lambda_updates_total, 3);
        assert!((snap.hol_prevention_ratio() - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unmatched_close_saturates() {
        let stats = SchedulerStats::new();
        stats.connection_closed(0, 0, 0, 0);
        assert_eq!(stats.snapshot().connections_active, 0);
    }
}
