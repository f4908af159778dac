//! Scheduling strategy tests.
//!
//! Covers the HoL-aware strategies (MinRtt, BLEST, XLayer) through the
//! shared decision routine, plus round-robin and redundant scheduling.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mpsched::error::SchedulingError;
use mpsched::metrics::LinkMetricsCell;
use mpsched::multipath::{
    AddressClassifier, ConnectionSnapshot, Lambda, Outcome, PathSnapshot, Scheduler, SchedulerConfig,
    SchedulingStrategy, DEFAULT_MSS,
};
use mpsched::types::{Bitrate, PathId};

const MSS: u64 = DEFAULT_MSS as u64;
const WIFI_IP: &str = "192.168.1.10";
const CELL_IP: &str = "10.45.0.2";

// Helper to create an idle path with a measured RTT
fn path(id: u16, rtt_ms: u64, cwnd: u32) -> PathSnapshot {
    PathSnapshot {
        srtt: Duration::from_millis(rtt_ms),
        cwnd,
        ..PathSnapshot::new(id)
    }
}

// Helper to put `segments` unacknowledged segments on a path
fn with_inflight(path: PathSnapshot, segments: u32) -> PathSnapshot {
    let bytes = u64::from(segments) * MSS;
    PathSnapshot {
        packets_in_flight: segments,
        write_seq: bytes,
        snd_nxt: bytes,
        ..path
    }
}

fn addr(ip: &str) -> Option<IpAddr> {
    Some(ip.parse().unwrap())
}

fn scheduler(strategy: SchedulingStrategy) -> Scheduler {
    Scheduler::new(SchedulerConfig::with_strategy(strategy))
}

// Fast path 1 (10ms, cwnd 10) and slow path 2 (100ms, cwnd 50) with 49
// segments outstanding; the connection window leaves room for about two more.
fn scenario_a() -> ConnectionSnapshot {
    let slow = PathSnapshot {
        write_seq: 50 * MSS,
        snd_nxt: 50 * MSS,
        packets_in_flight: 49,
        ..path(2, 100, 50)
    };
    ConnectionSnapshot {
        send_window: 52 * MSS,
        recommended: Some(PathId::new(2)),
        ..ConnectionSnapshot::new(vec![path(1, 10, 10), slow])
    }
}

fn cross_layer(wifi: Option<u64>, cellular: Option<u64>) -> Scheduler {
    let classifier = Arc::new(AddressClassifier::from_addrs([WIFI_IP.parse().unwrap()]));
    let cell = Arc::new(LinkMetricsCell::new());
    cell.publish(wifi.map(Bitrate::from_bps), cellular.map(Bitrate::from_bps));
    Scheduler::with_cross_layer(SchedulerConfig::with_strategy(SchedulingStrategy::Xlayer), classifier, cell)
}

// WiFi path is slower than cellular but has room to spare.
fn wifi_and_cellular() -> ConnectionSnapshot {
    let wifi = PathSnapshot {
        local_addr: addr(WIFI_IP),
        ..path(1, 80, 10)
    };
    let cellular = PathSnapshot {
        local_addr: addr(CELL_IP),
        ..path(2, 20, 10)
    };
    ConnectionSnapshot {
        send_window: 10_000_000,
        ..ConnectionSnapshot::new(vec![wifi, cellular])
    }
}

// ============================================================================
// HoL-blocking prevention
// ============================================================================

#[test]
fn test_blest_prevents_hol_blocking() {
    let mut state = scheduler(SchedulingStrategy::Blest).on_init();
    let mut conn = scenario_a();

    let selection = state.get_subflow(&mut conn).unwrap();

    assert_eq!(selection.path, PathId::new(1));
    assert_eq!(selection.outcome, Outcome::HolPrevented);
    assert_eq!(conn.scheduled, vec![PathId::new(1)]);
    assert_eq!(state.hol_prevented(), 1);

    let check = selection.check.unwrap();
    assert!(check.hol_risk());
    assert_eq!(check.fastest, PathId::new(1));
    assert_eq!(check.candidate, PathId::new(2));
    assert_eq!(check.avail_space, 2 * MSS);
    assert_eq!(check.linger, Duration::from_millis(100));
    // Two average RTTs of slow start at cwnd 10: 30 segments at lambda 1.19
    assert_eq!(check.lambda, Lambda::from_millis(1190));
    assert_eq!(check.fast_bytes, 30 * MSS * 1190 / 1000);
}

#[test]
fn test_blest_uses_candidate_with_room() {
    let mut state = scheduler(SchedulingStrategy::Blest).on_init();
    let mut conn = ConnectionSnapshot {
        send_window: 10_000_000,
        ..scenario_a()
    };

    let selection = state.get_subflow(&mut conn).unwrap();

    assert_eq!(selection.path, PathId::new(2));
    assert_eq!(selection.outcome, Outcome::Candidate);
    assert!(!selection.check.unwrap().hol_risk());
    assert_eq!(state.hol_prevented(), 0);
}

#[test]
fn test_retransmissions_raise_lambda() {
    let mut state = scheduler(SchedulingStrategy::Blest).on_init();
    let mut conn = ConnectionSnapshot {
        bytes_retrans: MSS,
        ..scenario_a()
    };

    let check = state.get_subflow(&mut conn).unwrap().check.unwrap();

    assert_eq!(check.lambda, Lambda::from_millis(1240));
    assert_eq!(check.fast_bytes, 30 * MSS * 1240 / 1000);
    assert_eq!(state.lambda(), Lambda::from_millis(1240));
}

#[test]
fn test_lambda_updates_once_per_slow_rtt() {
    let mut state = scheduler(SchedulingStrategy::Blest).on_init();
    let mut conn = scenario_a();
    let t0 = Instant::now();

    state.get_subflow_at(&mut conn, t0).unwrap();
    state.get_subflow_at(&mut conn, t0 + Duration::from_millis(50)).unwrap();
    assert_eq!(state.lambda(), Lambda::from_millis(1190));
    assert_eq!(state.snapshot().lambda_updates, 1);

    // Slow path RTT is 100ms
    state.get_subflow_at(&mut conn, t0 + Duration::from_millis(100)).unwrap();
    assert_eq!(state.lambda(), Lambda::from_millis(1180));
    assert_eq!(state.snapshot().lambda_updates, 2);
}

#[test]
fn test_pending_bytes_count_against_window() {
    // Candidate has nothing outstanding; fast path can push 30 segments.
    let conn = ConnectionSnapshot {
        send_window: 60_000,
        pending_bytes: 10_000,
        recommended: Some(PathId::new(2)),
        ..ConnectionSnapshot::new(vec![path(1, 10, 10), path(2, 100, 50)])
    };

    let mut counting = scheduler(SchedulingStrategy::Blest).on_init();
    let selection = counting.get_subflow(&mut conn.clone()).unwrap();
    assert_eq!(selection.outcome, Outcome::HolPrevented);
    assert_eq!(selection.check.unwrap().avail_space, 50_000);

    let config = SchedulerConfig {
        count_pending_bytes: false,
        ..SchedulerConfig::with_strategy(SchedulingStrategy::Blest)
    };
    let mut ignoring = Scheduler::new(config).on_init();
    let selection = ignoring.get_subflow(&mut conn.clone()).unwrap();
    assert_eq!(selection.outcome, Outcome::Candidate);
    assert_eq!(selection.check.unwrap().avail_space, 60_000);
}

// ============================================================================
// Candidate equals fastest
// ============================================================================

#[test]
fn test_identical_paths_skip_estimation() {
    for strategy in [SchedulingStrategy::MinRtt, SchedulingStrategy::Blest] {
        let mut state = scheduler(strategy).on_init();
        let mut conn = ConnectionSnapshot {
            recommended: Some(PathId::new(1)),
            ..ConnectionSnapshot::new(vec![path(1, 20, 10), path(2, 20, 10)])
        };

        let selection = state.get_subflow(&mut conn).unwrap();

        assert_eq!(selection.path, PathId::new(1), "{strategy}");
        assert_eq!(selection.outcome, Outcome::Fastest);
        assert!(selection.check.is_none());

        let control = state.snapshot();
        assert_eq!(control.hol_prevented, 0);
        assert_eq!(control.lambda, Lambda::from_millis(1200));
        assert_eq!(control.lambda_updates, 0);
    }
}

#[test]
fn test_hint_on_fastest_never_touches_lambda() {
    let mut state = scheduler(SchedulingStrategy::Blest).on_init();
    let mut conn = ConnectionSnapshot {
        send_window: 0,
        bytes_retrans: MSS,
        recommended: Some(PathId::new(2)),
        ..ConnectionSnapshot::new(vec![path(1, 50, 10), path(2, 5, 10)])
    };

    for _ in 0..10 {
        let selection = state.get_subflow(&mut conn).unwrap();
        assert_eq!(selection.path, PathId::new(2));
        assert_eq!(selection.outcome, Outcome::Fastest);
    }
    assert_eq!(state.lambda(), Lambda::from_millis(1200));
    assert_eq!(state.total_decisions(), 10);
}

#[test]
fn test_min_rtt_ignores_hint() {
    let mut state = scheduler(SchedulingStrategy::MinRtt).on_init();
    let mut conn = scenario_a();

    let selection = state.get_subflow(&mut conn).unwrap();
    assert_eq!(selection.path, PathId::new(1));
    assert_eq!(selection.outcome, Outcome::Fastest);
}

#[test]
fn test_unavailable_hint_falls_back_to_fastest() {
    let mut state = scheduler(SchedulingStrategy::Blest).on_init();
    let blocked = with_inflight(path(2, 5, 10), 10);
    let mut conn = ConnectionSnapshot {
        recommended: Some(PathId::new(2)),
        ..ConnectionSnapshot::new(vec![path(1, 30, 10), blocked])
    };

    let selection = state.get_subflow(&mut conn).unwrap();
    assert_eq!(selection.path, PathId::new(1));
    assert_eq!(selection.outcome, Outcome::Fastest);
}

// ============================================================================
// Cross-layer
// ============================================================================

#[test]
fn test_xlayer_prefers_faster_link() {
    let mut state = cross_layer(Some(100), Some(50)).on_init();
    let mut conn = wifi_and_cellular();

    let selection = state.get_subflow(&mut conn).unwrap();

    assert_eq!(selection.path, PathId::new(1));
    assert_eq!(selection.outcome, Outcome::Candidate);
    assert_eq!(selection.check.unwrap().fastest, PathId::new(2));
}

#[test]
fn test_xlayer_cellular_when_faster_or_tied() {
    for (wifi, cellular) in [(50, 100), (100, 100)] {
        let mut state = cross_layer(Some(wifi), Some(cellular)).on_init();
        let mut conn = wifi_and_cellular();

        let selection = state.get_subflow(&mut conn).unwrap();
        assert_eq!(selection.path, PathId::new(2));
        assert_eq!(selection.outcome, Outcome::Fastest);
    }
}

#[test]
fn test_xlayer_candidate_still_checked_for_hol() {
    let mut state = cross_layer(Some(300_000_000), Some(50_000_000)).on_init();
    let mut conn = ConnectionSnapshot {
        send_window: 4 * MSS,
        ..wifi_and_cellular()
    };

    let selection = state.get_subflow(&mut conn).unwrap();
    assert_eq!(selection.path, PathId::new(2));
    assert_eq!(selection.outcome, Outcome::HolPrevented);
}

#[test]
fn test_xlayer_without_metrics_uses_fastest() {
    for (wifi, cellular) in [(None, Some(50)), (Some(100), None), (Some(0), Some(50))] {
        let mut state = cross_layer(wifi, cellular).on_init();
        let mut conn = wifi_and_cellular();

        let selection = state.get_subflow(&mut conn).unwrap();
        assert_eq!(selection.path, PathId::new(2));
        assert_eq!(selection.outcome, Outcome::Fastest);
    }

    // No cross-layer inputs wired at all
    let mut state = scheduler(SchedulingStrategy::Xlayer).on_init();
    let selection = state.get_subflow(&mut wifi_and_cellular()).unwrap();
    assert_eq!(selection.path, PathId::new(2));
}

// ============================================================================
// Backup fallback and failure
// ============================================================================

#[test]
fn test_single_backup_path_is_used() {
    for strategy in SchedulingStrategy::ALL {
        let mut state = scheduler(strategy).on_init();
        let backup = PathSnapshot {
            backup: true,
            ..path(1, 40, 10)
        };
        let mut conn = ConnectionSnapshot::new(vec![backup]);

        let selection = state.get_subflow(&mut conn).unwrap();
        assert_eq!(selection.path, PathId::new(1), "{strategy}");
        assert_eq!(conn.scheduled, vec![PathId::new(1)]);
    }
}

#[test]
fn test_backup_used_when_primaries_blocked() {
    let mut state = scheduler(SchedulingStrategy::Blest).on_init();
    let primary = with_inflight(path(1, 10, 10), 10);
    let backup = PathSnapshot {
        backup: true,
        ..path(2, 200, 10)
    };
    let mut conn = ConnectionSnapshot::new(vec![primary, backup]);

    let selection = state.get_subflow(&mut conn).unwrap();
    assert_eq!(selection.path, PathId::new(2));
}

#[test]
fn test_primary_beats_faster_backup() {
    let mut state = scheduler(SchedulingStrategy::MinRtt).on_init();
    let backup = PathSnapshot {
        backup: true,
        ..path(1, 5, 10)
    };
    let mut conn = ConnectionSnapshot::new(vec![backup, path(2, 80, 10)]);

    assert_eq!(state.get_subflow(&mut conn).unwrap().path, PathId::new(2));
}

#[test]
fn test_no_available_path() {
    for strategy in SchedulingStrategy::ALL {
        let mut state = scheduler(strategy).on_init();
        let dead = PathSnapshot {
            alive: false,
            ..path(1, 10, 10)
        };
        let closing = PathSnapshot {
            active: false,
            backup: true,
            ..path(2, 10, 10)
        };
        let mut conn = ConnectionSnapshot::new(vec![dead, closing]);

        assert_eq!(state.get_subflow(&mut conn), Err(SchedulingError::NoAvailablePath), "{strategy}");
        assert!(conn.scheduled.is_empty());
        assert_eq!(state.snapshot().no_path, 1);
    }
}

// ============================================================================
// Round-robin and redundant
// ============================================================================

#[test]
fn test_round_robin_skips_unavailable() {
    let mut state = scheduler(SchedulingStrategy::RoundRobin).on_init();
    let blocked = with_inflight(path(2, 10, 10), 10);
    let mut conn = ConnectionSnapshot::new(vec![path(1, 10, 10), blocked, path(3, 10, 10)]);

    let picks: Vec<u16> = (0..4)
        .map(|_| state.get_subflow(&mut conn).unwrap().path.get())
        .collect();
    assert_eq!(picks, vec![1, 3, 1, 3]);
    assert!(picks.iter().all(|&p| p != 2));
}

#[test]
fn test_redundant_skips_unavailable() {
    let mut state = scheduler(SchedulingStrategy::Redundant).on_init();
    let blocked = with_inflight(path(3, 5, 10), 10);
    let mut conn = ConnectionSnapshot::new(vec![path(1, 30, 10), path(2, 10, 10), blocked]);

    let selection = state.get_subflow(&mut conn).unwrap();
    assert_eq!(selection.outcome, Outcome::Redundant);
    assert_eq!(selection.paths().collect::<Vec<_>>(), vec![PathId::new(2), PathId::new(1)]);
    assert!(selection.check.is_none());
}

// ============================================================================
// Telemetry
// ============================================================================

#[test]
fn test_stats_shared_across_connections() {
    let scheduler = scheduler(SchedulingStrategy::Blest);

    let mut first = scheduler.on_init();
    let mut second = scheduler.on_init();
    first.get_subflow(&mut scenario_a()).unwrap();
    second.get_subflow(&mut scenario_a()).unwrap();
    second.get_subflow(&mut ConnectionSnapshot::default()).unwrap_err();

    assert_eq!(scheduler.stats().snapshot().connections_active, 2);
    first.on_release();
    second.on_release();

    let stats = scheduler.stats().snapshot();
    assert_eq!(stats.connections_active, 0);
    assert_eq!(stats.connections_total, 2);
    assert_eq!(stats.decisions_total, 2);
    assert_eq!(stats.hol_prevented_total, 2);
    assert_eq!(stats.no_path_total, 1);
    assert!((stats.hol_prevention_ratio() - 1.0).abs() < f64::EPSILON);
}
