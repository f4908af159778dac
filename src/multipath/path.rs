//! Read-only view of per-path and per-connection transport state.
//!
//! The scheduler never owns transport state. On every send opportunity the
//! host stack hands it a [`HostConnection`], which exposes one
//! [`PathSnapshot`] per subflow plus a handful of connection-level signals.
//! The only thing the scheduler writes back is which path was picked.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{CongestionState, ConnectionId, PathId};

/// Default maximum segment size used when none is reported.
pub const DEFAULT_MSS: u32 = 1460;

/// Initial congestion window in segments.
pub const INITIAL_CWND: u32 = 10;

/// Snapshot of one path (subflow) as seen by the host transport stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSnapshot {
    /// Path identifier.
    pub id: PathId,
    /// Local address the subflow is bound to.
    #[serde(default)]
    pub local_addr: Option<IpAddr>,
    /// Smoothed RTT estimate. Zero means never measured.
    #[serde(default, with = "humantime_serde")]
    pub srtt: Duration,
    /// Congestion window in segments.
    #[serde(default = "default_cwnd")]
    pub cwnd: u32,
    /// Segments currently in flight.
    #[serde(default)]
    pub packets_in_flight: u32,
    /// Slow-start threshold in segments; `None` while in initial slow start.
    #[serde(default)]
    pub ssthresh: Option<u32>,
    /// Maximum segment size in bytes.
    #[serde(default = "default_mss")]
    pub mss: u32,
    /// Backup paths only carry data when no primary path is eligible.
    #[serde(default)]
    pub backup: bool,

    // Availability predicates
    /// Underlying subflow socket exists.
    #[serde(default = "default_true")]
    pub alive: bool,
    /// Subflow is established and not closing.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Host can accept more data (not shut down, not window-probing).
    #[serde(default = "default_true")]
    pub can_send: bool,
    /// Send buffer memory available.
    #[serde(default = "default_true")]
    pub send_memory_free: bool,
    /// Congestion-control state.
    #[serde(default)]
    pub ca_state: CongestionState,
    /// Outstanding zero-window probes.
    #[serde(default)]
    pub probes_out: u32,

    // Sequence pointers (bytes)
    /// Lowest unacknowledged byte.
    #[serde(default)]
    pub snd_una: u64,
    /// Next byte to send.
    #[serde(default)]
    pub snd_nxt: u64,
    /// Highest byte written to the subflow.
    #[serde(default)]
    pub write_seq: u64,
    /// Right edge of the peer's advertised send window.
    #[serde(default = "default_wnd_end")]
    pub snd_wnd_end: u64,
}

fn default_cwnd() -> u32 {
    INITIAL_CWND
}
fn default_mss() -> u32 {
    DEFAULT_MSS
}
fn default_true() -> bool {
    true
}
fn default_wnd_end() -> u64 {
    u64::from(u32::MAX)
}

impl PathSnapshot {
    /// Create a healthy, idle path with no RTT sample yet.
    pub fn new(id: impl Into<PathId>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    /// Whether an RTT sample exists.
    pub fn has_rtt(&self) -> bool {
        !self.srtt.is_zero()
    }

    /// Bytes written but not yet acknowledged.
    pub fn unacked_bytes(&self) -> u64 {
        self.write_seq.saturating_sub(self.snd_una)
    }

    /// Room left in the send window past the next byte to send.
    pub fn send_window_room(&self) -> u64 {
        self.snd_wnd_end.saturating_sub(self.snd_nxt)
    }

    /// Whether the path is still in initial slow start.
    pub fn in_slow_start(&self) -> bool {
        self.ssthresh.is_none()
    }
}

impl Default for PathSnapshot {
    fn default() -> Self {
        Self {
            id: PathId::new(0),
            local_addr: None,
            srtt: Duration::ZERO,
            cwnd: default_cwnd(),
            packets_in_flight: 0,
            ssthresh: None,
            mss: default_mss(),
            backup: false,
            alive: true,
            active: true,
            can_send: true,
            send_memory_free: true,
            ca_state: CongestionState::Open,
            probes_out: 0,
            snd_una: 0,
            snd_nxt: 0,
            write_seq: 0,
            snd_wnd_end: default_wnd_end(),
        }
    }
}

/// Connection-level signals the scheduler consumes from the host stack.
///
/// Implementors are expected to serialize calls per connection; the
/// scheduler takes `&mut` only to record the chosen path.
pub trait HostConnection {
    /// Current per-path snapshots, in the host's iteration order.
    fn paths(&self) -> &[PathSnapshot];

    /// Aggregate send window of the connection in bytes.
    fn send_window(&self) -> u64;

    /// Whether any path has unacknowledged retransmitted data.
    fn retransmission_pending(&self) -> bool;

    /// The host's own best-path recommendation, if it can produce one.
    fn recommended_path(&self) -> Option<PathId>;

    /// Bytes about to be appended to the segment being scheduled.
    fn pending_bytes(&self) -> u64 {
        0
    }

    /// Mark a path as scheduled for this round.
    fn mark_scheduled(&mut self, path: PathId);
}

/// Owned, serializable connection state implementing [`HostConnection`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionSnapshot {
    /// Connection identifier.
    #[serde(default)]
    pub id: ConnectionId,
    /// Aggregate send window in bytes.
    #[serde(default)]
    pub send_window: u64,
    /// Retransmitted bytes not yet acknowledged at connection level.
    #[serde(default)]
    pub bytes_retrans: u64,
    /// Host best-path hint.
    #[serde(default)]
    pub recommended: Option<PathId>,
    /// Bytes about to be appended to the pending segment.
    #[serde(default)]
    pub pending_bytes: u64,
    /// Path snapshots.
    #[serde(default)]
    pub paths: Vec<PathSnapshot>,
    /// Paths marked as scheduled, in marking order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scheduled: Vec<PathId>,
}

impl ConnectionSnapshot {
    pub fn new(paths: Vec<PathSnapshot>) -> Self {
        Self {
            paths,
            ..Self::default()
        }
    }

    /// Look up a path by id.
    pub fn path(&self, id: PathId) -> Option<&PathSnapshot> {
        self.paths.iter().find(|p| p.id == id)
    }

    /// Clear marks left by a previous round.
    pub fn clear_scheduled(&mut self) {
        self.scheduled.clear();
    }
}

impl HostConnection for ConnectionSnapshot {
    fn paths(&self) -> &[PathSnapshot] {
        &self.paths
    }

    fn send_window(&self) -> u64 {
        self.send_window
    }

    fn retransmission_pending(&self) -> bool {
        self.bytes_retrans > 0
    }

    fn recommended_path(&self) -> Option<PathId> {
        self.recommended
    }

    fn pending_bytes(&self) -> u64 {
        self.pending_bytes
    }

    fn mark_scheduled(&mut self, path: PathId) {
        if !self.scheduled.contains(&path) {
            self.scheduled.push(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_arithmetic_saturates() {
        let path = PathSnapshot {
            snd_una: 5_000,
            write_seq: 1_000,
            snd_nxt: 10,
            snd_wnd_end: 5,
            ..PathSnapshot::new(1)
        };
        assert_eq!(path.unacked_bytes(), 0);
        assert_eq!(path.send_window_room(), 0);
    }

    #[test]
    fn test_snapshot_deserializes_with_defaults() {
        let json = r#"{"send_window": 9000, "paths": [{"id": 1, "srtt": "25ms"}]}"#;
        let conn: ConnectionSnapshot = serde_json::from_str(json).unwrap();
        let path = &conn.paths[0];
        assert_eq!(path.srtt, Duration::from_millis(25));
        assert_eq!(path.cwnd, INITIAL_CWND);
        assert_eq!(path.mss, DEFAULT_MSS);
        assert!(path.alive && path.active && path.can_send);
        assert!(path.in_slow_start());
        assert_eq!(conn.send_window(), 9000);
    }

    #[test]
    fn test_mark_scheduled_is_idempotent() {
        let mut conn = ConnectionSnapshot::new(vec![PathSnapshot::new(1)]);
        conn.mark_scheduled(PathId::new(1));
        conn.mark_scheduled(PathId::new(1));
        assert_eq!(conn.scheduled, vec![PathId::new(1)]);
        conn.clear_scheduled();
        assert!(conn.scheduled.is_empty());
    }
}
