//! Path eligibility for carrying new data.

use std::fmt;

use super::path::PathSnapshot;
use crate::types::CongestionState;

/// Minimum congestion window (segments) for a path in fast recovery to
/// remain eligible.
pub const RECOVERY_MIN_CWND: u32 = 4;

/// Why a path cannot take new data right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligibility {
    /// No underlying subflow socket.
    NotAlive,
    /// Subflow closing or closed.
    Inactive,
    /// Host refuses more data (shutdown, window probing).
    CannotSend,
    /// No send buffer memory.
    SendBufferFull,
    /// Bytes in flight already fill the congestion window.
    CwndLimited,
    /// Retransmission-timeout loss recovery.
    LossRecovery,
    /// Fast recovery with a window too small to spare.
    SmallRecoveryWindow,
    /// Peer window has no room past `snd_nxt`.
    SendWindowExhausted,
    /// Zero-window probes outstanding.
    ProbesOutstanding,
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotAlive => "not alive",
            Self::Inactive => "inactive",
            Self::CannotSend => "cannot send",
            Self::SendBufferFull => "send buffer full",
            Self::CwndLimited => "cwnd limited",
            Self::LossRecovery => "in loss recovery",
            Self::SmallRecoveryWindow => "in fast recovery with small cwnd",
            Self::SendWindowExhausted => "send window exhausted",
            Self::ProbesOutstanding => "zero-window probes outstanding",
        };
        f.write_str(s)
    }
}

/// Check every eligibility condition, reporting the first that fails.
pub fn check(path: &PathSnapshot) -> Result<(), Ineligibility> {
    if !path.alive {
        return Err(Ineligibility::NotAlive);
    }
    if !path.active {
        return Err(Ineligibility::Inactive);
    }
    if !path.can_send {
        return Err(Ineligibility::CannotSend);
    }
    if !path.send_memory_free {
        return Err(Ineligibility::SendBufferFull);
    }
    if path.packets_in_flight >= path.cwnd {
        return Err(Ineligibility::CwndLimited);
    }
    match path.ca_state {
        CongestionState::Loss => return Err(Ineligibility::LossRecovery),
        CongestionState::Recovery if path.cwnd <= RECOVERY_MIN_CWND => {
            return Err(Ineligibility::SmallRecoveryWindow)
        }
        _ => {}
    }
    if path.snd_wnd_end <= path.snd_nxt {
        return Err(Ineligibility::SendWindowExhausted);
    }
    if path.probes_out > 0 {
        return Err(Ineligibility::ProbesOutstanding);
    }
    Ok(())
}

/// Whether the path may carry new data this round.
pub fn is_available(path: &PathSnapshot) -> bool {
    check(path).is_ok()
}

/// Looser predicate used only for the last-resort fallback: the subflow
/// exists, is established and the host accepts data, even if it is window
/// or congestion limited.
pub fn is_sendable(path: &PathSnapshot) -> bool {
    path.alive && path.active && path.can_send
}
