//! Core types used throughout mpsched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a multi-path connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Identifier of a path (subflow) within one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathId(pub u16);

impl PathId {
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PathId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "path-{}", self.0)
    }
}

impl From<u16> for PathId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

/// Link class used by cross-layer scheduling.
///
/// Only two classes exist: the configured WiFi interface, and everything
/// else, which is treated as the cellular-like link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkClass {
    /// WiFi-like link.
    Wifi,
    /// Cellular-like link (LTE/5G NR).
    Cellular,
}

impl fmt::Display for LinkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wifi => write!(f, "wifi"),
            Self::Cellular => write!(f, "cellular"),
        }
    }
}

/// Congestion-control state of a path as reported by the host stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CongestionState {
    /// Normal operation.
    #[default]
    Open,
    /// Duplicate ACKs or SACKs seen, no loss detected yet.
    Disorder,
    /// Window reduced after an ECN signal.
    Cwr,
    /// Fast retransmit / fast recovery.
    Recovery,
    /// Retransmission timeout, loss recovery.
    Loss,
}

impl fmt::Display for CongestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Disorder => write!(f, "disorder"),
            Self::Cwr => write!(f, "cwr"),
            Self::Recovery => write!(f, "recovery"),
            Self::Loss => write!(f, "loss"),
        }
    }
}

/// Link-layer bitrate in bits per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Bitrate(pub u64);

impl Bitrate {
    pub const ZERO: Self = Self(0);

    pub const fn from_bps(bits_per_sec: u64) -> Self {
        Self(bits_per_sec)
    }

    pub const fn from_kbps(kilobits_per_sec: u64) -> Self {
        Self(kilobits_per_sec.saturating_mul(1_000))
    }

    pub fn from_mbps(megabits_per_sec: f64) -> Self {
        Self((megabits_per_sec * 1_000_000.0).max(0.0) as u64)
    }

    pub fn bps(self) -> u64 {
        self.0
    }

    pub fn as_mbps(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    /// A sample is only usable for comparison when it is non-zero.
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }

    pub fn as_human_readable(self) -> String {
        let bps = self.0 as f64;
        if bps >= 1_000_000_000.0 {
            let gbps = bps / 1_000_000_000.0;
            format!("{gbps:.2} Gbps")
        } else if bps >= 1_000_000.0 {
            let mbps = bps / 1_000_000.0;
            format!("{mbps:.2} Mbps")
        } else if bps >= 1_000.0 {
            let kbps = bps / 1_000.0;
            format!("{kbps:.2} Kbps")
        } else {
            format!("{bps:.0} bps")
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_human_readable())
    }
}

impl FromStr for Bitrate {
    type Err = String;

    /// Parses a plain bits-per-second number.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|e| format!("invalid bitrate '{s}': {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitrate_conversions() {
        assert_eq!(Bitrate::from_kbps(866_700).bps(), 866_700_000);
        assert_eq!(Bitrate::from_mbps(144.4).bps(), 144_400_000);
        assert!(!Bitrate::ZERO.is_valid());
        assert_eq!(Bitrate::from_bps(150_000_000).to_string(), "150.00 Mbps");
        assert_eq!("42".parse::<Bitrate>(), Ok(Bitrate(42)));
        assert!("fast".parse::<Bitrate>().is_err());
    }

    #[test]
    fn test_path_id_display() {
        assert_eq!(PathId::new(7).to_string(), "path-7");
        assert_eq!(PathId::from(2).get(), 2);
    }

    #[test]
    fn test_congestion_state_serde() {
        let json = serde_json::to_string(&CongestionState::Recovery).unwrap();
        assert_eq!(json, "\"recovery\"");
        let parsed: LinkClass = serde_json::from_str("\"wifi\"").unwrap();
        assert_eq!(parsed, LinkClass::Wifi);
    }
}
