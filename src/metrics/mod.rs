//! Link metrics collection, scheduler telemetry, and Prometheus export.
//!
//! This module provides:
//! - The shared link bitrate snapshot read by the cross-layer strategy
//! - A background collector that keeps it fresh
//! - Process-wide scheduler counters
//! - Prometheus export of both

mod collector;
mod link;
#[cfg(feature = "metrics")]
mod prometheus_export;
mod telemetry;

pub use collector::{parse_iw_link, BitrateSource, ConfiguredBitrate, IwBitrate, LinkMetricsCollector};
pub use link::{LinkMetrics, LinkMetricsCell};
#[cfg(feature = "metrics")]
pub use prometheus_export::*;
pub use telemetry::{SchedulerStats, StatsSnapshot};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Bitrate;

/// Link metrics collector configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMetricsConfig {
    /// WiFi interface whose addresses and bitrate are tracked. Defaults to
    /// the first WiFi interface that is up, `wlan0` when there is none.
    #[serde(default = "default_wifi_interface")]
    pub wifi_interface: String,

    /// `iw` binary used to read the WiFi bitrate.
    #[serde(default = "default_iw_command")]
    pub iw_command: String,

    /// Polling interval.
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    /// Cellular bitrate in bits/s set by the operator. 0 = unknown.
    #[serde(default)]
    pub cellular_bitrate_bps: u64,
}

fn default_wifi_interface() -> String {
    crate::util::detect_wifi_interface().unwrap_or_else(|| "wlan0".to_string())
}
fn default_iw_command() -> String {
    "iw".to_string()
}
fn default_poll_interval() -> Duration {
    Duration::from_secs(1)
}

impl Default for LinkMetricsConfig {
    fn default() -> Self {
        Self {
            wifi_interface: default_wifi_interface(),
            iw_command: default_iw_command(),
            poll_interval: default_poll_interval(),
            cellular_bitrate_bps: 0,
        }
    }
}

impl LinkMetricsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::InvalidConfig("link_metrics.poll_interval must be non-zero".into()));
        }
        if self.wifi_interface.is_empty() {
            return Err(Error::InvalidConfig("link_metrics.wifi_interface must be set".into()));
        }
        Ok(())
    }

    pub fn cellular_bitrate(&self) -> Bitrate {
        Bitrate::from_bps(self.cellular_bitrate_bps)
    }
}
