//! Utility functions and helpers.

use std::time::Duration;

use crate::types::LinkClass;

mod interface;

pub use interface::*;

/// Guess the link class of an interface from its name.
///
/// Returns `None` for interfaces that are neither radio links nor
/// recognizable cellular modems (loopback, tunnels, wired).
pub fn guess_link_class(name: &str) -> Option<LinkClass> {
    let name = name.to_lowercase();

    if name.starts_with("wlan") || name.starts_with("wlp") || name.starts_with("wl") {
        Some(LinkClass::Wifi)
    } else if name.starts_with("wwan")
        || name.starts_with("rmnet")
        || name.starts_with("ccmni")
        || name.starts_with("pdp")
        || name.starts_with("cell")
        || name.starts_with("usb")
        || name.starts_with("nr")
        || name.starts_with("lte")
    {
        Some(LinkClass::Cellular)
    } else {
        None
    }
}

/// Format bytes as human-readable.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Format an RTT-scale duration with sub-millisecond precision.
pub fn format_rtt(duration: Duration) -> String {
    if duration.is_zero() {
        return "-".to_string();
    }
    let ms = duration.as_secs_f64() * 1000.0;
    if ms >= 1000.0 {
        format!("{:.2}s", ms / 1000.0)
    } else {
        format!("{ms:.1}ms")
    }
}
