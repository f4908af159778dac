//! Minimum-RTT path selection with backup fallback.

use std::time::Duration;

use super::availability::{is_available, is_sendable};
use super::path::PathSnapshot;

/// Ordering key for RTT comparison. An unmeasured RTT sorts last.
#[inline]
pub fn rtt_key(path: &PathSnapshot) -> Duration {
    if path.has_rtt() {
        path.srtt
    } else {
        Duration::MAX
    }
}

/// Lowest-RTT path of an iterator. Ties keep the first path seen.
pub fn min_rtt<'a, I>(paths: I) -> Option<&'a PathSnapshot>
where
    I: IntoIterator<Item = &'a PathSnapshot>,
{
    // min_by_key returns the last minimum on ties, so fold by hand.
    paths.into_iter().fold(None, |best, path| match best {
        Some(b) if rtt_key(b) <= rtt_key(path) => Some(b),
        _ => Some(path),
    })
}

/// Select the available path with the smallest RTT.
///
/// Non-backup paths are tried first; backup paths are only considered when
/// no non-backup path is available.
pub fn select_best(paths: &[PathSnapshot]) -> Option<&PathSnapshot> {
    min_rtt(paths.iter().filter(|p| !p.backup && is_available(p)))
        .or_else(|| min_rtt(paths.iter().filter(|p| p.backup && is_available(p))))
}

/// First path that exists and accepts data at all, ignoring window limits.
pub fn select_last_resort(paths: &[PathSnapshot]) -> Option<&PathSnapshot> {
    paths.iter().find(|p| is_sendable(p))
}
