//! Cross-layer candidate selection.
//!
//! Paths are partitioned into WiFi-like and cellular-like classes by the
//! local address they are bound to. The class whose link currently reports
//! the higher bitrate supplies the candidate path.

use std::collections::HashSet;
use std::net::IpAddr;

use parking_lot::RwLock;
use tracing::debug;

use super::availability::is_available;
use super::path::PathSnapshot;
use super::selector::min_rtt;
use crate::error::SchedulingError;
use crate::metrics::LinkMetrics;
use crate::types::LinkClass;
use crate::util::interface_addresses;

/// Assigns paths to link classes.
pub trait LinkClassifier: Send + Sync {
    /// Class of the path, or `None` if it cannot be classified.
    fn classify(&self, path: &PathSnapshot) -> Option<LinkClass>;
}

/// Classifies by local address: addresses of the WiFi interface are WiFi,
/// every other address is cellular.
#[derive(Debug, Default)]
pub struct AddressClassifier {
    wifi: RwLock<HashSet<IpAddr>>,
}

impl AddressClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifier with a fixed WiFi address set.
    pub fn from_addrs(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        Self {
            wifi: RwLock::new(addrs.into_iter().collect()),
        }
    }

    /// Replace the WiFi address set.
    pub fn set_wifi_addrs(&self, addrs: impl IntoIterator<Item = IpAddr>) {
        let fresh: HashSet<IpAddr> = addrs.into_iter().collect();
        *self.wifi.write() = fresh;
    }

    /// Reload the WiFi address set from the OS. Returns the number of
    /// addresses found.
    pub fn refresh_from_interface(&self, interface: &str) -> usize {
        let addrs = interface_addresses(interface);
        let count = addrs.len();
        self.set_wifi_addrs(addrs);
        count
    }

    pub fn is_wifi(&self, addr: &IpAddr) -> bool {
        self.wifi.read().contains(addr)
    }

    pub fn wifi_addrs(&self) -> Vec<IpAddr> {
        self.wifi.read().iter().copied().collect()
    }
}

impl LinkClassifier for AddressClassifier {
    fn classify(&self, path: &PathSnapshot) -> Option<LinkClass> {
        let addr = path.local_addr?;
        if self.is_wifi(&addr) {
            Some(LinkClass::Wifi)
        } else {
            Some(LinkClass::Cellular)
        }
    }
}

/// Pick the candidate path from the class with the higher link bitrate.
///
/// Only available non-backup paths are classified. Within a class the
/// lowest-RTT path represents it. Fails with
/// [`SchedulingError::MetricsUnavailable`] when either class has no path or
/// either bitrate sample is missing or zero.
pub fn cross_layer_candidate<'a>(
    paths: &'a [PathSnapshot],
    classifier: &dyn LinkClassifier,
    metrics: &LinkMetrics,
) -> Result<&'a PathSnapshot, SchedulingError> {
    let eligible = || paths.iter().filter(|p| !p.backup && is_available(p));
    let of_class = |class: LinkClass| min_rtt(eligible().filter(move |p| classifier.classify(p) == Some(class)));

    let (Some(wifi), Some(cellular)) = (of_class(LinkClass::Wifi), of_class(LinkClass::Cellular)) else {
        debug!("xlayer: a link class has no eligible path");
        return Err(SchedulingError::MetricsUnavailable);
    };

    match metrics.preferred_class() {
        Some(LinkClass::Wifi) => Ok(wifi),
        Some(LinkClass::Cellular) => Ok(cellular),
        None => {
            debug!(wifi = ?metrics.wifi, cellular = ?metrics.cellular, "xlayer: no valid bitrate");
            Err(SchedulingError::MetricsUnavailable)
        }
    }
}
