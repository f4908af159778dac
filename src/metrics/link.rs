//! Link-layer bitrate snapshot shared between the poller and the scheduler.

use std::time::Instant;

use parking_lot::RwLock;
use serde::Serialize;

use crate::types::{Bitrate, LinkClass};

/// Latest bitrate sample per link class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkMetrics {
    /// WiFi-like link bitrate.
    pub wifi: Option<Bitrate>,
    /// Cellular-like link bitrate.
    pub cellular: Option<Bitrate>,
    /// When the collector last published.
    #[serde(skip)]
    pub updated_at: Option<Instant>,
}

impl LinkMetrics {
    pub fn new(wifi: Option<Bitrate>, cellular: Option<Bitrate>) -> Self {
        Self {
            wifi,
            cellular,
            updated_at: Some(Instant::now()),
        }
    }

    /// Raw sample for a class.
    pub fn bitrate(&self, class: LinkClass) -> Option<Bitrate> {
        match class {
            LinkClass::Wifi => self.wifi,
            LinkClass::Cellular => self.cellular,
        }
    }

    /// Sample for a class, only if present and non-zero.
    pub fn valid(&self, class: LinkClass) -> Option<Bitrate> {
        self.bitrate(class).filter(|b| b.is_valid())
    }

    /// Whether the collector has ever published.
    pub fn is_set(&self) -> bool {
        self.updated_at.is_some()
    }

    /// The class with the strictly higher bitrate. Ties go to cellular.
    ///
    /// `None` when either sample is missing or zero.
    pub fn preferred_class(&self) -> Option<LinkClass> {
        let wifi = self.valid(LinkClass::Wifi)?;
        let cellular = self.valid(LinkClass::Cellular)?;
        if wifi > cellular {
            Some(LinkClass::Wifi)
        } else {
            Some(LinkClass::Cellular)
        }
    }
}

/// Shared, torn-write-safe holder for [`LinkMetrics`].
///
/// Readers copy the value out under a short read lock; the writer swaps the
/// whole value. No I/O happens while the lock is held.
#[derive(Debug, Default)]
pub struct LinkMetricsCell {
    inner: RwLock<LinkMetrics>,
}

impl LinkMetricsCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current snapshot.
    pub fn load(&self) -> LinkMetrics {
        *self.inner.read()
    }

    /// Replace the snapshot.
    pub fn store(&self, metrics: LinkMetrics) {
        *self.inner.write() = metrics;
    }

    /// Publish fresh samples stamped with the current time.
    pub fn publish(&self, wifi: Option<Bitrate>, cellular: Option<Bitrate>) {
        self.store(LinkMetrics::new(wifi, cellular));
    }
}
