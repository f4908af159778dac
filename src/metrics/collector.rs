//! Background link bitrate polling.
//!
//! A tokio task samples the WiFi and cellular bitrate sources at a fixed
//! interval and publishes both samples into a [`LinkMetricsCell`]. Sampling
//! happens outside the cell's lock, so the scheduler never waits on a poll.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::link::{LinkMetrics, LinkMetricsCell};
use super::LinkMetricsConfig;
use crate::error::MetricsError;
use crate::multipath::AddressClassifier;
use crate::types::Bitrate;

/// A source of link bitrate samples.
#[async_trait]
pub trait BitrateSource: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> &str;

    /// Take one sample.
    async fn sample(&self) -> Result<Bitrate, MetricsError>;
}

/// WiFi bitrate read from `iw dev <interface> link`.
#[derive(Debug, Clone)]
pub struct IwBitrate {
    interface: String,
    command: String,
}

impl IwBitrate {
    pub fn new(interface: impl Into<String>) -> Self {
        Self::with_command(interface, "iw")
    }

    /// Use a different `iw` binary.
    pub fn with_command(interface: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            interface: interface.into(),
            command: command.into(),
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

#[async_trait]
impl BitrateSource for IwBitrate {
    fn name(&self) -> &str {
        &self.interface
    }

    async fn sample(&self) -> Result<Bitrate, MetricsError> {
        let output = Command::new(&self.command)
            .args(["dev", &self.interface, "link"])
            .output()
            .await
            .map_err(|e| MetricsError::CommandFailed {
                command: self.command.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(MetricsError::CommandFailed {
                command: self.command.clone(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_iw_link(&stdout)?.ok_or_else(|| MetricsError::NoData(self.interface.clone()))
    }
}

/// Parse the output of `iw dev <if> link`.
///
/// Prefers `rx bitrate`, falls back to `tx bitrate`. `Ok(None)` means the
/// interface is not associated or reports no rate.
pub fn parse_iw_link(output: &str) -> Result<Option<Bitrate>, MetricsError> {
    let mut rx = None;
    let mut tx = None;

    for line in output.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("rx bitrate:") {
            rx = Some(parse_rate(rest)?);
        } else if let Some(rest) = line.strip_prefix("tx bitrate:") {
            tx = Some(parse_rate(rest)?);
        }
    }

    Ok(rx.or(tx).filter(|b| b.is_valid()))
}

/// Parse `866.7 MBit/s VHT-MCS 9 ...` into a bitrate.
fn parse_rate(text: &str) -> Result<Bitrate, MetricsError> {
    let mut parts = text.split_whitespace();
    let (Some(value), Some(unit)) = (parts.next(), parts.next()) else {
        return Err(MetricsError::Unparseable(text.trim().to_string()));
    };
    let value: f64 = value
        .parse()
        .map_err(|_| MetricsError::Unparseable(text.trim().to_string()))?;
    let scale = match unit {
        "GBit/s" => 1_000_000_000.0,
        "MBit/s" => 1_000_000.0,
        "kBit/s" | "KBit/s" => 1_000.0,
        "Bit/s" => 1.0,
        _ => return Err(MetricsError::Unparseable(text.trim().to_string())),
    };
    Ok(Bitrate::from_bps((value * scale).max(0.0) as u64))
}

/// Operator-configured bitrate, for links whose rate cannot be queried.
///
/// Zero means not configured.
#[derive(Debug, Default)]
pub struct ConfiguredBitrate {
    label: String,
    bps: AtomicU64,
}

impl ConfiguredBitrate {
    pub fn new(label: impl Into<String>, initial: Bitrate) -> Self {
        Self {
            label: label.into(),
            bps: AtomicU64::new(initial.bps()),
        }
    }

    pub fn set(&self, bitrate: Bitrate) {
        self.bps.store(bitrate.bps(), Ordering::Relaxed);
    }

    pub fn clear(&self) {
        self.set(Bitrate::ZERO);
    }

    pub fn get(&self) -> Option<Bitrate> {
        Some(Bitrate::from_bps(self.bps.load(Ordering::Relaxed))).filter(|b| b.is_valid())
    }
}

#[async_trait]
impl BitrateSource for ConfiguredBitrate {
    fn name(&self) -> &str {
        &self.label
    }

    async fn sample(&self) -> Result<Bitrate, MetricsError> {
        self.get().ok_or_else(|| MetricsError::NoData(format!("{} (not configured)", self.label)))
    }
}

/// Periodic poller publishing into a shared [`LinkMetricsCell`].
#[derive(Clone)]
pub struct LinkMetricsCollector {
    poll_interval: Duration,
    wifi: Arc<dyn BitrateSource>,
    cellular: Arc<dyn BitrateSource>,
    cell: Arc<LinkMetricsCell>,
    classifier: Option<(Arc<AddressClassifier>, String)>,
    updates_tx: broadcast::Sender<LinkMetrics>,
    shutdown_tx: broadcast::Sender<()>,
}

impl LinkMetricsCollector {
    /// Create a collector over two sources.
    pub fn new(
        poll_interval: Duration,
        wifi: Arc<dyn BitrateSource>,
        cellular: Arc<dyn BitrateSource>,
        cell: Arc<LinkMetricsCell>,
    ) -> Self {
        let (updates_tx, _) = broadcast::channel(64);
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            poll_interval,
            wifi,
            cellular,
            cell,
            classifier: None,
            updates_tx,
            shutdown_tx,
        }
    }

    /// Collector reading WiFi via `iw` and cellular from a configured value.
    pub fn from_config(
        config: &LinkMetricsConfig,
        cellular: Arc<ConfiguredBitrate>,
        cell: Arc<LinkMetricsCell>,
    ) -> Self {
        let wifi = IwBitrate::with_command(&config.wifi_interface, &config.iw_command);
        Self::new(config.poll_interval, Arc::new(wifi), cellular, cell)
    }

    /// Also refresh `classifier` from `interface` addresses on every poll.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<AddressClassifier>, interface: impl Into<String>) -> Self {
        self.classifier = Some((classifier, interface.into()));
        self
    }

    pub fn cell(&self) -> &Arc<LinkMetricsCell> {
        &self.cell
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> broadcast::Receiver<LinkMetrics> {
        self.updates_tx.subscribe()
    }

    /// Sample both sources once and publish.
    pub async fn poll_once(&self) -> LinkMetrics {
        let (wifi, cellular) = tokio::join!(self.wifi.sample(), self.cellular.sample());
        let wifi = Self::accept(self.wifi.name(), wifi);
        let cellular = Self::accept(self.cellular.name(), cellular);

        if let Some((classifier, interface)) = &self.classifier {
            // getifaddrs blocks
            let refresh = {
                let classifier = Arc::clone(classifier);
                let interface = interface.clone();
                tokio::task::spawn_blocking(move || classifier.refresh_from_interface(&interface))
            };
            match refresh.await {
                Ok(count) => trace!(interface = %interface, addresses = count, "WiFi addresses refreshed"),
                Err(e) => warn!(interface = %interface, error = %e, "WiFi address refresh failed"),
            }
        }

        let metrics = LinkMetrics::new(wifi, cellular);
        self.cell.store(metrics);
        trace!(wifi = ?metrics.wifi, cellular = ?metrics.cellular, "Link metrics published");
        let _ = self.updates_tx.send(metrics);
        metrics
    }

    fn accept(source: &str, sample: Result<Bitrate, MetricsError>) -> Option<Bitrate> {
        match sample {
            Ok(bitrate) => Some(bitrate),
            Err(MetricsError::NoData(what)) => {
                debug!(source = %source, "No bitrate for {}", what);
                None
            }
            Err(e) => {
                warn!(source = %source, error = %e, "Bitrate poll failed");
                None
            }
        }
    }

    /// Start polling on a background task.
    pub fn start(&self) -> JoinHandle<()> {
        let collector = self.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!(interval = ?self.poll_interval, "Link metrics collector started");
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(collector.poll_interval);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        collector.poll_once().await;
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Link metrics collector stopped");
                        break;
                    }
                }
            }
        })
    }

    /// Stop the background task.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for LinkMetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkMetricsCollector")
            .field("poll_interval", &self.poll_interval)
            .field("wifi", &self.wifi.name())
            .field("cellular", &self.cellular.name())
            .finish()
    }
}
