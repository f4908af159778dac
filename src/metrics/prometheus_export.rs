//! Prometheus metrics export.
//!
//! Mirrors the scheduler telemetry aggregate and the latest link bitrate
//! samples in Prometheus text format.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use super::link::LinkMetrics;
use super::telemetry::StatsSnapshot;
use crate::multipath::{Outcome, SchedulingStrategy};
use crate::types::LinkClass;

/// Prometheus metrics registry and collectors.
pub struct PrometheusMetrics {
    registry: Registry,

    // Connection metrics
    pub connections_active: IntGauge,
    pub connections_total: IntCounter,

    // Decision metrics
    pub decisions_total: IntCounter,
    pub hol_prevented_total: IntCounter,
    pub no_path_total: IntCounter,
    pub lambda_updates_total: IntCounter,
    pub selections_total: IntCounterVec,

    // Link metrics
    pub link_bitrate_bps: IntGaugeVec,
}

impl PrometheusMetrics {
    /// Create a new metrics instance with all collectors registered.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let connections_active = IntGauge::new(
            "mpsched_connections_active",
            "Connections with live scheduler state",
        )?;
        let connections_total = IntCounter::new(
            "mpsched_connections_total",
            "Connections initialized",
        )?;

        let decisions_total = IntCounter::new(
            "mpsched_decisions_total",
            "Successful scheduling decisions of released connections",
        )?;
        let hol_prevented_total = IntCounter::new(
            "mpsched_hol_prevented_total",
            "Decisions where the fastest path replaced the candidate",
        )?;
        let no_path_total = IntCounter::new(
            "mpsched_no_path_total",
            "Scheduling calls with no available path",
        )?;
        let lambda_updates_total = IntCounter::new(
            "mpsched_lambda_updates_total",
            "Lambda adjustments",
        )?;
        let selections_total = IntCounterVec::new(
            Opts::new("mpsched_selections_total", "Selections by strategy and outcome"),
            &["strategy", "outcome"],
        )?;

        let link_bitrate_bps = IntGaugeVec::new(
            Opts::new("mpsched_link_bitrate_bps", "Latest link bitrate sample (0 = invalid)"),
            &["class"],
        )?;

        registry.register(Box::new(connections_active.clone()))?;
        registry.register(Box::new(connections_total.clone()))?;
        registry.register(Box::new(decisions_total.clone()))?;
        registry.register(Box::new(hol_prevented_total.clone()))?;
        registry.register(Box::new(no_path_total.clone()))?;
        registry.register(Box::new(lambda_updates_total.clone()))?;
        registry.register(Box::new(selections_total.clone()))?;
        registry.register(Box::new(link_bitrate_bps.clone()))?;

        Ok(Self {
            registry,
            connections_active,
            connections_total,
            decisions_total,
            hol_prevented_total,
            no_path_total,
            lambda_updates_total,
            selections_total,
            link_bitrate_bps,
        })
    }

    /// Encode metrics to Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }

    /// Bring counters up to a telemetry snapshot. Counters never go back.
    pub fn update_from(&self, stats: &StatsSnapshot) {
        fn advance(counter: &IntCounter, target: u64) {
            let current = counter.get();
            if target > current {
                counter.inc_by(target - current);
            }
        }

        self.connections_active
            .set(i64::try_from(stats.connections_active).unwrap_or(i64::MAX));
        advance(&self.connections_total, stats.connections_total);
        advance(&self.decisions_total, stats.decisions_total);
        advance(&self.hol_prevented_total, stats.hol_prevented_total);
        advance(&self.no_path_total, stats.no_path_total);
        advance(&self.lambda_updates_total, stats.lambda_updates_total);
    }

    /// Record one selection.
    pub fn record_selection(&self, strategy: SchedulingStrategy, outcome: Outcome) {
        let outcome = match outcome {
            Outcome::Fastest => "fastest",
            Outcome::Candidate => "candidate",
            Outcome::HolPrevented => "hol_prevented",
            Outcome::RoundRobin => "round_robin",
            Outcome::Redundant => "redundant",
            Outcome::LastResort => "last_resort",
        };
        self.selections_total
            .with_label_values(&[strategy.as_str(), outcome])
            .inc();
    }

    /// Record the latest link samples.
    pub fn set_link_metrics(&self, metrics: &LinkMetrics) {
        for class in [LinkClass::Wifi, LinkClass::Cellular] {
            let bps = metrics.valid(class).map_or(0, |b| b.bps());
            let label = class.to_string();
            self.link_bitrate_bps
                .with_label_values(&[label.as_str()])
                .set(i64::try_from(bps).unwrap_or(i64::MAX));
        }
    }
}

#[allow(clippy::missing_fields_in_debug)]
impl std::fmt::Debug for PrometheusMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusMetrics").finish()
    }
}
