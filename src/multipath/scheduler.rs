//! Subflow scheduler with head-of-line blocking prevention.
//!
//! Implements multiple scheduling strategies:
//! - Minimum RTT
//! - BLEST (host best-path hint guarded by a blocking estimate)
//! - Cross-layer (link bitrate hint guarded by a blocking estimate)
//! - Round-robin
//! - Redundant (send on every available path)
//!
//! The three estimating strategies share one decision routine. They differ
//! only in how the *candidate* path is produced; when the candidate is not
//! the lowest-RTT path, the scheduler estimates whether committing data to
//! the candidate would starve the fast path of send window, and if so sends
//! on the fast path instead.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::availability::is_available;
use super::estimator::{estimate_deliverable_bytes, estimate_linger_time, RttBounds};
use super::lambda::{Lambda, LambdaConfig, LambdaController, LambdaUpdate};
use super::path::{HostConnection, PathSnapshot};
use super::selector::{select_best, select_last_resort};
use super::xlayer::{cross_layer_candidate, LinkClassifier};
use crate::error::{Error, Result, SchedulingError};
use crate::metrics::{LinkMetricsCell, SchedulerStats};
use crate::types::{ConnectionId, PathId};

/// Scheduling strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingStrategy {
    /// Always the lowest-RTT available path.
    MinRtt,
    /// Host best-path recommendation, overridden on HoL risk.
    #[default]
    Blest,
    /// Higher-bitrate link class, overridden on HoL risk.
    Xlayer,
    /// Cycle through available paths.
    RoundRobin,
    /// Send on all available paths.
    Redundant,
}

impl SchedulingStrategy {
    pub const ALL: [Self; 5] = [Self::MinRtt, Self::Blest, Self::Xlayer, Self::RoundRobin, Self::Redundant];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::MinRtt => "min_rtt",
            Self::Blest => "blest",
            Self::Xlayer => "xlayer",
            Self::RoundRobin => "round_robin",
            Self::Redundant => "redundant",
        }
    }

    /// Whether the strategy runs the HoL-blocking check.
    pub fn estimates(self) -> bool {
        matches!(self, Self::MinRtt | Self::Blest | Self::Xlayer)
    }
}

impl fmt::Display for SchedulingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulingStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized || (normalized == "minrtt" && *strategy == Self::MinRtt))
            .ok_or_else(|| Error::InvalidConfig(format!("unknown scheduling strategy '{s}'")))
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Scheduling strategy.
    #[serde(default)]
    pub strategy: SchedulingStrategy,

    /// Count bytes about to be appended to the pending segment as in flight
    /// on the candidate path.
    #[serde(default = "default_count_pending")]
    pub count_pending_bytes: bool,

    /// When nothing passes the availability filter, use the first path that
    /// is merely alive and sendable instead of failing.
    #[serde(default)]
    pub last_resort_fallback: bool,

    /// Lambda tunables.
    #[serde(default)]
    pub lambda: LambdaConfig,
}

fn default_count_pending() -> bool { true }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            strategy: SchedulingStrategy::default(),
            count_pending_bytes: default_count_pending(),
            last_resort_fallback: false,
            lambda: LambdaConfig::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_strategy(strategy: SchedulingStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.lambda.validate()
    }
}

/// How a path was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Candidate coincided with the lowest-RTT path; no HoL check needed.
    Fastest,
    /// HoL check passed; candidate used.
    Candidate,
    /// HoL risk detected; lowest-RTT path used instead of the candidate.
    HolPrevented,
    /// Next path in round-robin order.
    RoundRobin,
    /// Every available path; see [`Selection::duplicates`].
    Redundant,
    /// Nothing was available; a sendable but limited path was used.
    LastResort,
}

/// Numbers behind one HoL-blocking check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HolCheck {
    pub fastest: PathId,
    pub candidate: PathId,
    pub lambda: Lambda,
    /// Drain time of the candidate path.
    #[serde(with = "humantime_serde")]
    pub linger: Duration,
    /// Bytes the fastest path could send during `linger`.
    pub fast_bytes: u64,
    /// Bytes outstanding on the candidate path.
    pub slow_inflight_bytes: u64,
    /// Send window left after the candidate's outstanding bytes.
    pub avail_space: u64,
}

impl HolCheck {
    pub fn hol_risk(&self) -> bool {
        self.fast_bytes > self.avail_space
    }
}

/// Result of one scheduling call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    /// Path marked as scheduled.
    pub path: PathId,
    pub outcome: Outcome,
    /// Additional paths marked for the same data (redundant strategy only).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicates: Vec<PathId>,
    /// Present when the HoL check ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check: Option<HolCheck>,
}

impl Selection {
    fn single(path: PathId, outcome: Outcome) -> Self {
        Self {
            path,
            outcome,
            duplicates: Vec::new(),
            check: None,
        }
    }

    /// All marked paths, primary first.
    pub fn paths(&self) -> impl Iterator<Item = PathId> + '_ {
        std::iter::once(self.path).chain(self.duplicates.iter().copied())
    }
}

/// Per-connection control state as seen from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ControlSnapshot {
    pub strategy: SchedulingStrategy,
    pub lambda: Lambda,
    #[serde(with = "humantime_serde")]
    pub min_srtt: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub max_srtt: Option<Duration>,
    pub total_decisions: u64,
    pub hol_prevented: u64,
    pub no_path: u64,
    pub lambda_updates: u64,
}

struct Shared {
    config: SchedulerConfig,
    classifier: Option<Arc<dyn LinkClassifier>>,
    link_metrics: Option<Arc<LinkMetricsCell>>,
    stats: Arc<SchedulerStats>,
}

/// Scheduler policy shared by all connections.
///
/// Cheap to clone. Holds configuration, the optional cross-layer inputs and
/// the telemetry aggregate; all per-connection state lives in
/// [`ConnectionScheduler`].
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::build(config, None, None, Arc::new(SchedulerStats::new()))
    }

    /// Create a scheduler with cross-layer inputs.
    pub fn with_cross_layer(
        config: SchedulerConfig,
        classifier: Arc<dyn LinkClassifier>,
        link_metrics: Arc<LinkMetricsCell>,
    ) -> Self {
        Self::build(config, Some(classifier), Some(link_metrics), Arc::new(SchedulerStats::new()))
    }

    /// Replace the telemetry aggregate, e.g. to share one across schedulers.
    #[must_use]
    pub fn with_stats(self, stats: Arc<SchedulerStats>) -> Self {
        Self::build(
            self.shared.config.clone(),
            self.shared.classifier.clone(),
            self.shared.link_metrics.clone(),
            stats,
        )
    }

    fn build(
        config: SchedulerConfig,
        classifier: Option<Arc<dyn LinkClassifier>>,
        link_metrics: Option<Arc<LinkMetricsCell>>,
        stats: Arc<SchedulerStats>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                classifier,
                link_metrics,
                stats,
            }),
        }
    }

    /// Get configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn stats(&self) -> &Arc<SchedulerStats> {
        &self.shared.stats
    }

    /// Set up control state for a new connection.
    pub fn on_init(&self) -> ConnectionScheduler {
        let lambda = LambdaController::new(&self.shared.config.lambda);
        self.shared.stats.connection_opened();
        info!(
            strategy = %self.shared.config.strategy,
            lambda = %lambda.value(),
            "Scheduler initialized"
        );
        ConnectionScheduler {
            scheduler: self.clone(),
            lambda,
            rtt_bounds: RttBounds::new(),
            rr_cursor: 0,
            total_decisions: 0,
            hol_prevented: 0,
            no_path: 0,
            lambda_updates: 0,
        }
    }
}

#[allow(clippy::missing_fields_in_debug)]
impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("strategy", &self.shared.config.strategy)
            .field("cross_layer", &self.shared.classifier.is_some())
            .finish()
    }
}

/// One connection's scheduling state.
///
/// Calls are serialized through `&mut self`, so the hot path takes no locks
/// apart from the short read of the link metrics snapshot.
pub struct ConnectionScheduler {
    scheduler: Scheduler,
    lambda: LambdaController,
    rtt_bounds: RttBounds,
    rr_cursor: usize,
    total_decisions: u64,
    hol_prevented: u64,
    no_path: u64,
    lambda_updates: u64,
}

impl ConnectionScheduler {
    pub fn strategy(&self) -> SchedulingStrategy {
        self.scheduler.shared.config.strategy
    }

    pub fn lambda(&self) -> Lambda {
        self.lambda.value()
    }

    pub fn rtt_bounds(&self) -> RttBounds {
        self.rtt_bounds
    }

    pub fn total_decisions(&self) -> u64 {
        self.total_decisions
    }

    pub fn hol_prevented(&self) -> u64 {
        self.hol_prevented
    }

    /// Pick a path for the next segment and mark it on `conn`.
    pub fn get_subflow<C: HostConnection + ?Sized>(&mut self, conn: &mut C) -> std::result::Result<Selection, SchedulingError> {
        self.get_subflow_at(conn, Instant::now())
    }

    /// Like [`get_subflow`](Self::get_subflow) with an explicit clock for the
    /// lambda rate limit.
    pub fn get_subflow_at<C: HostConnection + ?Sized>(
        &mut self,
        conn: &mut C,
        now: Instant,
    ) -> std::result::Result<Selection, SchedulingError> {
        let selection = match self.decide(&*conn, now) {
            Ok(selection) => selection,
            Err(e) => {
                self.no_path += 1;
                trace!(error = %e, "No path scheduled");
                return Err(e);
            }
        };

        for path in selection.paths() {
            conn.mark_scheduled(path);
        }
        self.total_decisions += 1;

        trace!(
            path = %selection.path,
            outcome = ?selection.outcome,
            fast_bytes = selection.check.map(|c| c.fast_bytes),
            avail_space = selection.check.map(|c| c.avail_space),
            "Path scheduled"
        );
        Ok(selection)
    }

    fn decide<C: HostConnection + ?Sized>(
        &mut self,
        conn: &C,
        now: Instant,
    ) -> std::result::Result<Selection, SchedulingError> {
        let paths = conn.paths();
        self.rtt_bounds = RttBounds::from_paths(paths.iter().filter(|p| is_available(p)));

        let selection = match self.strategy() {
            SchedulingStrategy::RoundRobin => self.round_robin(paths),
            SchedulingStrategy::Redundant => Self::redundant(paths),
            _ => self.hol_aware(conn, now),
        };

        match selection {
            Some(selection) => Ok(selection),
            None if self.scheduler.shared.config.last_resort_fallback => select_last_resort(paths)
                .map(|p| {
                    debug!(path = %p.id, "No available path, using last resort");
                    Selection::single(p.id, Outcome::LastResort)
                })
                .ok_or(SchedulingError::NoAvailablePath),
            None => Err(SchedulingError::NoAvailablePath),
        }
    }

    /// Shared decision routine of the estimating strategies.
    fn hol_aware<C: HostConnection + ?Sized>(&mut self, conn: &C, now: Instant) -> Option<Selection> {
        let paths = conn.paths();
        let fastest = select_best(paths)?;

        let candidate = match self.candidate(conn, fastest) {
            Ok(candidate) => candidate,
            Err(e) => {
                debug!(error = %e, fallback = %fastest.id, "Candidate unavailable, using fastest path");
                fastest
            }
        };

        if candidate.id == fastest.id {
            return Some(Selection::single(fastest.id, Outcome::Fastest));
        }

        let check = self.hol_check(conn, fastest, candidate, now);
        if check.hol_risk() {
            self.hol_prevented += 1;
            debug!(
                fastest = %fastest.id,
                candidate = %candidate.id,
                fast_bytes = check.fast_bytes,
                avail_space = check.avail_space,
                "HoL blocking prevented"
            );
            Some(Selection {
                check: Some(check),
                ..Selection::single(fastest.id, Outcome::HolPrevented)
            })
        } else {
            Some(Selection {
                check: Some(check),
                ..Selection::single(candidate.id, Outcome::Candidate)
            })
        }
    }

    fn candidate<'a, C: HostConnection + ?Sized>(
        &self,
        conn: &'a C,
        fastest: &'a PathSnapshot,
    ) -> std::result::Result<&'a PathSnapshot, SchedulingError> {
        let paths = conn.paths();
        let shared = &self.scheduler.shared;
        match shared.config.strategy {
            SchedulingStrategy::Blest => conn
                .recommended_path()
                .and_then(|id| paths.iter().find(|p| p.id == id))
                .filter(|p| is_available(p))
                .ok_or(SchedulingError::RecommendationUnavailable),
            SchedulingStrategy::Xlayer => match (&shared.classifier, &shared.link_metrics) {
                (Some(classifier), Some(cell)) => cross_layer_candidate(paths, classifier.as_ref(), &cell.load()),
                _ => Err(SchedulingError::MetricsUnavailable),
            },
            _ => Ok(fastest),
        }
    }

    fn hol_check<C: HostConnection + ?Sized>(
        &mut self,
        conn: &C,
        fastest: &PathSnapshot,
        candidate: &PathSnapshot,
        now: Instant,
    ) -> HolCheck {
        match self.lambda.maybe_update(now, candidate.srtt, conn.retransmission_pending()) {
            LambdaUpdate::Skipped => {}
            update => {
                self.lambda_updates += 1;
                debug!(?update, "Lambda adjusted");
            }
        }
        let lambda = self.lambda.value();

        let linger = estimate_linger_time(candidate, &self.rtt_bounds);
        let fast_bytes = estimate_deliverable_bytes(fastest, &self.rtt_bounds, lambda, linger);

        let mut slow_inflight_bytes = candidate.unacked_bytes();
        if self.scheduler.shared.config.count_pending_bytes {
            slow_inflight_bytes = slow_inflight_bytes.saturating_add(conn.pending_bytes());
        }
        let avail_space = conn.send_window().saturating_sub(slow_inflight_bytes);

        HolCheck {
            fastest: fastest.id,
            candidate: candidate.id,
            lambda,
            linger,
            fast_bytes,
            slow_inflight_bytes,
            avail_space,
        }
    }

    /// Next available path after the previous pick, primaries before backups.
    fn round_robin(&mut self, paths: &[PathSnapshot]) -> Option<Selection> {
        let mut tier: Vec<&PathSnapshot> = paths.iter().filter(|p| !p.backup && is_available(p)).collect();
        if tier.is_empty() {
            tier = paths.iter().filter(|p| p.backup && is_available(p)).collect();
        }
        if tier.is_empty() {
            return None;
        }

        let index = self.rr_cursor % tier.len();
        self.rr_cursor = index + 1;
        Some(Selection::single(tier[index].id, Outcome::RoundRobin))
    }

    /// Every available path; the preferred one first.
    fn redundant(paths: &[PathSnapshot]) -> Option<Selection> {
        let primary = select_best(paths)?;
        let duplicates = paths
            .iter()
            .filter(|p| p.id != primary.id && is_available(p))
            .map(|p| p.id)
            .collect();
        Some(Selection {
            duplicates,
            ..Selection::single(primary.id, Outcome::Redundant)
        })
    }

    /// Current control state.
    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            strategy: self.strategy(),
            lambda: self.lambda.value(),
            min_srtt: self.rtt_bounds.min(),
            max_srtt: self.rtt_bounds.max(),
            total_decisions: self.total_decisions,
            hol_prevented: self.hol_prevented,
            no_path: self.no_path,
            lambda_updates: self.lambda_updates,
        }
    }

    /// Tear down the connection's state and report its counters.
    pub fn on_release(self) -> ControlSnapshot {
        let snapshot = self.snapshot();
        self.scheduler.shared.stats.connection_closed(
            self.total_decisions,
            self.hol_prevented,
            self.no_path,
            self.lambda_updates,
        );
        info!(
            strategy = %snapshot.strategy,
            decisions = snapshot.total_decisions,
            hol_prevented = snapshot.hol_prevented,
            lambda = %snapshot.lambda,
            "Scheduler released"
        );
        snapshot
    }
}

#[allow(clippy::missing_fields_in_debug)]
impl fmt::Debug for ConnectionScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionScheduler")
            .field("strategy", &self.strategy())
            .field("lambda", &self.lambda.value())
            .field("total_decisions", &self.total_decisions)
            .field("hol_prevented", &self.hol_prevented)
            .finish()
    }
}

/// Connection-id keyed scheduler state for hosts that cannot store a
/// [`ConnectionScheduler`] in their own connection object.
#[derive(Debug)]
pub struct SchedulerRegistry {
    scheduler: Scheduler,
    connections: DashMap<ConnectionId, ConnectionScheduler>,
}

impl SchedulerRegistry {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            connections: DashMap::new(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Create control state for `id`. Existing state is kept.
    pub fn on_init(&self, id: ConnectionId) {
        self.connections
            .entry(id)
            .or_insert_with(|| self.scheduler.on_init());
    }

    /// Schedule for `id`, initializing its state on first use.
    pub fn get_subflow<C: HostConnection + ?Sized>(
        &self,
        id: ConnectionId,
        conn: &mut C,
    ) -> std::result::Result<Selection, SchedulingError> {
        self.connections
            .entry(id)
            .or_insert_with(|| self.scheduler.on_init())
            .get_subflow(conn)
    }

    /// Drop the state for `id`, returning its final counters.
    pub fn on_release(&self, id: ConnectionId) -> Option<ControlSnapshot> {
        self.connections.remove(&id).map(|(_, state)| state.on_release())
    }

    pub fn snapshot(&self, id: ConnectionId) -> Option<ControlSnapshot> {
        self.connections.get(&id).map(|state| state.snapshot())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
