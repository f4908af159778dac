//! Adaptive lambda: the confidence factor applied to throughput estimates.
//!
//! Lambda is nudged up by a large step when the connection has pending
//! retransmissions and down by a small step otherwise, at most once per RTT
//! of the slow path, and always kept inside its configured bounds.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fixed-point scaling ratio with three implicit decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lambda(u32);

impl Lambda {
    /// Fixed-point denominator.
    pub const SCALE: u32 = 1000;
    /// Nominal ratio of 1.0.
    pub const ONE: Self = Self(Self::SCALE);

    pub const fn from_millis(millis: u32) -> Self {
        Self(millis)
    }

    /// Convert a decimal ratio, rounding to the nearest thousandth.
    pub fn from_ratio(ratio: f64) -> Self {
        let millis = (ratio * f64::from(Self::SCALE)).round();
        Self(millis.clamp(0.0, f64::from(u32::MAX)) as u32)
    }

    pub const fn millis(self) -> u32 {
        self.0
    }

    pub fn as_ratio(self) -> f64 {
        f64::from(self.0) / f64::from(Self::SCALE)
    }
}

impl Default for Lambda {
    fn default() -> Self {
        Self::from_ratio(default_initial())
    }
}

impl fmt::Display for Lambda {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}", self.as_ratio())
    }
}

/// Lambda tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaConfig {
    /// Starting ratio for a new connection.
    #[serde(default = "default_initial")]
    pub initial: f64,

    /// Lower bound.
    #[serde(default = "default_min")]
    pub min: f64,

    /// Upper bound.
    #[serde(default = "default_max")]
    pub max: f64,

    /// Decrease (percent of 1.0) after an interval without retransmissions.
    #[serde(default = "default_good_step")]
    pub good_step_percent: f64,

    /// Increase (percent of 1.0) after an interval with retransmissions.
    #[serde(default = "default_bad_step")]
    pub bad_step_percent: f64,
}

fn default_initial() -> f64 { 1.2 }
fn default_min() -> f64 { 1.0 }
fn default_max() -> f64 { 1.3 }
fn default_good_step() -> f64 { 1.0 }
fn default_bad_step() -> f64 { 4.0 }

impl Default for LambdaConfig {
    fn default() -> Self {
        Self {
            initial: default_initial(),
            min: default_min(),
            max: default_max(),
            good_step_percent: default_good_step(),
            bad_step_percent: default_bad_step(),
        }
    }
}

impl LambdaConfig {
    /// Check bounds and steps.
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("initial", self.initial),
            ("min", self.min),
            ("max", self.max),
            ("good_step_percent", self.good_step_percent),
            ("bad_step_percent", self.bad_step_percent),
        ];
        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!(
                    "lambda.{name} must be a non-negative number, got {value}"
                )));
            }
        }
        if self.min <= 0.0 {
            return Err(Error::InvalidConfig("lambda.min must be positive".into()));
        }
        if self.min > self.max {
            return Err(Error::InvalidConfig(format!(
                "lambda.min ({}) exceeds lambda.max ({})",
                self.min, self.max
            )));
        }
        Ok(())
    }

    pub fn min_lambda(&self) -> Lambda {
        Lambda::from_ratio(self.min)
    }

    pub fn max_lambda(&self) -> Lambda {
        Lambda::from_ratio(self.max)
    }

    /// Percent of 1.0 expressed in lambda thousandths.
    fn step(percent: f64) -> u32 {
        Lambda::from_ratio(percent / 100.0).millis()
    }
}

/// Result of a [`LambdaController::maybe_update`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LambdaUpdate {
    /// Rate limit not yet elapsed; nothing changed.
    Skipped,
    /// Retransmissions pending; lambda raised (possibly clamped).
    Increased { from: Lambda, to: Lambda },
    /// No retransmissions; lambda lowered (possibly clamped).
    Decreased { from: Lambda, to: Lambda },
}

impl LambdaUpdate {
    pub fn is_applied(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

/// Per-connection lambda state.
#[derive(Debug, Clone)]
pub struct LambdaController {
    value: Lambda,
    min: Lambda,
    max: Lambda,
    good_step: u32,
    bad_step: u32,
    last_update: Option<Instant>,
}

impl LambdaController {
    /// Create a controller starting at the configured initial value,
    /// clamped into bounds.
    pub fn new(config: &LambdaConfig) -> Self {
        let min = config.min_lambda();
        let max = config.max_lambda().max(min);
        Self {
            value: Lambda::from_ratio(config.initial).clamp(min, max),
            min,
            max,
            good_step: LambdaConfig::step(config.good_step_percent),
            bad_step: LambdaConfig::step(config.bad_step_percent),
            last_update: None,
        }
    }

    /// Current value.
    pub fn value(&self) -> Lambda {
        self.value
    }

    pub fn bounds(&self) -> (Lambda, Lambda) {
        (self.min, self.max)
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Adjust lambda if at least `interval` has passed since the last
    /// adjustment. A controller that never adjusted may adjust immediately.
    pub fn maybe_update(
        &mut self,
        now: Instant,
        interval: Duration,
        retransmission_pending: bool,
    ) -> LambdaUpdate {
        if let Some(last) = self.last_update {
            if now.saturating_duration_since(last) < interval {
                return LambdaUpdate::Skipped;
            }
        }

        let from = self.value;
        let raw = if retransmission_pending {
            from.millis().saturating_add(self.bad_step)
        } else {
            from.millis().saturating_sub(self.good_step)
        };
        self.value = Lambda::from_millis(raw).clamp(self.min, self.max);
        self.last_update = Some(now);

        if retransmission_pending {
            LambdaUpdate::Increased { from, to: self.value }
        } else {
            LambdaUpdate::Decreased { from, to: self.value }
        }
    }
}

impl Default for LambdaController {
    fn default() -> Self {
        Self::new(&LambdaConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ctl = LambdaController::default();
        assert_eq!(ctl.value(), Lambda::from_millis(1200));
        assert_eq!(ctl.bounds(), (Lambda::from_millis(1000), Lambda::from_millis(1300)));
        assert!(ctl.last_update().is_none());
        assert_eq!(Lambda::default().to_string(), "1.200");
    }

    #[test]
    fn test_steps_are_asymmetric() {
        let mut ctl = LambdaController::default();
        let t0 = Instant::now();
        let rtt = Duration::from_millis(50);

        let up = ctl.maybe_update(t0, rtt, true);
        assert_eq!(
            up,
            LambdaUpdate::Increased { from: Lambda::from_millis(1200), to: Lambda::from_millis(1240) }
        );

        let down = ctl.maybe_update(t0 + rtt, rtt, false);
        assert_eq!(
            down,
            LambdaUpdate::Decreased { from: Lambda::from_millis(1240), to: Lambda::from_millis(1230) }
        );
    }

    #[test]
    fn test_rate_limited() {
        let mut ctl = LambdaController::default();
        let t0 = Instant::now();
        let rtt = Duration::from_millis(100);

        assert!(ctl.maybe_update(t0, rtt, true).is_applied());
        assert_eq!(ctl.maybe_update(t0 + Duration::from_millis(99), rtt, true), LambdaUpdate::Skipped);
        assert_eq!(ctl.value(), Lambda::from_millis(1240));
        assert!(ctl.maybe_update(t0 + rtt, rtt, true).is_applied());
    }

    #[test]
    fn test_clamped_at_bounds() {
        let mut ctl = LambdaController::default();
        let t0 = Instant::now();
        for i in 0..20 {
            ctl.maybe_update(t0 + Duration::from_secs(i), Duration::ZERO, true);
        }
        assert_eq!(ctl.value(), Lambda::from_millis(1300));

        for i in 20..100 {
            ctl.maybe_update(t0 + Duration::from_secs(i), Duration::ZERO, false);
        }
        assert_eq!(ctl.value(), Lambda::from_millis(1000));
    }

    #[test]
    fn test_initial_clamped_into_bounds() {
        let config = LambdaConfig { initial: 2.0, ..LambdaConfig::default() };
        assert_eq!(LambdaController::new(&config).value(), Lambda::from_millis(1300));
    }

    #[test]
    fn test_validate() {
        assert!(LambdaConfig::default().validate().is_ok());
        let inverted = LambdaConfig { min: 1.5, max: 1.1, ..LambdaConfig::default() };
        assert!(inverted.validate().is_err());
        let negative = LambdaConfig { bad_step_percent: -1.0, ..LambdaConfig::default() };
        assert!(negative.validate().is_err());
        let zero_min = LambdaConfig { min: 0.0, ..LambdaConfig::default() };
        assert!(zero_min.validate().is_err());
    }
}
