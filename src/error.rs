//! Error types for mpsched.

use std::io;

use thiserror::Error;

/// Result type alias for mpsched operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mpsched.
#[derive(Error, Debug)]
pub enum Error {
    // Scheduling errors
    #[error("scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),

    // Link metrics errors
    #[error("link metrics error: {0}")]
    Metrics(#[from] MetricsError),

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // General errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Outcomes of a scheduling call that did not produce the preferred path.
///
/// Only [`SchedulingError::NoAvailablePath`] ever reaches the caller of
/// `get_subflow`; the other two are raised and recovered inside the
/// scheduler by falling back to the minimum-RTT path.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingError {
    #[error("no available path (including backups)")]
    NoAvailablePath,

    #[error("host best-path recommendation unavailable")]
    RecommendationUnavailable,

    #[error("link classification metrics unavailable")]
    MetricsUnavailable,
}

impl SchedulingError {
    /// Whether the caller should simply retry on the next send opportunity.
    pub fn is_recoverable(self) -> bool {
        true
    }

    /// Whether the error should tear down the connection. Never does.
    pub fn is_fatal(self) -> bool {
        false
    }

    /// Whether the error is handled inside the scheduler and never surfaced.
    pub fn is_internal(self) -> bool {
        matches!(self, Self::RecommendationUnavailable | Self::MetricsUnavailable)
    }
}

/// Link metrics collection errors.
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("failed to run `{command}`: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("unparseable bitrate sample: {0}")]
    Unparseable(String),

    #[error("no bitrate data for {0}")]
    NoData(String),
}

impl Error {
    /// Check if error is recoverable (should retry).
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Scheduling(e) => e.is_recoverable(),
            Error::Metrics(_) | Error::Io(_) => true,
            _ => false,
        }
    }
}
