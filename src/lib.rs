//! # mpsched
//!
//! Multi-path subflow scheduler with head-of-line blocking prevention.
//!
//! On every opportunity to transmit, the host transport stack asks the
//! scheduler which path (subflow) should carry the next segment. The
//! scheduler prefers the lowest-RTT path, but lets a strategy propose a
//! different *candidate* (the host's own best-path hint, or the path on the
//! link with the higher radio bitrate). A candidate slower than the fastest
//! path is only used if the data committed to it would not starve the fast
//! path of send window while it drains.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Host transport stack (read-only)               │
//! │   PathSnapshot × N · send window · retransmissions · hint       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Availability Filter ──► Path Selector (min RTT, backup last)    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Candidate: min_rtt │ blest (host hint) │ xlayer (link bitrate) │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  HoL Decision: Lambda Controller · Linger · Deliverable bytes   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  Link Metrics Collector (tokio task) ──► LinkMetricsCell        │
//! └─────────────────────────────────────────────────────────────────┘

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow stylistic lints that don't affect correctness
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]              // ASCII diagrams in docs
#![allow(clippy::unreadable_literal)]        // Bitrates in bits/s
#![allow(clippy::cast_possible_truncation)]  // Bitrate parsing from f64
#![allow(clippy::cast_sign_loss)]            // Clamped before casting
#![allow(clippy::cast_precision_loss)]       // Acceptable for stats
#![allow(clippy::cast_possible_wrap)]        // Interface flags
#![allow(clippy::similar_names)]             // wifi/cell, min/max pairs
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::option_if_let_else)]        // More readable in context
#![allow(clippy::use_self)]
#![allow(clippy::redundant_pub_crate)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::future_not_send)]
#![allow(clippy::struct_excessive_bools)]    // Availability predicates are bools
#![allow(clippy::match_same_arms)]
#![allow(clippy::return_self_not_must_use)]

pub mod config;
pub mod error;
pub mod metrics;
pub mod multipath;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result, SchedulingError};
    pub use crate::metrics::{LinkMetrics, LinkMetricsCell, LinkMetricsCollector, SchedulerStats};
    pub use crate::multipath::{
        AddressClassifier, ConnectionScheduler, ConnectionSnapshot, HostConnection, PathSnapshot,
        Scheduler, SchedulerConfig, SchedulerRegistry, SchedulingStrategy, Selection,
    };
    pub use crate::types::*;
}
