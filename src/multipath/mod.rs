//! Multi-path subflow scheduling with head-of-line blocking prevention.
//!
//! This module implements the scheduling core:
//! - Read-only path state consumed from the host stack
//! - Availability filtering and minimum-RTT selection
//! - Throughput and linger-time estimation
//! - Adaptive lambda control
//! - Cross-layer (link bitrate) candidate selection
//! - The scheduler itself and its per-connection lifecycle

pub mod availability;
pub mod estimator;
pub mod lambda;
mod path;
pub mod scheduler;
pub mod selector;
pub mod xlayer;

pub use availability::{is_available, Ineligibility};
pub use estimator::{estimate_deliverable_bytes, estimate_linger_time, RttBounds};
pub use lambda::{Lambda, LambdaConfig, LambdaController, LambdaUpdate};
pub use path::{ConnectionSnapshot, HostConnection, PathSnapshot, DEFAULT_MSS, INITIAL_CWND};
pub use scheduler::{
    ConnectionScheduler, ControlSnapshot, HolCheck, Outcome, Scheduler, SchedulerConfig,
    SchedulerRegistry, SchedulingStrategy, Selection,
};
pub use selector::select_best;
pub use xlayer::{AddressClassifier, LinkClassifier};
