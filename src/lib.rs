//! hchk - a minute-by-minute HTTP healthcheck service
//!
//! The service probes one URL shortly after every minute boundary while
//! staying responsive to pause, continue and stop requests from its host.

pub mod error;
pub mod eventlog;
pub mod host;
pub mod probe;
pub mod schedule;
pub mod service;
pub mod unit;

pub use error::{HchkError, Result};
pub use service::{ControlCommand, HealthService, LoopStats, RunState, StatusReport};
