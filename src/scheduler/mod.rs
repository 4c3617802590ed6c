//! Scheduler engine for job execution.
//!
//! This module provides the trigger loop that fires registered jobs on the
//! bounded worker pool, the handle that controls it, and status aggregation.

mod engine;
mod handle;
pub mod status;
mod types;

pub use engine::{DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_TICK_INTERVAL, Scheduler};
pub use handle::SchedulerHandle;
pub use status::{StatusView, spawn_monitor};
pub use types::{JobSummary, SchedulerError, SchedulerState, ShutdownReport};
