//! cadence - a cron-triggered job scheduler with manual task control.
//!
//! Jobs bind a [`Task`] to a cron [`Trigger`]. The scheduler fires due jobs on
//! a bounded worker pool, enforces one live run per job id and a per-run
//! timeout, and lets operators launch, inspect and stop named manual tasks.
//! Progress messages go through a [`Notifier`] that buffers until a
//! [`NotificationSink`] is attached.
//!
//! # Example
//!
//! ```no_run
//! use cadence::{CommandTask, Job, Scheduler, TaskArgs, Trigger};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let task = CommandTask::builder("./refresh.sh")
//!     .arg("{file_path}")
//!     .build();
//! let job = Job::new("main_task", Trigger::parse("*/5 * * * *")?, Arc::new(task))
//!     .with_args(TaskArgs::new().with("file_path", "/var/lib/data.json"));
//!
//! let mut scheduler = Scheduler::new().with_pool_size(5);
//! scheduler.register(job);
//! let (handle, _loop) = scheduler.start().await;
//!
//! let view = handle.snapshot().await;
//! println!("{} job(s) registered", view.job_count);
//!
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod core;
pub mod execution;
pub mod notify;
pub mod scheduler;

pub use config::{ConfigError, JobConfig, ScheduleConfig, Settings, YamlLoader, build_scheduler};
pub use core::job::{DEFAULT_JOB_TIMEOUT, Job};
pub use core::stop::StopSignal;
pub use core::task::{
    ExecutionKind, Task, TaskArgs, TaskContext, TaskError, TaskOutput, from_fn,
};
pub use core::trigger::{Trigger, TriggerError};
pub use core::types::{JobId, RunId};
pub use execution::{
    CommandTask, ExecutionRecord, ExecutionStatus, LaunchError, RunOutcome, StopOutcome,
    TimeoutGuard,
};
pub use notify::{Dispatch, LogSink, NotificationSink, Notifier};
pub use scheduler::{
    JobSummary, Scheduler, SchedulerError, SchedulerHandle, SchedulerState, ShutdownReport,
    StatusView,
};
