//! Task execution: the bounded scheduled pool, manual task threads, the
//! execution record registries and the external command task.

mod command;
pub mod guard;
pub mod manual;
pub mod record;

pub use command::{CommandTask, CommandTaskBuilder};
pub use guard::{Claim, RunOutcome, TimeoutGuard};
pub use manual::{LaunchError, ManualTasks, StopOutcome};
pub use record::{ExecutionRecord, ExecutionStatus, ScheduledRegistry};

use std::any::Any;

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
