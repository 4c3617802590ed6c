//! Task trait, arguments, context and error types.
//!
//! A task is the opaque unit of work a job or manual launch runs. It executes
//! synchronously on a worker thread, receives a [`TaskContext`] carrying its
//! arguments, its [`StopSignal`] and a [`Notifier`] for progress messages, and
//! is expected to poll the stop signal at safe points.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::stop::StopSignal;
use crate::notify::{Dispatch, Notifier};

/// Value a task returns on success.
pub type TaskOutput = Value;

/// Errors that can occur during task execution.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task execution failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// A task argument is missing or has the wrong shape.
    #[error("invalid argument '{key}': {reason}")]
    InvalidArgument { key: String, reason: String },

    /// External command exited unsuccessfully.
    #[error("command exited with code {code:?}: {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    /// The task observed its stop signal and returned early.
    #[error("stopped on request")]
    Stopped,

    /// The task function panicked.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl From<std::io::Error> for TaskError {
    fn from(err: std::io::Error) -> Self {
        TaskError::Other(Box::new(err))
    }
}

/// How an execution was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    /// Fired by the trigger loop or an explicit trigger call.
    Scheduled,
    /// Launched by name through the manual launcher.
    Manual,
}

impl fmt::Display for ExecutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionKind::Scheduled => f.write_str("scheduled"),
            ExecutionKind::Manual => f.write_str("manual"),
        }
    }
}

/// Fixed keyword arguments handed to a task function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskArgs(Map<String, Value>);

impl TaskArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Raw value for `key`.
    pub fn raw(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Deserialize a required argument.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, TaskError> {
        let value = self.0.get(key).ok_or_else(|| TaskError::InvalidArgument {
            key: key.to_string(),
            reason: "missing".to_string(),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| TaskError::InvalidArgument {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    /// Deserialize an optional argument, falling back to `default` when absent.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> Result<T, TaskError> {
        if self.0.contains_key(key) {
            self.get(key)
        } else {
            Ok(default)
        }
    }

    /// Argument rendered as plain text: strings unquoted, other values as JSON.
    pub fn text(&self, key: &str) -> Option<String> {
        self.0.get(key).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Overlay `other` on top of these arguments.
    pub fn merged(&self, other: &TaskArgs) -> TaskArgs {
        let mut merged = self.0.clone();
        for (key, value) in &other.0 {
            merged.insert(key.clone(), value.clone());
        }
        TaskArgs(merged)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

impl From<Map<String, Value>> for TaskArgs {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Everything a task function can see while it runs.
#[derive(Debug, Clone)]
pub struct TaskContext {
    name: String,
    kind: ExecutionKind,
    args: TaskArgs,
    stop: StopSignal,
    notifier: Notifier,
}

impl TaskContext {
    pub fn new(
        name: impl Into<String>,
        kind: ExecutionKind,
        args: TaskArgs,
        stop: StopSignal,
        notifier: Notifier,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            args,
            stop,
            notifier,
        }
    }

    /// Job id or manual task name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ExecutionKind {
        self.kind
    }

    pub fn args(&self) -> &TaskArgs {
        &self.args
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Whether a stop has been requested for this execution.
    pub fn should_stop(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Return `Err(TaskError::Stopped)` once a stop has been requested.
    pub fn check_stop(&self) -> Result<(), TaskError> {
        if self.stop.is_stopped() {
            Err(TaskError::Stopped)
        } else {
            Ok(())
        }
    }

    /// Send a progress message to the notification bridge.
    pub fn notify(&self, message: impl Into<String>) -> Dispatch {
        self.notifier.notify(message)
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}

/// The unit of work a job or manual launch runs.
///
/// Implementations run on a worker thread and may block. Long-running work
/// should poll [`TaskContext::check_stop`] or sleep with
/// [`StopSignal::wait_timeout`] so it can be stopped cooperatively.
///
/// # Example
///
/// ```ignore
/// use cadence::{Task, TaskContext, TaskError, TaskOutput};
///
/// struct Export;
///
/// impl Task for Export {
///     fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
///         let days: u32 = ctx.args().get("range_days")?;
///         for day in 0..days {
///             ctx.check_stop()?;
///             ctx.notify(format!("exported day {day}"));
///         }
///         Ok(serde_json::json!({ "days": days }))
///     }
/// }
/// ```
pub trait Task: Send + Sync {
    /// Run the task to completion.
    fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError>;

    /// Optional description for display/logging purposes.
    fn description(&self) -> Option<&str> {
        None
    }
}

impl<F> Task for F
where
    F: Fn(&TaskContext) -> Result<TaskOutput, TaskError> + Send + Sync,
{
    fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        self(ctx)
    }
}

/// Wrap a closure into a shareable task.
pub fn from_fn<F>(f: F) -> Arc<dyn Task>
where
    F: Fn(&TaskContext) -> Result<TaskOutput, TaskError> + Send + Sync + 'static,
{
    Arc::new(f)
}
