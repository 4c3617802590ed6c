//! External command task.
//!
//! [`CommandTask`] runs a program as a job or manual task. It is how a
//! deployment binds jobs to real work without linking business logic into the
//! scheduler.
//!
//! - `{key}` placeholders in arguments are replaced with the task argument of
//!   the same name (strings verbatim, other values as JSON), so a data file
//!   path can be passed as `--file {file_path}`.
//! - The child sees `CADENCE_TASK_NAME` and `CADENCE_RUN_KIND` in its
//!   environment.
//! - Each stdout line starting with `notify:` is forwarded to the notification
//!   bridge as a progress message; other lines are collected as output.
//! - When the stop signal is set the child is killed and the task returns
//!   [`TaskError::Stopped`].
//!
//! ```rust
//! use cadence::CommandTask;
//!
//! let task = CommandTask::builder("python3")
//!     .args(["-m", "worker", "--days", "{range_days}", "--file", "{file_path}"])
//!     .env("PYTHONUNBUFFERED", "1")
//!     .working_dir("/srv/worker")
//!     .build();
//! assert_eq!(task.program(), "python3");
//! ```

use serde_json::json;
use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::task::{Task, TaskArgs, TaskContext, TaskError, TaskOutput};

/// Stdout prefix marking a progress notification.
pub const NOTIFY_PREFIX: &str = "notify:";

/// How often a running child is checked for exit or stop.
const CHILD_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A task that executes an external command.
#[derive(Debug, Clone)]
pub struct CommandTask {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    description: Option<String>,
}

impl CommandTask {
    /// Create a new builder for a command task.
    pub fn builder(program: impl Into<String>) -> CommandTaskBuilder {
        CommandTaskBuilder::new(program)
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments as configured, before placeholder substitution.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&PathBuf> {
        self.working_dir.as_ref()
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Arguments with `{key}` placeholders replaced from `args`.
    pub fn render_args(&self, args: &TaskArgs) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                args.iter().fold(arg.clone(), |acc, (key, _)| {
                    let placeholder = format!("{{{key}}}");
                    if acc.contains(&placeholder) {
                        acc.replace(&placeholder, &args.text(key).unwrap_or_default())
                    } else {
                        acc
                    }
                })
            })
            .collect()
    }
}

impl Task for CommandTask {
    fn execute(&self, ctx: &TaskContext) -> Result<TaskOutput, TaskError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(ctx.args()))
            .envs(&self.env)
            .env("CADENCE_TASK_NAME", ctx.name())
            .env("CADENCE_RUN_KIND", ctx.kind().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = self.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            TaskError::ExecutionFailed(format!("failed to start '{}': {e}", self.program))
        })?;
        debug!(task = ctx.name(), program = %self.program, pid = child.id(), "command started");

        let stdout = child.stdout.take().map(|pipe| {
            let notifier = ctx.notifier().clone();
            thread::spawn(move || {
                let mut collected = String::new();
                for line in BufReader::new(pipe).lines().map_while(Result::ok) {
                    match line.strip_prefix(NOTIFY_PREFIX) {
                        Some(message) => {
                            notifier.notify(message.trim());
                        }
                        None => {
                            collected.push_str(&line);
                            collected.push('\n');
                        }
                    }
                }
                collected
            })
        });
        let stderr = child.stderr.take().map(|mut pipe| {
            thread::spawn(move || {
                let mut collected = String::new();
                let _ = pipe.read_to_string(&mut collected);
                collected
            })
        });

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if ctx.stop_signal().wait_timeout(CHILD_POLL_INTERVAL) {
                warn!(task = ctx.name(), program = %self.program, "stop requested, killing command");
                if let Err(e) = child.kill() {
                    warn!(task = ctx.name(), error = %e, "failed to kill command");
                }
                let _ = child.wait();
                return Err(TaskError::Stopped);
            }
        };

        let stdout = stdout
            .map(|reader| reader.join().unwrap_or_default())
            .unwrap_or_default();
        let stderr = stderr
            .map(|reader| reader.join().unwrap_or_default())
            .unwrap_or_default();

        if status.success() {
            Ok(json!({
                "exit_code": status.code(),
                "stdout": stdout,
            }))
        } else {
            Err(TaskError::CommandFailed {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            })
        }
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

/// Builder for creating `CommandTask` instances.
#[derive(Debug, Clone)]
pub struct CommandTaskBuilder {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    description: Option<String>,
}

impl CommandTaskBuilder {
    /// Create a new builder with the given program.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            description: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a single environment variable.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set the working directory.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Build the `CommandTask`.
    pub fn build(self) -> CommandTask {
        CommandTask {
            program: self.program,
            args: self.args,
            env: self.env,
            working_dir: self.working_dir,
            description: self.description,
        }
    }
}
