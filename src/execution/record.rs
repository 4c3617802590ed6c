//! Execution records and the scheduled-run registry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::core::lock;
use crate::core::stop::StopSignal;
use crate::core::task::{ExecutionKind, TaskArgs, TaskOutput};
use crate::core::types::{JobId, RunId};

/// Lifecycle state of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Task function is running.
    Running,
    /// A stop was requested and the task has not returned yet.
    Stopping,
    /// Task returned a value.
    Completed,
    /// Task returned an error or panicked.
    Failed,
    /// Task honoured its stop signal.
    Stopped,
    /// Stop grace elapsed while the thread was still alive.
    Unresponsive,
}

impl ExecutionStatus {
    /// Whether the task function has returned.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Stopped
        )
    }
}

/// Fixed-shape record of one scheduled or manual execution.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub name: String,
    pub run_id: RunId,
    pub kind: ExecutionKind,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Wall-clock seconds from start to completion.
    pub execution_time: Option<f64>,
    pub result: Option<TaskOutput>,
    pub error: Option<String>,
    pub args: TaskArgs,
}

impl ExecutionRecord {
    /// New record in the `Running` state.
    pub fn start(name: impl Into<String>, kind: ExecutionKind, args: TaskArgs) -> Self {
        Self {
            name: name.into(),
            run_id: RunId::new(),
            kind,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            execution_time: None,
            result: None,
            error: None,
            args,
        }
    }

    pub fn mark_completed(&mut self, result: TaskOutput, elapsed: Duration) {
        self.finish(ExecutionStatus::Completed, elapsed);
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, error: impl Into<String>, elapsed: Duration) {
        self.finish(ExecutionStatus::Failed, elapsed);
        self.error = Some(error.into());
    }

    pub fn mark_stopped(&mut self, elapsed: Duration) {
        self.finish(ExecutionStatus::Stopped, elapsed);
    }

    pub fn mark_stopping(&mut self) {
        if !self.status.is_terminal() {
            self.status = ExecutionStatus::Stopping;
        }
    }

    pub fn mark_unresponsive(&mut self) {
        if !self.status.is_terminal() {
            self.status = ExecutionStatus::Unresponsive;
        }
    }

    fn finish(&mut self, status: ExecutionStatus, elapsed: Duration) {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.execution_time = Some(elapsed.as_secs_f64());
    }
}

#[derive(Debug)]
struct ScheduledEntry {
    record: ExecutionRecord,
    stop: StopSignal,
}

/// Registry of scheduled runs currently tracked, at most one per job id.
#[derive(Debug, Default)]
pub struct ScheduledRegistry {
    entries: Mutex<HashMap<JobId, ScheduledEntry>>,
}

impl ScheduledRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a `Running` record for `job_id` unless one is already tracked.
    ///
    /// Returns the new run id and its stop signal, or `None` when the job is
    /// already running.
    pub fn claim(&self, job_id: &JobId, args: &TaskArgs) -> Option<(RunId, StopSignal)> {
        let mut entries = lock(&self.entries);
        if entries.contains_key(job_id) {
            return None;
        }
        let record = ExecutionRecord::start(job_id.as_str(), ExecutionKind::Scheduled, args.clone());
        let run_id = record.run_id;
        let stop = StopSignal::new(job_id.as_str());
        entries.insert(
            job_id.clone(),
            ScheduledEntry {
                record,
                stop: stop.clone(),
            },
        );
        Some((run_id, stop))
    }

    /// Remove the record for `job_id` if it still belongs to `run_id`.
    pub fn release(&self, job_id: &JobId, run_id: RunId) -> Option<ExecutionRecord> {
        let mut entries = lock(&self.entries);
        match entries.get(job_id) {
            Some(entry) if entry.record.run_id == run_id => {
                entries.remove(job_id).map(|entry| entry.record)
            }
            _ => None,
        }
    }

    /// Copy of the record tracked for `job_id`.
    pub fn get(&self, job_id: &JobId) -> Option<ExecutionRecord> {
        lock(&self.entries).get(job_id).map(|entry| entry.record.clone())
    }

    pub fn contains(&self, job_id: &JobId) -> bool {
        lock(&self.entries).contains_key(job_id)
    }

    /// Tracked job ids, sorted.
    pub fn running_ids(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = lock(&self.entries).keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Remove every record, returning each job id with its stop signal.
    pub fn drain(&self) -> Vec<(JobId, StopSignal)> {
        let mut drained: Vec<(JobId, StopSignal)> = lock(&self.entries)
            .drain()
            .map(|(id, entry)| (id, entry.stop))
            .collect();
        drained.sort_by(|a, b| a.0.cmp(&b.0));
        drained
    }
}
