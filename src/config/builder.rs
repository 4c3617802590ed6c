//! Job and scheduler builders from YAML configuration.
//!
//! This module converts `JobConfig` into runnable `Job` instances backed by
//! `CommandTask`, and `Settings` into a configured `Scheduler`.

use std::sync::Arc;
use std::time::Duration;

use super::error::ConfigError;
use super::yaml::{JobConfig, Settings};
use crate::core::job::Job;
use crate::execution::CommandTask;
use crate::notify::Notifier;
use crate::scheduler::Scheduler;

/// Builder for creating Jobs from YAML configuration.
pub struct JobConfigBuilder;

impl JobConfigBuilder {
    /// Build a Job from a JobConfig, using `default_timeout` when the job sets none.
    pub fn build(config: &JobConfig, default_timeout: Duration) -> Result<Job, ConfigError> {
        let trigger = config.schedule.trigger().map_err(|e| {
            ConfigError::InvalidConfig(format!("job '{}': invalid schedule: {}", config.id, e))
        })?;

        let mut builder = CommandTask::builder(&config.command.program)
            .args(&config.command.args)
            .envs(&config.command.env);
        if let Some(dir) = &config.command.working_dir {
            builder = builder.working_dir(dir);
        }
        if let Some(description) = &config.description {
            builder = builder.description(description);
        }

        let timeout = config
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(default_timeout);

        let mut job = Job::new(config.id.as_str(), trigger, Arc::new(builder.build()))
            .with_args(config.args.clone())
            .with_timeout(timeout)
            .with_enabled(config.enabled);
        if let Some(description) = &config.description {
            job = job.with_description(description);
        }
        Ok(job)
    }
}

/// Build a scheduler from settings with every configured job registered.
///
/// The notifier is created from the configured capacities and left detached;
/// callers attach a sink once the runtime is up.
pub fn build_scheduler(settings: &Settings) -> Result<Scheduler, ConfigError> {
    let notifier = Notifier::with_capacity(
        settings.notifications.queue_capacity,
        settings.notifications.pending_capacity,
    );

    let mut scheduler = Scheduler::new()
        .with_notifier(notifier)
        .with_tick_interval(settings.tick_interval())
        .with_pool_size(settings.worker_pool_size)
        .with_stop_grace(settings.stop_grace())
        .with_shutdown_timeout(settings.shutdown_timeout());

    for job_config in &settings.jobs {
        let job = JobConfigBuilder::build(job_config, settings.default_timeout())?;
        tracing::debug!(job_id = %job.id(), trigger = %job.trigger(), "Loaded job from config");
        scheduler.register(job);
    }
    Ok(scheduler)
}
