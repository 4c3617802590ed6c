//! cadence - a cron-triggered job scheduler with manual task control.
//!
//! Usage:
//!   cadence run [--config cadence.yaml]        Run the scheduler and HTTP API
//!   cadence validate [--config cadence.yaml]   Validate the configuration
//!   cadence list [--config cadence.yaml]       List configured jobs
//!   cadence trigger <JOB_ID>                   Run one job once and exit

use cadence::config::{Settings, YamlLoader, build_scheduler};
use cadence::notify::LogSink;
use cadence::scheduler::{SchedulerHandle, spawn_monitor};
use cadence::{JobId, api};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// cadence - a cron-triggered job scheduler
#[derive(Parser)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, global = true, default_value = "cadence.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduler
    Run {
        /// Scheduler tick interval in seconds
        #[arg(long)]
        tick_interval: Option<u64>,

        /// Number of scheduled jobs that may run at once
        #[arg(short = 'j', long)]
        pool_size: Option<usize>,

        /// HTTP API port
        #[arg(short, long)]
        port: Option<u16>,

        /// Do not start the HTTP API
        #[arg(long)]
        no_api: bool,
    },

    /// Validate the configuration without running
    Validate,

    /// List configured jobs
    List,

    /// Run a single job once and wait for it to finish
    Trigger {
        /// Job ID to trigger
        #[arg(value_name = "JOB_ID")]
        job_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            tick_interval,
            pool_size,
            port,
            no_api,
        } => {
            let mut settings = YamlLoader::load_settings(&cli.config)?;
            if let Some(secs) = tick_interval {
                settings.tick_interval_secs = secs;
            }
            if let Some(size) = pool_size {
                settings.worker_pool_size = size;
            }
            if let Some(port) = port {
                settings.api.port = port;
            }
            if no_api {
                settings.api.enabled = false;
            }
            YamlLoader::validate_settings(&settings)?;
            run_scheduler(settings).await?;
        }
        Commands::Validate => {
            validate_config(&cli.config)?;
        }
        Commands::List => {
            list_jobs(&cli.config)?;
        }
        Commands::Trigger { job_id } => {
            trigger_job(&cli.config, job_id).await?;
        }
    }

    Ok(())
}

/// Run the scheduler, status monitor and API until Ctrl+C.
async fn run_scheduler(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let scheduler = build_scheduler(&settings)?;
    let notifier = scheduler.notifier().clone();
    let _delivery = notifier.attach(Arc::new(LogSink))?;

    info!(
        jobs = settings.jobs.len(),
        tick_interval_secs = settings.tick_interval_secs,
        worker_pool_size = settings.worker_pool_size,
        "Starting scheduler"
    );
    for job in &settings.jobs {
        let enabled_info = if job.enabled { "" } else { " (disabled)" };
        info!("  - {}: {}{}", job.id, job.schedule.cron(), enabled_info);
    }

    let (handle, scheduler_task) = scheduler.start().await;
    let monitor = spawn_monitor(handle.clone(), settings.monitor_interval());

    let server = if settings.api.enabled {
        let addr = settings.api.socket_addr()?;
        Some(api::start_server(addr, handle.clone()).await?)
    } else {
        None
    };

    info!("Press Ctrl+C to stop");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl+C, shutting down");
            }
            info!("Shutting down...");
            shutdown(&handle, settings.shutdown_timeout()).await;
        }
        _ = scheduler_task => {
            info!("Scheduler stopped");
        }
    }

    monitor.abort();
    if let Some(server) = server {
        server.abort();
    }
    info!("Goodbye!");
    Ok(())
}

/// Shut down, bounding the whole sequence by `timeout` plus a small margin.
async fn shutdown(handle: &SchedulerHandle, timeout: Duration) {
    let limit = timeout.saturating_add(Duration::from_secs(5));
    match tokio::time::timeout(limit, handle.shutdown()).await {
        Ok(Ok(report)) => {
            for (name, outcome) in &report.manual {
                if !outcome.is_success() {
                    warn!(task = %name, "Manual task did not stop");
                }
            }
            if !report.abandoned.is_empty() {
                warn!(jobs = ?report.abandoned, "Abandoned scheduled runs");
            }
        }
        Ok(Err(e)) => error!(error = %e, "Shutdown failed"),
        Err(_) => error!(timeout_secs = limit.as_secs(), "Shutdown timed out"),
    }
}

/// Validate the configuration without running.
fn validate_config(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating configuration: {}", path.display());

    match YamlLoader::load_settings(path) {
        Ok(settings) => {
            info!("All {} job(s) are valid:", settings.jobs.len());
            for job in &settings.jobs {
                info!("  - {}: OK", job.id);
            }
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// List configured jobs.
fn list_jobs(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let settings = YamlLoader::load_settings(path)?;

    if settings.jobs.is_empty() {
        println!("No jobs configured in {}", path.display());
        return Ok(());
    }

    println!("Jobs in {}:", path.display());
    println!();

    let now = chrono::Utc::now();
    for job in &settings.jobs {
        let trigger = job.schedule.trigger()?;
        println!("ID: {}", job.id);
        if let Some(description) = &job.description {
            println!("  Description: {}", description);
        }
        println!("  Enabled: {}", job.enabled);
        println!("  Schedule: {}", trigger);
        if job.enabled {
            if let Some(next) = trigger.next_after(now) {
                println!("  Next run: {}", next);
            }
        }
        println!(
            "  Timeout: {}s",
            job.timeout_secs.unwrap_or(settings.default_timeout_secs)
        );
        println!(
            "  Command: {} {}",
            job.command.program,
            job.command.args.join(" ")
        );
        println!();
    }

    Ok(())
}

/// Trigger a specific job and wait for it to complete.
async fn trigger_job(path: &Path, job_id: String) -> Result<(), Box<dyn std::error::Error>> {
    let settings = YamlLoader::load_settings(path)?;

    let Some(job) = settings.job(&job_id) else {
        error!("Job '{}' not found", job_id);
        error!(
            "Available jobs: {}",
            settings
                .jobs
                .iter()
                .map(|j| j.id.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        return Err(format!("Job '{}' not found", job_id).into());
    };
    let wait_limit = job
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(settings.default_timeout())
        .saturating_add(Duration::from_secs(5));

    let scheduler = build_scheduler(&settings)?;
    let _delivery = scheduler.notifier().attach(Arc::new(LogSink))?;
    let (handle, _scheduler_task) = scheduler.start().await;
    handle.pause().await?;

    info!("Triggering job '{}'...", job_id);
    let run_id = handle.trigger(job_id.as_str()).await?;
    info!("Job triggered (run: {})", run_id);

    let id = JobId::new(job_id);
    let finished = tokio::time::timeout(wait_limit, async {
        while handle.scheduled_record(&id).is_some() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    })
    .await;
    if finished.is_err() {
        warn!("Job did not finish within {}s", wait_limit.as_secs());
    }

    shutdown(&handle, settings.shutdown_timeout()).await;
    Ok(())
}
