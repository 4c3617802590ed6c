//! YAML configuration parsing.
//!
//! Parses scheduler settings and job definitions from `cadence.yaml`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::ConfigError;
use crate::core::task::TaskArgs;
use crate::core::trigger::{Trigger, TriggerError};
use crate::notify::{DEFAULT_PENDING_CAPACITY, DEFAULT_QUEUE_CAPACITY};

/// Largest accepted `stop_grace_secs` and `shutdown_timeout_secs` (one day).
pub const MAX_WAIT_SECS: u64 = 24 * 60 * 60;

/// Top-level configuration (cadence.yaml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Seconds between trigger loop ticks.
    pub tick_interval_secs: u64,
    /// Number of scheduled jobs that may run at once.
    pub worker_pool_size: usize,
    /// Timeout for jobs that do not set their own.
    pub default_timeout_secs: u64,
    /// How long a manual stop waits before giving up.
    pub stop_grace_secs: u64,
    /// Upper bound on the whole shutdown sequence.
    pub shutdown_timeout_secs: u64,
    /// Period of the status monitor.
    pub monitor_interval_secs: u64,
    pub notifications: NotificationsConfig,
    pub api: ApiSettings,
    pub jobs: Vec<JobConfig>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tick_interval_secs: 1,
            worker_pool_size: 5,
            default_timeout_secs: 300,
            stop_grace_secs: 30,
            shutdown_timeout_secs: 60,
            monitor_interval_secs: 60,
            notifications: NotificationsConfig::default(),
            api: ApiSettings::default(),
            jobs: Vec::new(),
        }
    }
}

impl Settings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    /// Look up a job definition by id.
    pub fn job(&self, id: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|job| job.id == id)
    }
}

/// Notification bridge capacities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    /// Bounded queue between producers and the delivery task.
    pub queue_capacity: usize,
    /// Messages kept while no transport is attached.
    pub pending_capacity: usize,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            pending_capacity: DEFAULT_PENDING_CAPACITY,
        }
    }
}

/// HTTP API listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub host: String,
    pub port: u16,
    pub enabled: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8565,
            enabled: true,
        }
    }
}

impl ApiSettings {
    /// Address the API binds to.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                ConfigError::InvalidConfig(format!(
                    "invalid api address '{}:{}': {}",
                    self.host, self.port, e
                ))
            })
    }
}

/// One job definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub id: String,
    pub schedule: ScheduleConfig,
    /// Per-run timeout; falls back to `default_timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: Option<String>,
    pub command: CommandConfig,
    /// Fixed arguments, also substituted into `{key}` placeholders.
    #[serde(default)]
    pub args: TaskArgs,
}

fn default_true() -> bool {
    true
}

/// Schedule configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleConfig {
    /// Simple expression string, evaluated in UTC.
    Simple(String),
    /// Detailed schedule with timezone.
    Detailed {
        /// Cron expression or shortcut.
        cron: String,
        /// Timezone name.
        #[serde(default)]
        timezone: Option<String>,
    },
}

impl ScheduleConfig {
    /// Get the expression.
    pub fn cron(&self) -> &str {
        match self {
            ScheduleConfig::Simple(cron) => cron,
            ScheduleConfig::Detailed { cron, .. } => cron,
        }
    }

    /// Get the timezone if specified.
    pub fn timezone(&self) -> Option<&str> {
        match self {
            ScheduleConfig::Simple(_) => None,
            ScheduleConfig::Detailed { timezone, .. } => timezone.as_deref(),
        }
    }

    /// Parse into a trigger.
    pub fn trigger(&self) -> Result<Trigger, TriggerError> {
        match self.timezone() {
            Some(tz) => Trigger::with_timezone(self.cron(), tz),
            None => Trigger::parse(self.cron()),
        }
    }
}

/// External command run by a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load and validate settings from a file.
    pub fn load_settings(path: impl AsRef<Path>) -> Result<Settings, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;
        let settings: Settings =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::YamlFileError {
                path: path.to_path_buf(),
                source,
            })?;
        Self::validate_settings(&settings)?;
        Ok(settings)
    }

    /// Parse and validate settings from a YAML string.
    pub fn parse_settings(yaml: &str) -> Result<Settings, ConfigError> {
        let settings: Settings = serde_yaml::from_str(yaml)?;
        Self::validate_settings(&settings)?;
        Ok(settings)
    }

    /// Validate settings and every job definition.
    pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
        if settings.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "tick_interval_secs cannot be zero".into(),
            ));
        }
        if settings.worker_pool_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "worker_pool_size cannot be zero".into(),
            ));
        }
        if settings.default_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "default_timeout_secs cannot be zero".into(),
            ));
        }
        for (field, secs) in [
            ("stop_grace_secs", settings.stop_grace_secs),
            ("shutdown_timeout_secs", settings.shutdown_timeout_secs),
        ] {
            if secs > MAX_WAIT_SECS {
                return Err(ConfigError::InvalidConfig(format!(
                    "{field} cannot exceed {MAX_WAIT_SECS}"
                )));
            }
        }
        if settings.notifications.queue_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "notifications.queue_capacity cannot be zero".into(),
            ));
        }
        if settings.api.enabled {
            settings.api.socket_addr()?;
        }

        let mut ids = HashSet::new();
        for job in &settings.jobs {
            Self::validate_job_config(job)?;
            if !ids.insert(job.id.as_str()) {
                return Err(ConfigError::InvalidConfig(format!(
                    "duplicate job id: {}",
                    job.id
                )));
            }
        }
        Ok(())
    }

    /// Validate a job configuration.
    fn validate_job_config(config: &JobConfig) -> Result<(), ConfigError> {
        if config.id.trim().is_empty() {
            return Err(ConfigError::MissingField("id".into()));
        }
        if config.command.program.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "jobs.{}.command.program",
                config.id
            )));
        }
        if config.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidConfig(format!(
                "job '{}': timeout_secs cannot be zero",
                config.id
            )));
        }
        config.schedule.trigger().map_err(|e| {
            ConfigError::InvalidConfig(format!("job '{}': invalid schedule: {}", config.id, e))
        })?;
        Ok(())
    }
}
