//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for scheduler settings and
//! the command jobs registered at startup.

mod builder;
mod error;
mod yaml;

pub use builder::{JobConfigBuilder, build_scheduler};
pub use error::ConfigError;
pub use yaml::{
    ApiSettings, CommandConfig, JobConfig, NotificationsConfig, ScheduleConfig, Settings,
    YamlLoader,
};
