mod file_config;

pub use file_config::{FileConfig, SchedulerConfig};

use crate::etl::EtlSettings;
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_NAME: &str = "sparkifydb";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub db_name: Option<String>,
    pub song_data: Option<PathBuf>,
    pub log_data: Option<PathBuf>,
    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,
    pub scheduler_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    pub db_name: String,
    pub song_data: PathBuf,
    pub log_data: PathBuf,

    pub port: u16,
    pub logging_level: RequestsLoggingLevel,
    pub frontend_dir_path: Option<String>,

    pub scheduler: SchedulerSettings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub interval: Duration,
    /// Extra attempts after a failed run.
    pub retries: u32,
    pub retry_delay: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(3600),
            retries: 1,
            retry_delay: Duration::from_secs(300),
        }
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;
        if db_dir.exists() && !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let db_name = file
            .db_name
            .or_else(|| cli.db_name.clone())
            .unwrap_or_else(|| DEFAULT_DB_NAME.to_string());
        if db_name.is_empty() || db_name.contains(['/', '\\']) {
            bail!("Invalid database name: {:?}", db_name);
        }

        let song_data = file
            .song_data
            .map(PathBuf::from)
            .or_else(|| cli.song_data.clone())
            .unwrap_or_else(|| PathBuf::from("data/song_data"));
        let log_data = file
            .log_data
            .map(PathBuf::from)
            .or_else(|| cli.log_data.clone())
            .unwrap_or_else(|| PathBuf::from("data/log_data"));

        let port = file.port.unwrap_or(cli.port);
        let logging_level = file
            .logging_level
            .and_then(|s| parse_logging_level(&s))
            .unwrap_or_else(|| cli.logging_level.clone());
        let frontend_dir_path = file
            .frontend_dir_path
            .or_else(|| cli.frontend_dir_path.clone());

        let defaults = SchedulerSettings::default();
        let sched_file = file.scheduler.unwrap_or_default();
        let scheduler = SchedulerSettings {
            enabled: sched_file.enabled.unwrap_or(cli.scheduler_enabled),
            interval: sched_file
                .interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.interval),
            retries: sched_file.retries.unwrap_or(defaults.retries),
            retry_delay: sched_file
                .retry_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry_delay),
        };
        if scheduler.interval.is_zero() {
            bail!("scheduler.interval_secs must be greater than 0");
        }

        Ok(Self {
            db_dir,
            db_name,
            song_data,
            log_data,
            port,
            logging_level,
            frontend_dir_path,
            scheduler,
        })
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir.join(format!("{}.db", self.db_name))
    }

    pub fn etl_settings(&self) -> EtlSettings {
        EtlSettings {
            db_path: self.db_path(),
            song_data: self.song_data.clone(),
            log_data: self.log_data.clone(),
        }
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
