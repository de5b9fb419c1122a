use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Warehouse and data locations (can override CLI)
    pub db_dir: Option<String>,
    pub db_name: Option<String>,
    pub song_data: Option<String>,
    pub log_data: Option<String>,

    // Dashboard
    pub port: Option<u16>,
    pub logging_level: Option<String>,
    pub frontend_dir_path: Option<String>,

    pub scheduler: Option<SchedulerConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: Option<bool>,
    pub interval_secs: Option<u64>,
    pub retries: Option<u32>,
    pub retry_delay_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
