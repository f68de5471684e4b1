//! Configuration file support for Medilog.
//!
//! Configuration is loaded from `$XDG_CONFIG_HOME/medilog/config.toml`.

use crate::adherence::{DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};
use crate::reminder::MAX_HORIZON_HOURS;
use crate::schedule::{DEFAULT_MATERIALIZE_DAYS, MAX_MATERIALIZE_DAYS};
use crate::{Error, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,

    #[serde(default)]
    pub progress: ProgressConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub reminders: ReminderConfig,

    #[serde(default)]
    pub time: TimeConfig,
}

/// Which data source variant to open at startup
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// In-memory fixture, nothing is persisted
    Mock,
    /// Files under `data_dir`
    #[default]
    Local,
}

impl std::str::FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mock" => Ok(Backend::Mock),
            "local" => Ok(Backend::Local),
            other => Err(Error::Config(format!("unknown backend {:?}", other))),
        }
    }
}

/// Data storage configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub backend: Backend,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backend: Backend::default(),
        }
    }
}

/// Adherence report parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
        }
    }
}

/// Dose generation parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_materialize_days")]
    pub materialize_days: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            materialize_days: default_materialize_days(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReminderConfig {
    #[serde(default = "default_horizon_hours")]
    pub horizon_hours: u32,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            horizon_hours: default_horizon_hours(),
        }
    }
}

/// Time zone used to decide calendar days
///
/// Without an offset the system local zone is used.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TimeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
}

impl TimeConfig {
    /// The configured fixed offset, if any
    pub fn fixed_offset(&self) -> Result<Option<FixedOffset>> {
        match self.utc_offset_minutes {
            None => Ok(None),
            Some(minutes) => minutes
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .map(Some)
                .ok_or_else(|| {
                    Error::Config(format!("utc_offset_minutes out of range: {}", minutes))
                }),
        }
    }
}

// Default value functions
fn home_dir_or_current() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_data_dir() -> PathBuf {
    let base =
        dirs::data_local_dir().unwrap_or_else(|| home_dir_or_current().join(".local/share"));
    base.join("medilog")
}

fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}

fn default_materialize_days() -> u32 {
    DEFAULT_MATERIALIZE_DAYS
}

fn default_horizon_hours() -> u32 {
    24
}

fn check_range(key: &str, value: u32, max: u32) -> Result<()> {
    if !(1..=max).contains(&value) {
        return Err(Error::Config(format!(
            "{} must be between 1 and {}, got {}",
            key, max, value
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from the standard config path
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();
        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Reject values no command can work with
    pub fn validate(&self) -> Result<()> {
        check_range(
            "progress.window_days",
            self.progress.window_days,
            MAX_WINDOW_DAYS,
        )?;
        check_range(
            "schedule.materialize_days",
            self.schedule.materialize_days,
            MAX_MATERIALIZE_DAYS,
        )?;
        check_range(
            "reminders.horizon_hours",
            self.reminders.horizon_hours,
            MAX_HORIZON_HOURS,
        )?;
        self.time.fixed_offset()?;
        Ok(())
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        let base = dirs::config_dir().unwrap_or_else(|| home_dir_or_current().join(".config"));
        base.join("medilog").join("config.toml")
    }

    /// Save the current configuration to the default path
    pub fn save(&self) -> Result<()> {
        let config_path = Self::default_config_path();
        self.save_to(&config_path)
    }

    /// Save the current configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }
}
