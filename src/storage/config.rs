//! Configuration handling for Schedule Master
//!
//! Scheduling settings are stored in `.sm/config.toml` (workspace default)
//! and optionally `.sm/projects/<id>/settings.toml` (per-project override).
//! User preferences live in the platform config directory
//! (`~/.config/schedule-master/config.toml` on Linux).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{WeekdaySet, WorkingCalendar};

/// Name of the workspace directory
pub const WORKSPACE_DIR: &str = ".sm";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),
}

/// `HH:MM` wall-clock time
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub const FORMAT: &str = "%H:%M";

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(raw.trim(), FORMAT)
            .map_err(|_| serde::de::Error::custom(format!("invalid time '{}', expected HH:MM", raw)))
    }
}

/// Parses an `HH:MM` time
pub fn parse_time(s: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(s.trim(), hhmm::FORMAT)
        .map_err(|_| ConfigError::Invalid(format!("invalid time '{}', expected HH:MM", s)))
}

/// Parses an IANA timezone name
pub fn parse_timezone(s: &str) -> Result<Tz, ConfigError> {
    s.trim()
        .parse::<Tz>()
        .map_err(|_| ConfigError::Invalid(format!("unknown timezone '{}'", s)))
}

/// When the daily rollover sweep runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloverSettings {
    /// Run the sweep at all
    pub enabled: bool,

    /// Local time of day to run
    #[serde(with = "hhmm")]
    pub time: NaiveTime,

    /// Timezone `time` is interpreted in
    pub timezone: Tz,
}

impl Default for RolloverSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            time: NaiveTime::MIN,
            timezone: chrono_tz::Australia::Sydney,
        }
    }
}

/// Scheduling settings for a workspace or a single project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScheduleSettings {
    #[serde(flatten)]
    pub calendar: WorkingCalendar,

    pub rollover: RolloverSettings,
}

impl ScheduleSettings {
    /// Loads settings from a TOML file, or `None` if it does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;

        let settings: Self = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;

        if settings.calendar.working_days.is_empty() {
            return Err(ConfigError::Invalid("working_days must not be empty".to_string()))
                .with_context(|| format!("Invalid settings: {}", path.display()));
        }

        Ok(Some(settings))
    }

    /// Writes settings as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write settings: {}", path.display()))
    }
}

/// Partial settings change; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub working_days: Option<WeekdaySet>,
    pub add_holidays: Vec<NaiveDate>,
    pub remove_holidays: Vec<NaiveDate>,
    pub rollover_enabled: Option<bool>,
    pub rollover_time: Option<NaiveTime>,
    pub rollover_timezone: Option<Tz>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Applies the change, rejecting a calendar with no working days
    pub fn apply(&self, settings: &mut ScheduleSettings) -> Result<(), ConfigError> {
        if let Some(days) = self.working_days {
            if days.is_empty() {
                return Err(ConfigError::Invalid(
                    "working_days must not be empty".to_string(),
                ));
            }
            settings.calendar.working_days = days;
        }
        for day in &self.remove_holidays {
            settings.calendar.holidays.remove(day);
        }
        settings
            .calendar
            .holidays
            .extend(self.add_holidays.iter().copied());
        if let Some(enabled) = self.rollover_enabled {
            settings.rollover.enabled = enabled;
        }
        if let Some(time) = self.rollover_time {
            settings.rollover.time = time;
        }
        if let Some(tz) = self.rollover_timezone {
            settings.rollover.timezone = tz;
        }
        Ok(())
    }
}

/// Output format for commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Per-user preferences
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(default)]
pub struct UserConfig {
    /// Default output format (text or json)
    pub default_format: OutputFormat,

    /// Project used when `--project` is not given
    pub default_project: Option<String>,
}

impl UserConfig {
    /// Returns the user config directory
    pub fn config_dir() -> Option<PathBuf> {
        ProjectDirs::from("dev", "schedule-master", "schedule-master")
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Loads user preferences, falling back to defaults
    pub fn load() -> Result<Self> {
        match Self::config_dir() {
            Some(dir) => Self::load_from(&dir.join("config.toml")),
            None => Ok(Self::default()),
        }
    }

    fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read user config: {}", path.display()))?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))
            .context("Failed to parse user config")
    }
}

/// Finds the workspace root by looking for a `.sm/` directory in `start` or
/// any of its parents
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        if current.join(WORKSPACE_DIR).is_dir() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}
