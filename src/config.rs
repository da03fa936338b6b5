//! Configuration types.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::store::reset::{DEFAULT_RESET_CRON, ResetSchedule};

/// Directory under `data_dir` that holds this plugin's database.
const PLUGIN_DIR: &str = "no_dragon_lord";

/// Database file name.
const DB_FILE: &str = "message_counts.db";

/// Guard configuration.
///
/// Loaded from a JSON plugin config file or from `NDL_*` environment
/// variables. Missing keys take their defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Groups the guard acts in. Empty means every group.
    pub white_list_groups: Vec<String>,
    /// Headroom subtracted from the group max before comparing with the bot's tally.
    pub fault_tolerance: u64,
    /// Host's per-plugin data directory.
    pub data_dir: PathBuf,
    /// Cron expression (seconds first) for the daily tally reset.
    pub reset_cron: String,
    /// Pause after a reset before the next one is scheduled.
    pub reset_cooldown_secs: u64,
    /// The bot's own sender id (used by the CLI host).
    pub self_id: String,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            white_list_groups: Vec::new(),
            fault_tolerance: 0,
            data_dir: PathBuf::from("./data/dragon_lord_data"),
            reset_cron: DEFAULT_RESET_CRON.to_string(),
            reset_cooldown_secs: 60,
            self_id: "bot".to_string(),
        }
    }
}

impl GuardConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup (environment, test maps).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let white_list_groups: Vec<String> = lookup("NDL_WHITE_LIST_GROUPS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let fault_tolerance = match lookup("NDL_FAULT_TOLERANCE") {
            Some(raw) => parse_u64("NDL_FAULT_TOLERANCE", &raw)?,
            None => defaults.fault_tolerance,
        };

        let reset_cooldown_secs = match lookup("NDL_RESET_COOLDOWN_SECS") {
            Some(raw) => parse_u64("NDL_RESET_COOLDOWN_SECS", &raw)?,
            None => defaults.reset_cooldown_secs,
        };

        let config = Self {
            white_list_groups,
            fault_tolerance,
            data_dir: lookup("NDL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            reset_cron: lookup("NDL_RESET_CRON").unwrap_or(defaults.reset_cron),
            reset_cooldown_secs,
            self_id: lookup("NDL_SELF_ID").unwrap_or(defaults.self_id),
        };
        config.reset_schedule()?;
        Ok(config)
    }

    /// Parse the JSON plugin config form.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.reset_schedule()?;
        Ok(config)
    }

    /// Read and parse a JSON plugin config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Location of the tally database.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(PLUGIN_DIR).join(DB_FILE)
    }

    /// Validated reset schedule.
    pub fn reset_schedule(&self) -> Result<ResetSchedule, ConfigError> {
        ResetSchedule::new(
            &self.reset_cron,
            Duration::from_secs(self.reset_cooldown_secs),
        )
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{raw}': {e}"),
    })
}
