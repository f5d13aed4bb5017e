//! calsched configuration at ~/.config/calsched/config.toml

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{SchedError, SchedResult};

const DEFAULT_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_CONFLICT_BACKOFF: &str = "50ms";

/// What happens to an inbox item once its effect has been applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboxRetention {
    #[default]
    Delete,
    Retain,
}

/// Retry and retention rules for the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingPolicy {
    /// Total conditional-write attempts per operation, at least 1
    pub max_attempts: u32,
    /// Pause between attempts after a conflict
    pub conflict_backoff: Duration,
    pub retention: InboxRetention,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        SchedulingPolicy {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            conflict_backoff: Duration::from_millis(50),
            retention: InboxRetention::Delete,
        }
    }
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_conflict_backoff() -> String {
    DEFAULT_CONFLICT_BACKOFF.to_string()
}

/// The `[scheduling]` table as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Humantime duration, e.g. "50ms" or "1s"
    #[serde(default = "default_conflict_backoff")]
    pub conflict_backoff: String,

    #[serde(default)]
    pub inbox_retention: InboxRetention,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        SchedulingConfig {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            conflict_backoff: default_conflict_backoff(),
            inbox_retention: InboxRetention::default(),
        }
    }
}

impl SchedulingConfig {
    pub fn policy(&self) -> SchedResult<SchedulingPolicy> {
        if self.max_attempts == 0 {
            return Err(SchedError::Config(
                "scheduling.max_attempts must be at least 1".into(),
            ));
        }
        let conflict_backoff = humantime::parse_duration(&self.conflict_backoff).map_err(|e| {
            SchedError::Config(format!(
                "Invalid scheduling.conflict_backoff '{}': {}",
                self.conflict_backoff, e
            ))
        })?;
        Ok(SchedulingPolicy {
            max_attempts: self.max_attempts,
            conflict_backoff,
            retention: self.inbox_retention,
        })
    }
}

/// One CalDAV account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Server root or any URL on the server; principals are discovered from it
    pub url: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_account: Option<String>,

    #[serde(default)]
    pub scheduling: SchedulingConfig,

    #[serde(default)]
    pub accounts: BTreeMap<String, AccountConfig>,
}

impl SchedConfig {
    pub fn config_path() -> SchedResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SchedError::Config("Could not determine config directory".into()))?
            .join("calsched");

        Ok(config_dir.join("config.toml"))
    }

    /// Load ~/.config/calsched/config.toml, creating a commented default
    /// file on first run. `CALSCHED__*` environment variables override it.
    pub fn load() -> SchedResult<Self> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            Self::create_default_config(&config_path)?;
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> SchedResult<Self> {
        Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("CALSCHED").separator("__"))
            .build()
            .map_err(|e| SchedError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| SchedError::Config(e.to_string()))
    }

    /// Pick an account by name, falling back to `default_account`, then to
    /// the only configured account.
    pub fn account(&self, name: Option<&str>) -> SchedResult<(&str, &AccountConfig)> {
        let name = match name.or(self.default_account.as_deref()) {
            Some(name) => name,
            None if self.accounts.len() == 1 => {
                return self
                    .accounts
                    .iter()
                    .next()
                    .map(|(name, account)| (name.as_str(), account))
                    .ok_or_else(|| SchedError::Config("No accounts configured".into()));
            }
            None if self.accounts.is_empty() => {
                return Err(SchedError::Config(
                    "No accounts configured. Add an [accounts.<name>] table to the config file"
                        .into(),
                ));
            }
            None => {
                return Err(SchedError::Config(
                    "Several accounts configured; set default_account or pass --account".into(),
                ));
            }
        };

        self.accounts
            .get_key_value(name)
            .map(|(name, account)| (name.as_str(), account))
            .ok_or_else(|| SchedError::Config(format!("Unknown account '{}'", name)))
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> SchedResult<()> {
        let contents = format!(
            "\
# calsched configuration

# Account used when --account is not given:
# default_account = \"work\"

[scheduling]
# Attempts per conditional write before giving up:
# max_attempts = {}
# Pause between attempts after a conflicting write:
# conflict_backoff = \"{}\"
# What to do with processed inbox messages (\"delete\" or \"retain\"):
# inbox_retention = \"delete\"

# [accounts.work]
# url = \"https://calendar.example.com/caldav.php/\"
# username = \"testuser1\"
# password = \"secret\"
",
            DEFAULT_MAX_ATTEMPTS, DEFAULT_CONFLICT_BACKOFF
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SchedError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| SchedError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}
