use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::EmptyCommandPolicy;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub cronscan: CronscanConfig,
    pub scan: ScanConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Process-level settings
#[derive(Debug, Clone, Deserialize)]
pub struct CronscanConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory holding one crontab per user, named after the user.
    #[serde(default = "default_spool_root")]
    pub spool_root: PathBuf,
    /// Overrides the local host name recorded on every entry.
    #[serde(default)]
    pub host_name: Option<String>,
}

/// Which users to scan and how to treat their lines
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    pub users: Vec<String>,
    #[serde(default)]
    pub include_commented_entries: bool,
    #[serde(default)]
    pub empty_command: EmptyCommandPolicy,
    #[serde(default)]
    pub run_deadline_secs: Option<u64>,
    #[serde(default)]
    pub file_read_timeout_ms: Option<u64>,
}

/// Store lifecycle tuning
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Pause before closing the store so in-flight sessions finish.
    #[serde(default = "default_drain_delay_ms")]
    pub drain_delay_ms: u64,
    /// Pause after closing the store.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            drain_delay_ms: default_drain_delay_ms(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

/// Load variables from `./.env` if present; returns whether a file was read.
pub fn load_env() -> bool {
    dotenv::dotenv().is_ok()
}

/// Load variables from an explicit env file; existing variables are kept.
pub fn load_env_from(path: &Path) -> bool {
    dotenv::from_path(path).is_ok()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_spool_root() -> PathBuf {
    PathBuf::from("/var/spool/cron/crontabs")
}

fn default_drain_delay_ms() -> u64 {
    1000
}

fn default_settle_delay_ms() -> u64 {
    250
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in CRONSCAN_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        load_env();

        let config_path = std::env::var("CRONSCAN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::from_path(&config_path)
    }

    /// Load and validate configuration from an explicit path
    pub fn from_path(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.scan.users.is_empty() {
            anyhow::bail!("scan.users must list at least one user");
        }

        for user in &self.scan.users {
            validate_user_name(user)?;
        }

        if let Some(host) = &self.cronscan.host_name {
            if host.trim().is_empty() {
                anyhow::bail!("cronscan.host_name must not be blank when set");
            }
        }

        if self.cronscan.log_level.parse::<log::LevelFilter>().is_err() {
            anyhow::bail!(
                "cronscan.log_level must be one of off, error, warn, info, debug, trace (got {:?})",
                self.cronscan.log_level
            );
        }

        if self.scan.run_deadline_secs == Some(0) {
            anyhow::bail!("scan.run_deadline_secs must be greater than 0");
        }

        if self.scan.file_read_timeout_ms == Some(0) {
            anyhow::bail!("scan.file_read_timeout_ms must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.cronscan.db_path
    }

    /// Get the crontab spool directory
    pub fn spool_root(&self) -> &Path {
        &self.cronscan.spool_root
    }

    /// Replace the configured users, e.g. from a command-line override
    pub fn override_users(&mut self, users: Vec<String>) -> Result<()> {
        self.scan.users = users;
        self.validate()
    }

    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.store.drain_delay_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.store.settle_delay_ms)
    }
}

/// User names become file names under the spool root, so they must be a single path segment.
fn validate_user_name(user: &str) -> Result<()> {
    if user.trim().is_empty() {
        anyhow::bail!("scan.users contains an empty user name");
    }
    if user.contains('/') || user.contains('\\') || user == "." || user == ".." {
        anyhow::bail!("scan.users entry {:?} is not a plain user name", user);
    }
    Ok(())
}
