//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// Sitewright configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub consistency: ConsistencyConfig,
    #[serde(default)]
    pub database: DatabaseSettings,
}

/// Context store cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub cache_ttl_secs: u64,
    pub max_cache_entries: usize,
    /// Run updates to the same project one at a time
    pub serialize_updates: bool,
}

/// Notification hub settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Buffered events per live connection
    pub channel_capacity: usize,
    /// Lifetime dropped events before a slow connection is pruned
    pub max_dropped_messages: u64,
}

/// Metrics collector settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub max_records: usize,
    pub throughput_window_secs: u64,
    pub top_errors: usize,
}

/// Consistency checker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    /// Results kept per project
    pub history_limit: usize,
}

/// Durable record location and pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub max_connections: u32,
    /// SQLite journal mode
    pub journal_mode: String,
}

const JOURNAL_MODES: [&str; 6] = ["delete", "truncate", "persist", "memory", "wal", "off"];

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: 5,
            journal_mode: "wal".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            max_cache_entries: 1000,
            serialize_updates: true,
        }
    }
}

impl StoreConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            max_dropped_messages: 100,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            max_records: 1000,
            throughput_window_secs: 60,
            top_errors: 5,
        }
    }
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self { history_limit: 10 }
    }
}

const KEYS: [&str; 12] = [
    "store.cache_ttl_secs",
    "store.max_cache_entries",
    "store.serialize_updates",
    "notify.channel_capacity",
    "notify.max_dropped_messages",
    "metrics.max_records",
    "metrics.throughput_window_secs",
    "metrics.top_errors",
    "consistency.history_limit",
    "database.path",
    "database.max_connections",
    "database.journal_mode",
];

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("SITEWRIGHT_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("sitewright")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or use defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> crate::Result<()> {
        let positive = [
            ("store.cache_ttl_secs", self.store.cache_ttl_secs as usize),
            ("store.max_cache_entries", self.store.max_cache_entries),
            ("notify.channel_capacity", self.notify.channel_capacity),
            ("metrics.max_records", self.metrics.max_records),
            ("consistency.history_limit", self.consistency.history_limit),
            ("database.max_connections", self.database.max_connections as usize),
        ];
        if let Some((key, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(Error::ConfigError(format!("{} must be greater than 0", key)));
        }
        if !JOURNAL_MODES.contains(&self.database.journal_mode.as_str()) {
            return Err(Error::ConfigError(format!(
                "database.journal_mode must be one of: {}",
                JOURNAL_MODES.join(", ")
            )));
        }
        Ok(())
    }

    /// Resolved database file path
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(crate::storage::default_database_path)
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "store.cache_ttl_secs" => Ok(self.store.cache_ttl_secs.to_string()),
            "store.max_cache_entries" => Ok(self.store.max_cache_entries.to_string()),
            "store.serialize_updates" => Ok(self.store.serialize_updates.to_string()),
            "notify.channel_capacity" => Ok(self.notify.channel_capacity.to_string()),
            "notify.max_dropped_messages" => Ok(self.notify.max_dropped_messages.to_string()),
            "metrics.max_records" => Ok(self.metrics.max_records.to_string()),
            "metrics.throughput_window_secs" => Ok(self.metrics.throughput_window_secs.to_string()),
            "metrics.top_errors" => Ok(self.metrics.top_errors.to_string()),
            "consistency.history_limit" => Ok(self.consistency.history_limit.to_string()),
            "database.path" => Ok(self.database_path().display().to_string()),
            "database.max_connections" => Ok(self.database.max_connections.to_string()),
            "database.journal_mode" => Ok(self.database.journal_mode.clone()),
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `sitewright config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "store.cache_ttl_secs" => {
                self.store.cache_ttl_secs = parse_positive(key, value)?;
            }
            "store.max_cache_entries" => {
                self.store.max_cache_entries = parse_positive(key, value)?;
            }
            "store.serialize_updates" => {
                self.store.serialize_updates = value
                    .parse()
                    .with_context(|| format!("Invalid serialize_updates value: {}", value))?;
            }
            "notify.channel_capacity" => {
                self.notify.channel_capacity = parse_positive(key, value)?;
            }
            "notify.max_dropped_messages" => {
                self.notify.max_dropped_messages = parse_positive(key, value)?;
            }
            "metrics.max_records" => {
                self.metrics.max_records = parse_positive(key, value)?;
            }
            "metrics.throughput_window_secs" => {
                self.metrics.throughput_window_secs = parse_positive(key, value)?;
            }
            "metrics.top_errors" => {
                self.metrics.top_errors = parse_positive(key, value)?;
            }
            "consistency.history_limit" => {
                self.consistency.history_limit = parse_positive(key, value)?;
            }
            "database.path" => {
                if value.trim().is_empty() {
                    self.database.path = None;
                } else {
                    self.database.path = Some(PathBuf::from(value));
                }
            }
            "database.max_connections" => {
                self.database.max_connections = parse_positive(key, value)?;
            }
            "database.journal_mode" => {
                let mode = value.trim().to_ascii_lowercase();
                if !JOURNAL_MODES.contains(&mode.as_str()) {
                    return Err(anyhow!(
                        "Invalid journal mode: {}. Expected one of: {}",
                        value,
                        JOURNAL_MODES.join(", ")
                    ));
                }
                self.database.journal_mode = mode;
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `sitewright config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        KEYS.iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn parse_positive<T>(key: &str, value: &str) -> anyhow::Result<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let parsed: T = value
        .parse()
        .map_err(|_| anyhow!("Invalid value for {}: {}", key, value))?;
    if parsed <= T::default() {
        return Err(anyhow!("{} must be greater than 0", key));
    }
    Ok(parsed)
}
