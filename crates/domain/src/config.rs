//! Application configuration structures

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{
    ADD_BATCH_SIZE, DEFAULT_CALENDAR_MAX_ATTEMPTS, DEFAULT_CALENDAR_TIMEOUT_SECS,
    DEFAULT_COURSE_CONCURRENCY, DEFAULT_DB_PATH, DEFAULT_DB_POOL_SIZE, DEFAULT_MAX_GRANT_PAGES,
    DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_RECONCILE_TIMEOUT_SECS, DEFAULT_REMOVAL_BATCH_SIZE,
};
use crate::errors::{Result, SyncError};

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    pub calendar: CalendarApiConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values that would make the engine misbehave at runtime
    pub fn validate(&self) -> Result<()> {
        if self.database.pool_size == 0 {
            return Err(SyncError::Config("database.pool_size must be at least 1".into()));
        }
        if self.calendar.base_url.trim().is_empty() {
            return Err(SyncError::Config("calendar.base_url must not be empty".into()));
        }
        if self.calendar.max_attempts == 0 {
            return Err(SyncError::Config("calendar.max_attempts must be at least 1".into()));
        }
        if self.sync.course_concurrency == 0 {
            return Err(SyncError::Config("sync.course_concurrency must be at least 1".into()));
        }
        if self.sync.add_batch_size == 0 || self.sync.add_batch_size > ADD_BATCH_SIZE {
            return Err(SyncError::Config(format!(
                "sync.add_batch_size must be between 1 and {ADD_BATCH_SIZE}"
            )));
        }
        if self.sync.removal_batch_size == 0 {
            return Err(SyncError::Config("sync.removal_batch_size must be at least 1".into()));
        }
        if self.sync.reconcile_enabled && self.sync.reconcile_interval_secs == 0 {
            return Err(SyncError::Config(
                "sync.reconcile_interval_secs must be positive when reconciliation is enabled"
                    .into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path(), pool_size: default_pool_size() }
    }
}

/// Calendar service connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl CalendarApiConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Tuning for propagation and reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Courses reconciled in parallel
    #[serde(default = "default_course_concurrency")]
    pub course_concurrency: usize,
    /// Grants per batch-create call
    #[serde(default = "default_add_batch_size")]
    pub add_batch_size: usize,
    /// Changed pairs per removal barrier
    #[serde(default = "default_removal_batch_size")]
    pub removal_batch_size: usize,
    #[serde(default = "default_max_grant_pages")]
    pub max_grant_pages: usize,
    #[serde(default)]
    pub reconcile_enabled: bool,
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_secs: u64,
    #[serde(default = "default_reconcile_timeout")]
    pub reconcile_timeout_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            course_concurrency: default_course_concurrency(),
            add_batch_size: default_add_batch_size(),
            removal_batch_size: default_removal_batch_size(),
            max_grant_pages: default_max_grant_pages(),
            reconcile_enabled: false,
            reconcile_interval_secs: default_reconcile_interval(),
            reconcile_timeout_secs: default_reconcile_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), json: false }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from(DEFAULT_DB_PATH)
}

const fn default_pool_size() -> u32 {
    DEFAULT_DB_POOL_SIZE
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_CALENDAR_TIMEOUT_SECS
}

const fn default_max_attempts() -> u32 {
    DEFAULT_CALENDAR_MAX_ATTEMPTS
}

const fn default_course_concurrency() -> usize {
    DEFAULT_COURSE_CONCURRENCY
}

const fn default_add_batch_size() -> usize {
    ADD_BATCH_SIZE
}

const fn default_removal_batch_size() -> usize {
    DEFAULT_REMOVAL_BATCH_SIZE
}

const fn default_max_grant_pages() -> usize {
    DEFAULT_MAX_GRANT_PAGES
}

const fn default_reconcile_interval() -> u64 {
    DEFAULT_RECONCILE_INTERVAL_SECS
}

const fn default_reconcile_timeout() -> u64 {
    DEFAULT_RECONCILE_TIMEOUT_SECS
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config {
            database: DatabaseConfig::default(),
            calendar: CalendarApiConfig::new("https://calendar.example.edu/api"),
            sync: SyncConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        let config = config();
        assert!(config.validate().is_ok());
        assert_eq!(config.sync.course_concurrency, 5);
        assert_eq!(config.sync.add_batch_size, 100);
    }

    #[test]
    fn add_batch_size_is_capped() {
        let mut config = config();
        config.sync.add_batch_size = 101;
        assert!(matches!(config.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = config();
        config.sync.course_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn minimal_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"calendar":{"base_url":"http://localhost:9000"}}"#).unwrap();
        assert_eq!(config.database.pool_size, DEFAULT_DB_POOL_SIZE);
        assert_eq!(config.sync.removal_batch_size, DEFAULT_REMOVAL_BATCH_SIZE);
        assert_eq!(config.logging.level, "info");
        assert!(config.calendar.api_token.is_none());
    }
}
