//! Configuration loader
//!
//! Loads engine configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. Attempt environment variables (`CALSYNC_CALENDAR_BASE_URL` is required)
//! 2. Otherwise fall back to a config file
//! 3. Probe well-known paths when no file is given
//! 4. JSON and TOML are both supported
//!
//! Every loaded config passes [`Config::validate`].
//!
//! ## Environment Variables
//! - `CALSYNC_DB_PATH`: SQLite file path
//! - `CALSYNC_DB_POOL_SIZE`: connection pool size
//! - `CALSYNC_CALENDAR_BASE_URL`: calendar service base URL (required)
//! - `CALSYNC_CALENDAR_API_TOKEN`: bearer token for the calendar service
//! - `CALSYNC_CALENDAR_TIMEOUT`: request timeout in seconds
//! - `CALSYNC_CALENDAR_MAX_ATTEMPTS`: attempts per request including the first
//! - `CALSYNC_COURSE_CONCURRENCY`: courses reconciled in parallel
//! - `CALSYNC_ADD_BATCH_SIZE`: grants per batch-create call
//! - `CALSYNC_REMOVAL_BATCH_SIZE`: changed pairs per removal barrier
//! - `CALSYNC_MAX_GRANT_PAGES`: page guard for grant listings
//! - `CALSYNC_RECONCILE_ENABLED`: periodic reconciliation on/off
//! - `CALSYNC_RECONCILE_INTERVAL`: reconciliation interval in seconds
//! - `CALSYNC_RECONCILE_TIMEOUT`: upper bound on one reconciliation run
//! - `CALSYNC_LOG_LEVEL`: default tracing level
//! - `CALSYNC_LOG_JSON`: JSON log output (true/false)
//!
//! ## File Locations
//! `calsync.{json,toml}` and `config.{json,toml}` in the working directory,
//! its parent, and next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use calsync_domain::{
    CalendarApiConfig, Config, DatabaseConfig, LoggingConfig, Result, SyncConfig, SyncError,
};

const FILE_NAMES: [&str; 4] = ["calsync.json", "calsync.toml", "config.json", "config.toml"];

/// Load configuration, environment first, then file.
///
/// # Errors
/// Returns `SyncError::Config` if neither source yields a valid config.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Environment configuration unavailable, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from `CALSYNC_*` environment variables.
///
/// Only the calendar base URL is required; everything else falls back to
/// the defaults of the domain config types.
pub fn load_from_env() -> Result<Config> {
    let defaults = (DatabaseConfig::default(), SyncConfig::default(), LoggingConfig::default());
    let (db, sync, logging) = defaults;

    let mut calendar = CalendarApiConfig::new(env_var("CALSYNC_CALENDAR_BASE_URL")?);
    calendar.api_token = optional_env("CALSYNC_CALENDAR_API_TOKEN");
    calendar.timeout_secs = env_parse("CALSYNC_CALENDAR_TIMEOUT", calendar.timeout_secs)?;
    calendar.max_attempts = env_parse("CALSYNC_CALENDAR_MAX_ATTEMPTS", calendar.max_attempts)?;

    let config = Config {
        database: DatabaseConfig {
            path: optional_env("CALSYNC_DB_PATH").map(PathBuf::from).unwrap_or(db.path),
            pool_size: env_parse("CALSYNC_DB_POOL_SIZE", db.pool_size)?,
        },
        calendar,
        sync: SyncConfig {
            course_concurrency: env_parse("CALSYNC_COURSE_CONCURRENCY", sync.course_concurrency)?,
            add_batch_size: env_parse("CALSYNC_ADD_BATCH_SIZE", sync.add_batch_size)?,
            removal_batch_size: env_parse("CALSYNC_REMOVAL_BATCH_SIZE", sync.removal_batch_size)?,
            max_grant_pages: env_parse("CALSYNC_MAX_GRANT_PAGES", sync.max_grant_pages)?,
            reconcile_enabled: env_bool("CALSYNC_RECONCILE_ENABLED", sync.reconcile_enabled),
            reconcile_interval_secs: env_parse(
                "CALSYNC_RECONCILE_INTERVAL",
                sync.reconcile_interval_secs,
            )?,
            reconcile_timeout_secs: env_parse(
                "CALSYNC_RECONCILE_TIMEOUT",
                sync.reconcile_timeout_secs,
            )?,
        },
        logging: LoggingConfig {
            level: optional_env("CALSYNC_LOG_LEVEL").unwrap_or(logging.level),
            json: env_bool("CALSYNC_LOG_JSON", logging.json),
        },
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from a file.
///
/// If `path` is `None`, searches the standard locations. Format is chosen by
/// extension.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(SyncError::Config(format!("Config file not found: {}", p.display())));
            }
            p
        }
        None => discover_config_paths().ok_or_else(|| {
            SyncError::Config("No config file found in any of the standard locations".to_string())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| SyncError::Config(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| SyncError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| SyncError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(SyncError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations
pub fn discover_config_paths() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd.clone());
        dirs.push(cwd.join(".."));
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf))
    {
        dirs.push(exe_dir);
    }

    dirs.iter()
        .flat_map(|dir| FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.exists())
}

fn env_var(key: &str) -> Result<String> {
    optional_env(key)
        .ok_or_else(|| SyncError::Config(format!("Missing required environment variable: {key}")))
}

/// Set and non-blank
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| SyncError::Config(format!("Invalid value for {key}: {e}"))),
        None => Ok(default),
    }
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
