// Configuration loading.
// Reads CoreConfig from a JSON file, then applies environment overrides.
// A missing file means defaults; a malformed or out-of-range file is an error.

use std::fs;
use std::path::{Path, PathBuf};

use crate::types::config::CoreConfig;
use crate::types::errors::ConfigError;

pub const ENV_CONFIG_PATH: &str = "TABGROUPS_CONFIG";
pub const ENV_DATA_DIR: &str = "TABGROUPS_DATA_DIR";
pub const ENV_SETTLE_DELAY_MS: &str = "TABGROUPS_SETTLE_DELAY_MS";

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Loads the config file at `path` (if any) and applies process environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<CoreConfig, ConfigError> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => CoreConfig::default(),
    };
    apply_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config)?;
    Ok(config)
}

/// Rejects values the core cannot run with.
pub fn validate_config(config: &CoreConfig) -> Result<(), ConfigError> {
    if config.session_save_interval_secs == 0 {
        return Err(ConfigError::Invalid(
            "session_save_interval_secs must be positive".to_string(),
        ));
    }
    if config.stale_session_days.checked_mul(SECS_PER_DAY).is_none() {
        return Err(ConfigError::Invalid(format!(
            "stale_session_days out of range: {}",
            config.stale_session_days
        )));
    }
    if config.default_group_name.trim().is_empty() {
        return Err(ConfigError::Invalid("default_group_name must not be blank".to_string()));
    }
    Ok(())
}

/// Reads a config file; a missing file yields defaults.
pub fn read_config_file(path: &Path) -> Result<CoreConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(CoreConfig::default());
    }
    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("Failed to read config file: {}", e)))?;
    serde_json::from_str(&content)
        .map_err(|e| ConfigError::Parse(format!("Failed to parse config file: {}", e)))
}

/// Applies overrides from `lookup`, which maps an environment variable name to its value.
pub fn apply_overrides<F>(config: &mut CoreConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(ENV_DATA_DIR).filter(|d| !d.trim().is_empty()) {
        config.data_dir = Some(PathBuf::from(dir));
    }
    if let Some(raw) = lookup(ENV_SETTLE_DELAY_MS) {
        match raw.trim().parse::<u64>() {
            Ok(ms) => config.settle_delay_ms = ms,
            Err(_) => tracing::warn!(value = %raw, "ignoring invalid {}", ENV_SETTLE_DELAY_MS),
        }
    }
}

/// Path of the SQLite file inside the configured data directory.
pub fn database_path(config: &CoreConfig) -> PathBuf {
    let dir = config
        .data_dir
        .clone()
        .or_else(|| std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)))
        .unwrap_or_else(|| PathBuf::from("."));
    dir.join("tabgroups.db")
}
