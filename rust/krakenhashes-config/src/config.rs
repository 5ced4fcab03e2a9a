//! Configuration loading: env > file > defaults (§9 "no god object" — the
//! scheduler reads a settings snapshot, never a live handle into this).

use crate::schema::*;
use std::path::{Path, PathBuf};

/// Load configuration from the file named by `KRAKENHASHES_CONFIG` (or
/// `~/.krakenhashes/config.toml` if unset), then apply `KRAKEN_*`
/// environment overrides, then validate.
pub fn load_config() -> Result<KrakenConfig, ConfigError> {
    let config_file = config_file_path()?;

    let mut config = if config_file.exists() {
        load_from_file(&config_file)?
    } else {
        KrakenConfig::default()
    };

    crate::env::apply_env_overrides(&mut config)?;
    validate_config(&config)?;

    Ok(config)
}

pub fn load_from_file(path: &Path) -> Result<KrakenConfig, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(e.to_string()))?;
    toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn config_file_path() -> Result<PathBuf, ConfigError> {
    if let Ok(path) = std::env::var("KRAKENHASHES_CONFIG") {
        return Ok(PathBuf::from(path));
    }
    let home = std::env::var("HOME").map_err(|_| ConfigError::IoError("HOME not set".into()))?;
    let mut path = PathBuf::from(home);
    path.push(".krakenhashes");
    path.push("config.toml");
    Ok(path)
}

/// Validate cross-field constraints the schema's `Deserialize` defaults
/// can't express on their own.
pub fn validate_config(config: &KrakenConfig) -> Result<(), ConfigError> {
    if config.scheduling.default_chunk_duration_secs <= 0 {
        return Err(ConfigError::ValidationError(
            "scheduling.default_chunk_duration_secs must be positive".into(),
        ));
    }
    if config.scheduling.chunk_fluctuation_percentage < 0 {
        return Err(ConfigError::ValidationError(
            "scheduling.chunk_fluctuation_percentage must be non-negative".into(),
        ));
    }
    if config.scheduling.max_concurrent_jobs_per_agent <= 0 {
        return Err(ConfigError::ValidationError(
            "scheduling.max_concurrent_jobs_per_agent must be positive".into(),
        ));
    }
    if config.rule_splitting.threshold <= 0.0 {
        return Err(ConfigError::ValidationError(
            "rule_splitting.threshold must be positive".into(),
        ));
    }
    if config.rule_splitting.max_chunks <= 0 {
        return Err(ConfigError::ValidationError(
            "rule_splitting.max_chunks must be positive".into(),
        ));
    }
    if config.command_plane.pong_wait_secs <= config.command_plane.ping_period_secs {
        return Err(ConfigError::ValidationError(
            "command_plane.pong_wait_secs must exceed ping_period_secs".into(),
        ));
    }
    Ok(())
}
