//! Environment variable overrides, applied after the TOML file and before
//! validation. Format: `KRAKEN_<SECTION>_<KEY>`, e.g.
//! `KRAKEN_SCHEDULING_DEFAULT_CHUNK_DURATION_SECS=900`.

use crate::schema::{ConfigError, KrakenConfig};

pub fn apply_env_overrides(config: &mut KrakenConfig) -> Result<(), ConfigError> {
    for (key, value) in std::env::vars() {
        if !key.starts_with("KRAKEN_") {
            continue;
        }
        let rest = key.trim_start_matches("KRAKEN_");
        apply_one(config, rest, &value)?;
    }
    Ok(())
}

fn apply_one(config: &mut KrakenConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    let parse_i64 = |v: &str| -> Result<i64, ConfigError> {
        v.parse()
            .map_err(|_| ConfigError::ValidationError(format!("invalid integer: {v}")))
    };
    let parse_bool = |v: &str| -> Result<bool, ConfigError> {
        v.parse()
            .map_err(|_| ConfigError::ValidationError(format!("invalid bool: {v}")))
    };
    let parse_f64 = |v: &str| -> Result<f64, ConfigError> {
        v.parse()
            .map_err(|_| ConfigError::ValidationError(format!("invalid float: {v}")))
    };

    match key {
        "SERVER_BIND_ADDRESS" => config.server.bind_address = value.to_string(),
        "SERVER_DATABASE_URL" => config.server.database_url = value.to_string(),

        "SCHEDULING_DEFAULT_CHUNK_DURATION_SECS" => {
            config.scheduling.default_chunk_duration_secs = parse_i64(value)?
        }
        "SCHEDULING_CHUNK_FLUCTUATION_PERCENTAGE" => {
            config.scheduling.chunk_fluctuation_percentage = parse_i64(value)?
        }
        "SCHEDULING_PROGRESS_REPORTING_INTERVAL_SECS" => {
            config.scheduling.progress_reporting_interval_secs = parse_i64(value)?
        }
        "SCHEDULING_MAX_CONCURRENT_JOBS_PER_AGENT" => {
            config.scheduling.max_concurrent_jobs_per_agent = parse_i64(value)? as i32
        }
        "SCHEDULING_MAX_CHUNK_RETRY_ATTEMPTS" => {
            config.scheduling.max_chunk_retry_attempts = parse_i64(value)? as i32
        }
        "SCHEDULING_RECONNECT_GRACE_PERIOD_SECS" => {
            config.scheduling.reconnect_grace_period_secs = parse_i64(value)?
        }
        "SCHEDULING_JOB_INTERRUPTION_ENABLED" => {
            config.scheduling.job_interruption_enabled = parse_bool(value)?
        }
        "SCHEDULING_AGENT_SCHEDULING_ENABLED" => {
            config.scheduling.agent_scheduling_enabled = parse_bool(value)?
        }
        "SCHEDULING_MAX_JOB_PRIORITY" => {
            config.scheduling.max_job_priority = parse_i64(value)? as i32
        }

        "RULE_SPLITTING_ENABLED" => config.rule_splitting.enabled = parse_bool(value)?,
        "RULE_SPLITTING_THRESHOLD" => config.rule_splitting.threshold = parse_f64(value)?,
        "RULE_SPLITTING_MIN_RULES" => config.rule_splitting.min_rules = parse_i64(value)?,
        "RULE_SPLITTING_MAX_CHUNKS" => config.rule_splitting.max_chunks = parse_i64(value)?,
        "RULE_SPLITTING_CHUNK_DIR" => config.rule_splitting.chunk_dir = value.to_string(),

        "BENCHMARK_TEST_DURATION_SECS" => config.benchmark.test_duration_secs = parse_i64(value)?,
        "BENCHMARK_SPEEDTEST_TIMEOUT_SECS" => {
            config.benchmark.speedtest_timeout_secs = parse_i64(value)?
        }
        "BENCHMARK_CACHE_TTL_HOURS" => config.benchmark.cache_ttl_hours = parse_i64(value)?,

        "COMMAND_PLANE_PING_PERIOD_SECS" => {
            config.command_plane.ping_period_secs = parse_i64(value)? as u64
        }
        "COMMAND_PLANE_PONG_WAIT_SECS" => {
            config.command_plane.pong_wait_secs = parse_i64(value)? as u64
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_scheduling_section() {
        let mut config = KrakenConfig::default();
        apply_one(&mut config, "SCHEDULING_DEFAULT_CHUNK_DURATION_SECS", "120").unwrap();
        assert_eq!(config.scheduling.default_chunk_duration_secs, 120);
    }

    #[test]
    fn rejects_malformed_integers() {
        let mut config = KrakenConfig::default();
        let err = apply_one(&mut config, "SCHEDULING_MAX_JOB_PRIORITY", "not-a-number");
        assert!(err.is_err());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut config = KrakenConfig::default();
        let before = config.scheduling.default_chunk_duration_secs;
        apply_one(&mut config, "SOME_UNRELATED_KEY", "value").unwrap();
        assert_eq!(config.scheduling.default_chunk_duration_secs, before);
    }
}
