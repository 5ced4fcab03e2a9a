//! Settings snapshot handed to each scheduling tick.
//!
//! Per the design notes' "no god object" resolution, the tick loop never
//! holds a live handle into configuration — it receives one of these,
//! cloned from [`krakenhashes_config::KrakenConfig`] at the start of the
//! iteration, and the rest of the core only ever sees this type.

use krakenhashes_config::KrakenConfig;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub default_chunk_duration_secs: i64,
    pub chunk_fluctuation_percentage: i64,
    pub progress_reporting_interval_secs: i64,
    pub max_concurrent_jobs_per_agent: i32,
    pub max_chunk_retry_attempts: i32,
    pub reconnect_grace_period_secs: i64,
    pub job_interruption_enabled: bool,
    pub agent_scheduling_enabled: bool,
    pub max_job_priority: i32,
    pub heartbeat_interval_secs: i64,
    pub assignment_start_timeout_secs: i64,
    pub consecutive_failure_threshold: u32,

    pub rule_splitting_enabled: bool,
    pub rule_split_threshold: f64,
    pub rule_split_min_rules: i64,
    pub rule_split_max_chunks: i64,
    pub rule_chunk_dir: String,

    pub speedtest_duration_secs: i64,
    pub speedtest_timeout_secs: i64,
    pub benchmark_cache_ttl_hours: i64,

    /// Minimum job priority eligible for high-priority-override preemption
    /// (§4.6.3). Not an enumerated system setting in §6; the distilled spec
    /// names `preemption_floor` only as a condition, so this implementation
    /// pins it to zero (any job with `allow_high_priority_override` can
    /// preempt a strictly lower-priority job) unless overridden.
    pub preemption_floor: i32,
}

impl From<&KrakenConfig> for SchedulerSettings {
    fn from(c: &KrakenConfig) -> Self {
        Self {
            default_chunk_duration_secs: c.scheduling.default_chunk_duration_secs,
            chunk_fluctuation_percentage: c.scheduling.chunk_fluctuation_percentage,
            progress_reporting_interval_secs: c.scheduling.progress_reporting_interval_secs,
            max_concurrent_jobs_per_agent: c.scheduling.max_concurrent_jobs_per_agent,
            max_chunk_retry_attempts: c.scheduling.max_chunk_retry_attempts,
            reconnect_grace_period_secs: c.scheduling.reconnect_grace_period_secs,
            job_interruption_enabled: c.scheduling.job_interruption_enabled,
            agent_scheduling_enabled: c.scheduling.agent_scheduling_enabled,
            max_job_priority: c.scheduling.max_job_priority,
            heartbeat_interval_secs: c.scheduling.heartbeat_interval_secs,
            assignment_start_timeout_secs: c.scheduling.assignment_start_timeout_secs,
            consecutive_failure_threshold: c.scheduling.consecutive_failure_threshold,

            rule_splitting_enabled: c.rule_splitting.enabled,
            rule_split_threshold: c.rule_splitting.threshold,
            rule_split_min_rules: c.rule_splitting.min_rules,
            rule_split_max_chunks: c.rule_splitting.max_chunks,
            rule_chunk_dir: c.rule_splitting.chunk_dir.clone(),

            speedtest_duration_secs: c.benchmark.test_duration_secs,
            speedtest_timeout_secs: c.benchmark.speedtest_timeout_secs,
            benchmark_cache_ttl_hours: c.benchmark.cache_ttl_hours,

            preemption_floor: 0,
        }
    }
}

#[cfg(test)]
impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from(&KrakenConfig::default())
    }
}
