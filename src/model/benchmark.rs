use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BenchmarkKey {
    pub agent_id: AgentId,
    pub attack_mode: i16,
    pub hash_type: i32,
}

/// Measured throughput for one `(agent, attack_mode, hash_type)` triple.
/// TTL-bounded freshness is checked by [`crate::benchmark_cache`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkEntry {
    pub key: BenchmarkKey,
    pub hashes_per_second: f64,
    pub updated_at: DateTime<Utc>,
}

impl BenchmarkEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl_hours: i64) -> bool {
        (now - self.updated_at).num_hours() < ttl_hours
    }
}
