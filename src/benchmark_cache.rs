//! C2 — Benchmark Cache.
//!
//! Per-(agent, attack_mode, hash_type) throughput, TTL-bounded. The
//! dispatcher consults this before carving a chunk; a stale or missing
//! entry turns the would-be assignment into a `benchmark_request` instead
//! (§4.2).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::model::{AgentId, BenchmarkEntry, BenchmarkKey};

/// Shared, concurrently-updated cache of agent benchmarks. Cheap to clone
/// (wraps an `Arc<DashMap<..>>`).
#[derive(Clone, Default)]
pub struct BenchmarkCache {
    entries: Arc<DashMap<BenchmarkKey, BenchmarkEntry>>,
}

impl BenchmarkCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn record(&self, agent_id: AgentId, attack_mode: i16, hash_type: i32, hashes_per_second: f64) {
        let key = BenchmarkKey {
            agent_id,
            attack_mode,
            hash_type,
        };
        self.entries.insert(
            key,
            BenchmarkEntry {
                key,
                hashes_per_second,
                updated_at: Utc::now(),
            },
        );
    }

    /// Returns a fresh entry's throughput, or `None` if absent or past the
    /// TTL — the caller (dispatcher) should then request a speedtest.
    pub fn fresh_speed(
        &self,
        agent_id: AgentId,
        attack_mode: i16,
        hash_type: i32,
        ttl_hours: i64,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        let key = BenchmarkKey {
            agent_id,
            attack_mode,
            hash_type,
        };
        self.entries
            .get(&key)
            .filter(|e| e.is_fresh(now, ttl_hours))
            .map(|e| e.hashes_per_second)
    }

    pub fn remove(&self, agent_id: AgentId, attack_mode: i16, hash_type: i32) {
        self.entries.remove(&BenchmarkKey {
            agent_id,
            attack_mode,
            hash_type,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    #[test]
    fn missing_entry_has_no_fresh_speed() {
        let cache = BenchmarkCache::new();
        assert!(cache
            .fresh_speed(Uuid::new_v4(), 0, 0, 24, Utc::now())
            .is_none());
    }

    #[test]
    fn recorded_entry_is_fresh_within_ttl() {
        let cache = BenchmarkCache::new();
        let agent = Uuid::new_v4();
        cache.record(agent, 0, 1000, 50_000.0);
        assert_eq!(cache.fresh_speed(agent, 0, 1000, 24, Utc::now()), Some(50_000.0));
    }

    #[test]
    fn stale_entry_past_ttl_is_not_fresh() {
        let cache = BenchmarkCache::new();
        let agent = Uuid::new_v4();
        cache.record(agent, 0, 1000, 50_000.0);
        let far_future = Utc::now() + Duration::hours(25);
        assert!(cache.fresh_speed(agent, 0, 1000, 24, far_future).is_none());
    }

    #[test]
    fn different_attack_mode_is_a_different_cache_entry() {
        let cache = BenchmarkCache::new();
        let agent = Uuid::new_v4();
        cache.record(agent, 0, 1000, 50_000.0);
        assert!(cache.fresh_speed(agent, 3, 1000, 24, Utc::now()).is_none());
    }
}
