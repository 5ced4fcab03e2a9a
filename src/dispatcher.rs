//! C4 — Chunk Dispatcher.
//!
//! Carves one pending [`Task`] out of a job's remaining keyspace for a
//! specific agent, sized from that agent's benchmarked throughput and the
//! job's target chunk duration, with tail absorption so a job never leaves
//! a sliver too small to be worth a full task (§4.4).

use chrono::Utc;
use uuid::Uuid;

use crate::model::{AgentId, BaseKeyspace, Job, Task, TaskStatus};
use crate::settings::SchedulerSettings;

/// `chunk_size = speed(H/s) × job.chunk_duration_secs`, floored to whole
/// keyspace units and never less than 1 when any keyspace remains.
fn nominal_chunk_size(hashes_per_second: f64, chunk_duration_secs: i64) -> i64 {
    ((hashes_per_second * chunk_duration_secs as f64).floor() as i64).max(1)
}

/// Carves the next task for `job` on `agent_id` at the given benchmarked
/// speed, against the remaining keyspace of the *current* rule chunk
/// (`rule_chunk_remaining` — for a non-rule-split job this is simply the
/// job's whole remaining base keyspace).
///
/// Tail absorption: if what remains fits within `chunk_size × (1 +
/// fluctuation_pct/100)`, the whole remainder is carved so no sliver task
/// is left behind; otherwise exactly `chunk_size` is carved.
pub fn carve(
    job: &Job,
    agent_id: AgentId,
    hashes_per_second: f64,
    rule_chunk_remaining: BaseKeyspace,
    rule_range: Option<(i64, i64)>,
    settings: &SchedulerSettings,
) -> Option<Task> {
    if rule_chunk_remaining.0 <= 0 {
        return None;
    }

    let chunk_size = nominal_chunk_size(hashes_per_second, job.chunk_duration_secs);
    let fluctuation_cap =
        (chunk_size as f64 * (1.0 + settings.chunk_fluctuation_percentage as f64 / 100.0)) as i64;

    let size = if rule_chunk_remaining.0 <= fluctuation_cap {
        rule_chunk_remaining.0
    } else {
        chunk_size
    };

    // The offset within the job's overall range is wherever dispatched_keyspace
    // currently points; rule_chunk_remaining only bounds how much is left to carve.
    let keyspace_start = BaseKeyspace(job.dispatched_keyspace.0);
    let keyspace_end = BaseKeyspace(job.dispatched_keyspace.0 + size);

    let now = Utc::now();
    Some(Task {
        id: Uuid::new_v4(),
        job_id: job.id,
        agent_id: Some(agent_id),
        status: TaskStatus::Pending,
        priority: job.priority,

        keyspace_start,
        keyspace_end,
        keyspace_processed: BaseKeyspace(0),

        effective_keyspace_start: None,
        effective_keyspace_end: None,
        effective_keyspace_processed: None,

        rule_start_index: rule_range.map(|(s, _)| s),
        rule_end_index: rule_range.map(|(_, e)| e),
        rule_chunk_path: None,
        is_rule_split_task: rule_range.is_some(),

        chunk_number: 0,
        crack_count: 0,
        retry_count: 0,
        last_retry_reason: None,

        benchmark_speed: Some(hashes_per_second),
        average_speed: None,
        chunk_duration_secs: job.chunk_duration_secs,

        detailed_status: None,
        error_message: None,

        created_at: now,
        assigned_at: None,
        started_at: None,
        completed_at: None,
        updated_at: now,
        last_checkpoint: keyspace_start,
        last_checkpoint_at: None,
    })
}

/// Sorts agents by ascending `last_assignment_time` so equally eligible
/// agents are offered work fairly (§4.4). Agents with no prior assignment
/// sort first.
pub fn fairness_order(mut agents: Vec<(AgentId, Option<chrono::DateTime<Utc>>)>) -> Vec<AgentId> {
    agents.sort_by(|a, b| match (a.1, b.1) {
        (None, None) => std::cmp::Ordering::Equal,
        (None, Some(_)) => std::cmp::Ordering::Less,
        (Some(_), None) => std::cmp::Ordering::Greater,
        (Some(x), Some(y)) => x.cmp(&y),
    });
    agents.into_iter().map(|(id, _)| id).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttackMode, EffectiveKeyspace, JobStatus};

    fn sample_job() -> Job {
        Job {
            id: Uuid::new_v4(),
            name: "test".into(),
            hashlist_id: Uuid::new_v4(),
            priority: 0,
            hash_type: 0,
            attack_mode: AttackMode::Straight,
            wordlist_ids: vec![],
            rule_ids: vec![],
            mask: None,
            binary_version_id: 1,
            chunk_duration_secs: 60,
            allow_high_priority_override: false,
            uses_rule_splitting: false,
            base_keyspace: BaseKeyspace(1_000_000),
            effective_keyspace: EffectiveKeyspace(1_000_000),
            total_keyspace: EffectiveKeyspace(1_000_000),
            dispatched_keyspace: BaseKeyspace(0),
            processed_keyspace: EffectiveKeyspace(0),
            multiplication_factor: 1,
            avg_rule_multiplier: 1.0,
            is_accurate_keyspace: false,
            status: JobStatus::Running,
            max_agents: 0,
            error_message: None,
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn carves_exactly_chunk_size_when_remainder_is_large() {
        let job = sample_job();
        let settings = SchedulerSettings::default();
        let task = carve(&job, Uuid::new_v4(), 1_000.0, job.remaining_base_keyspace(), None, &settings)
            .unwrap();
        assert_eq!(task.size().0, 1_000 * 60);
        assert_eq!(task.keyspace_start.0, 0);
    }

    #[test]
    fn absorbs_tail_when_remainder_fits_fluctuation_cap() {
        let mut job = sample_job();
        job.dispatched_keyspace = BaseKeyspace(999_000);
        job.base_keyspace = BaseKeyspace(1_000_000);
        let settings = SchedulerSettings::default();
        let task = carve(&job, Uuid::new_v4(), 1_000.0, job.remaining_base_keyspace(), None, &settings)
            .unwrap();
        assert_eq!(task.keyspace_end.0, 1_000_000);
        assert_eq!(task.size().0, 1_000);
    }

    #[test]
    fn returns_none_when_nothing_remains() {
        let mut job = sample_job();
        job.dispatched_keyspace = job.base_keyspace;
        let settings = SchedulerSettings::default();
        assert!(carve(&job, Uuid::new_v4(), 1_000.0, job.remaining_base_keyspace(), None, &settings).is_none());
    }

    #[test]
    fn fairness_order_prefers_agents_with_no_prior_assignment() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ordered = fairness_order(vec![(a, Some(Utc::now())), (b, None)]);
        assert_eq!(ordered, vec![b, a]);
    }
}
