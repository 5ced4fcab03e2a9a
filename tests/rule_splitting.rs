//! S5: a rule-based job whose full-keyspace pass would take far longer than
//! its chunk duration gets split into rule-index chunks, and a carved task
//! for one chunk carries the full `[0, base)` keyspace range plus a rule
//! slice rather than a sliced keyspace range.

use uuid::Uuid;

use krakenhashes_core::dispatcher::carve;
use krakenhashes_core::model::{AttackMode, BaseKeyspace, EffectiveKeyspace, Job, JobStatus};
use krakenhashes_core::rule_splitter::{compute_rule_chunks, should_split};
use krakenhashes_core::settings::SchedulerSettings;

fn s5_job() -> Job {
    Job {
        id: Uuid::new_v4(),
        name: "s5".into(),
        hashlist_id: Uuid::new_v4(),
        priority: 0,
        hash_type: 0,
        attack_mode: AttackMode::Straight,
        wordlist_ids: vec![1],
        rule_ids: vec![1],
        mask: None,
        binary_version_id: 1,
        chunk_duration_secs: 60,
        allow_high_priority_override: false,
        uses_rule_splitting: true,
        base_keyspace: BaseKeyspace(1_000_000_000),
        effective_keyspace: EffectiveKeyspace(100_000_000_000_000),
        total_keyspace: EffectiveKeyspace(100_000_000_000_000),
        dispatched_keyspace: BaseKeyspace(0),
        processed_keyspace: EffectiveKeyspace(0),
        multiplication_factor: 100_000,
        avg_rule_multiplier: 100_000.0,
        is_accurate_keyspace: false,
        status: JobStatus::Running,
        max_agents: 0,
        error_message: None,
        created_by: Uuid::new_v4(),
        created_at: chrono::Utc::now(),
        started_at: None,
        completed_at: None,
        updated_at: chrono::Utc::now(),
    }
}

#[test]
fn s5_decides_to_split_and_produces_at_least_ten_thousand_chunks() {
    let job = s5_job();
    let threshold = 2.0;

    assert!(should_split(
        job.uses_rule_splitting,
        job.base_keyspace,
        100_000,
        1e8,
        job.chunk_duration_secs,
        threshold,
        1_000,
    ));

    let chunks = compute_rule_chunks(job.base_keyspace, 100_000, 1e8, job.chunk_duration_secs, 0, 50_000);
    assert!(chunks.len() >= 10_000, "got {} chunks", chunks.len());
    assert_eq!(chunks.first().unwrap().rule_start_index, 0);
    assert_eq!(chunks.last().unwrap().rule_end_index, 100_000);
}

#[test]
fn rule_split_task_carries_full_keyspace_and_a_rule_slice() {
    let job = s5_job();
    let chunks = compute_rule_chunks(job.base_keyspace, 100_000, 1e8, job.chunk_duration_secs, 0, 50_000);
    let first_chunk = chunks[0];
    let settings = SchedulerSettings::default();

    let task = carve(
        &job,
        Uuid::new_v4(),
        1e8,
        job.base_keyspace,
        Some((first_chunk.rule_start_index, first_chunk.rule_end_index)),
        &settings,
    )
    .unwrap();

    assert!(task.is_rule_split_task);
    assert_eq!(task.rule_start_index, Some(first_chunk.rule_start_index));
    assert_eq!(task.rule_end_index, Some(first_chunk.rule_end_index));
    assert_eq!(task.keyspace_start.0, 0);
    assert_eq!(task.keyspace_end.0, job.base_keyspace.0);
}
