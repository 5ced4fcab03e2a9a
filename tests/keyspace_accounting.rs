//! S1 and S6: keyspace carving sums exactly to the job's base keyspace,
//! and a first progress report's authoritative total overrides the
//! planner's estimate without disturbing dispatched_keyspace accounting.

use chrono::Utc;
use uuid::Uuid;

use krakenhashes_core::dispatcher::carve;
use krakenhashes_core::model::{AttackMode, BaseKeyspace, EffectiveKeyspace, Job, JobStatus, Task, TaskStatus};
use krakenhashes_core::reconciler::{apply, ProgressReport};
use krakenhashes_core::settings::SchedulerSettings;

fn running_task(job_id: uuid::Uuid, start: BaseKeyspace, end: BaseKeyspace) -> Task {
    let now = Utc::now();
    Task {
        id: Uuid::new_v4(),
        job_id,
        agent_id: Some(Uuid::new_v4()),
        status: TaskStatus::Running,
        priority: 0,
        keyspace_start: start,
        keyspace_end: end,
        keyspace_processed: BaseKeyspace(0),
        effective_keyspace_start: None,
        effective_keyspace_end: None,
        effective_keyspace_processed: None,
        rule_start_index: None,
        rule_end_index: None,
        rule_chunk_path: None,
        is_rule_split_task: false,
        chunk_number: 0,
        crack_count: 0,
        retry_count: 0,
        last_retry_reason: None,
        benchmark_speed: None,
        average_speed: None,
        chunk_duration_secs: 60,
        detailed_status: None,
        error_message: None,
        created_at: now,
        assigned_at: None,
        started_at: Some(now),
        completed_at: None,
        updated_at: now,
        last_checkpoint: start,
        last_checkpoint_at: None,
    }
}

fn s1_job() -> Job {
    Job {
        id: Uuid::new_v4(),
        name: "s1".into(),
        hashlist_id: Uuid::new_v4(),
        priority: 0,
        hash_type: 0,
        attack_mode: AttackMode::Straight,
        wordlist_ids: vec![1],
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
fn s1_two_tasks_absorb_the_tail_exactly() {
    let mut job = s1_job();
    let settings = SchedulerSettings::default();
    let agent = Uuid::new_v4();

    let first = carve(&job, agent, 10_000.0, job.remaining_base_keyspace(), None, &settings).unwrap();
    assert_eq!(first.size().0, 600_000);
    job.dispatched_keyspace = BaseKeyspace(job.dispatched_keyspace.0 + first.size().0);

    let second = carve(&job, agent, 10_000.0, job.remaining_base_keyspace(), None, &settings).unwrap();
    assert_eq!(second.size().0, 400_000);
    job.dispatched_keyspace = BaseKeyspace(job.dispatched_keyspace.0 + second.size().0);

    assert_eq!(job.dispatched_keyspace.0, job.base_keyspace.0);
    assert!(carve(&job, agent, 10_000.0, job.remaining_base_keyspace(), None, &settings).is_none());

    job.processed_keyspace = EffectiveKeyspace(first.size().0 + second.size().0);
    assert_eq!(job.processed_keyspace.0, 1_000_000);
}

#[test]
fn s6_first_report_overrides_estimate_without_rescaling_dispatched() {
    let mut job = s1_job();
    job.base_keyspace = BaseKeyspace(1_000_000_000);
    job.effective_keyspace = EffectiveKeyspace(1_000_000_000_000);
    job.total_keyspace = EffectiveKeyspace(1_000_000_000_000);
    job.multiplication_factor = 1_000;
    job.dispatched_keyspace = BaseKeyspace(100_000);

    let mut task = running_task(job.id, BaseKeyspace(0), BaseKeyspace(100_000));

    let report = ProgressReport {
        keyspace_processed: BaseKeyspace(1),
        effective_progress: EffectiveKeyspace(1_000),
        total_effective_keyspace: Some(870_000_000_000),
        is_first_update: true,
        hash_rate: 50_000.0,
        cracked_count: 0,
    };

    apply(&mut job, &mut task, &report, Utc::now(), 1_000);

    assert!(job.is_accurate_keyspace);
    assert_eq!(job.effective_keyspace.0, 870_000_000_000);
    // dispatched_keyspace was accounted in base units and is untouched by
    // the effective-keyspace correction (Open Question resolution #2).
    assert_eq!(job.dispatched_keyspace.0, 100_000);
}
