//! S3 (reconnect within grace period: resumes in place, no replacement) and
//! S4 (reconnect beyond grace period: fails with reconnect-timeout, a
//! pending replacement picks up from the last checkpoint, and the agent is
//! free for new work again).

use chrono::{Duration, Utc};
use uuid::Uuid;

use krakenhashes_core::model::{BaseKeyspace, Task, TaskStatus};
use krakenhashes_core::recovery::{resume_on_reconnect, sweep_reconnect_timeouts};
use krakenhashes_core::store::{InMemoryStore, SchedulerStore};

fn reconnect_pending_task(agent_id: Uuid, updated_at: chrono::DateTime<Utc>) -> Task {
    Task {
        id: Uuid::new_v4(),
        job_id: Uuid::new_v4(),
        agent_id: Some(agent_id),
        status: TaskStatus::ReconnectPending,
        priority: 0,
        keyspace_start: BaseKeyspace(0),
        keyspace_end: BaseKeyspace(1_000_000),
        keyspace_processed: BaseKeyspace(250_000),
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
        benchmark_speed: Some(10_000.0),
        average_speed: Some(10_000.0),
        chunk_duration_secs: 60,
        detailed_status: None,
        error_message: None,
        created_at: updated_at,
        assigned_at: Some(updated_at),
        started_at: Some(updated_at),
        completed_at: None,
        updated_at,
        last_checkpoint: BaseKeyspace(250_000),
        last_checkpoint_at: Some(updated_at),
    }
}

#[tokio::test]
async fn s3_reconnect_within_grace_period_resumes_without_a_replacement() {
    let store = InMemoryStore::new();
    let agent_id = Uuid::new_v4();
    let now = Utc::now();
    let task = reconnect_pending_task(agent_id, now - Duration::seconds(60));
    let task_id = task.id;
    store.save_task(&task).await.unwrap();

    let resumed = resume_on_reconnect(&store, task_id, agent_id, now).await.unwrap();
    assert!(resumed);

    let after = store.get_task(task_id).await.unwrap();
    assert_eq!(after.status, TaskStatus::Running);
    assert_eq!(after.keyspace_processed.0, 250_000, "reconnect does not reset progress");

    // grace period (default 300s) has not elapsed, so a sweep at the same
    // instant finds nothing left reconnect_pending for this agent to fail.
    let swept = sweep_reconnect_timeouts(&store, now, 300, 5).await.unwrap();
    assert!(swept.is_empty());
}

#[tokio::test]
async fn s4_reconnect_beyond_grace_period_fails_and_replaces_from_checkpoint() {
    let store = InMemoryStore::new();
    let agent_id = Uuid::new_v4();
    let now = Utc::now();
    // S4: agent drops at t=0 and only returns after the 300s grace period,
    // so the periodic sweep observes it ~310s stale.
    let task = reconnect_pending_task(agent_id, now - Duration::seconds(310));
    let task_id = task.id;
    store.save_task(&task).await.unwrap();

    let swept = sweep_reconnect_timeouts(&store, now, 300, 5).await.unwrap();
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].failed.status, TaskStatus::Failed);

    let replacement = swept[0].replacement.as_ref().expect("retries remain");
    assert_eq!(replacement.status, TaskStatus::Pending);
    assert_eq!(replacement.keyspace_start.0, 250_000, "replacement starts at last_checkpoint");
    assert_eq!(replacement.keyspace_end.0, 1_000_000);
    assert_eq!(replacement.retry_count, 1);
    assert!(replacement.agent_id.is_none(), "replacement is unassigned, freeing the agent for new work");

    // A late reconnect attempt for the now-failed original task is rejected.
    let resumed = resume_on_reconnect(&store, task_id, agent_id, now).await.unwrap();
    assert!(!resumed);
}
