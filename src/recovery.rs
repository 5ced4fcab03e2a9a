//! C11 — Recovery Coordinator.
//!
//! On process start, every task the store still shows as `{assigned,
//! running}` is presumed orphaned by the restart (its in-memory agent
//! connection is gone) and moved to `reconnect_pending` with a deadline.
//! The periodic sweep (§4.11, §5) then fails anything that outlives its
//! grace period, handing off to [`crate::task_fsm::build_replacement`] for
//! the retry.

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use crate::model::{RetryReason, Task, TaskStatus};
use crate::store::SchedulerStore;

/// Step 1 of startup recovery (§4.11.1): every `{assigned, running}` task
/// is marked `reconnect_pending`. Returns the number of tasks moved, for
/// the startup log line.
pub async fn recover_in_flight_tasks(store: &dyn SchedulerStore, now: DateTime<Utc>) -> crate::error::SchedulerResult<usize> {
    let mut moved = 0;
    for status in [TaskStatus::Assigned, TaskStatus::Running] {
        for mut task in store.list_tasks_by_status(status).await? {
            if crate::task_fsm::mark_reconnect_pending(&mut task, now).is_ok() {
                store.save_task(&task).await?;
                moved += 1;
            }
        }
    }
    info!(moved, "startup recovery: marked in-flight tasks reconnect_pending");
    Ok(moved)
}

/// A `reconnect_pending` task is eligible for the reconnect-timeout failure
/// once `reconnect_grace_period` has elapsed since it last updated (§4.11.4).
/// The deadline is derived from `updated_at` — the moment the task entered
/// `reconnect_pending` — rather than stored separately, since nothing else
/// touches a `reconnect_pending` task's `updated_at` before it either
/// reconnects (leaving the state) or times out.
pub fn is_past_reconnect_deadline(task: &Task, now: DateTime<Utc>, grace_period_secs: i64) -> bool {
    task.status == TaskStatus::ReconnectPending
        && now - task.updated_at >= Duration::seconds(grace_period_secs)
}

/// One sweep outcome: the failed original plus its replacement, if any
/// retries remain.
pub struct SweptTask {
    pub failed: Task,
    pub replacement: Option<Task>,
}

/// Step 4 of §4.11: runs every 30s in production. Fails every
/// `reconnect_pending` task past its deadline with reason
/// `reconnect-timeout` and builds a `pending` replacement from its last
/// checkpoint, deferring to the same retry-exhaustion rule as any other
/// failure (§4.5).
pub async fn sweep_reconnect_timeouts(
    store: &dyn SchedulerStore,
    now: DateTime<Utc>,
    grace_period_secs: i64,
    max_chunk_retry_attempts: i32,
) -> crate::error::SchedulerResult<Vec<SweptTask>> {
    let mut swept = Vec::new();
    for mut task in store.list_tasks_by_status(TaskStatus::ReconnectPending).await? {
        if !is_past_reconnect_deadline(&task, now, grace_period_secs) {
            continue;
        }
        if crate::task_fsm::fail(
            &mut task,
            RetryReason::ReconnectTimeout,
            Some("reconnect grace period elapsed".to_string()),
            now,
        )
        .is_err()
        {
            continue;
        }
        store.save_task(&task).await?;
        let replacement =
            crate::task_fsm::build_replacement(&task, RetryReason::ReconnectTimeout, max_chunk_retry_attempts, now);
        if let Some(r) = &replacement {
            store.save_task(r).await?;
        } else {
            warn!(task_id = %task.id, "reconnect-timeout with no retries remaining; job will fail once all tasks terminal");
        }
        swept.push(SweptTask { failed: task, replacement });
    }
    Ok(swept)
}

/// Step 3 of §4.11: when an agent reconnects and claims it is still running
/// a task this server tracks as `reconnect_pending`, that task resumes
/// rather than being replaced. Returns `true` if the task was resumed.
pub async fn resume_on_reconnect(
    store: &dyn SchedulerStore,
    task_id: crate::model::TaskId,
    reporting_agent_id: crate::model::AgentId,
    now: DateTime<Utc>,
) -> crate::error::SchedulerResult<bool> {
    let mut task = store.get_task(task_id).await?;
    if task.status != TaskStatus::ReconnectPending {
        return Ok(false);
    }
    if task.agent_id != Some(reporting_agent_id) {
        warn!(task_id = %task_id, "reconnect claimed by non-owning agent, ignoring");
        return Ok(false);
    }
    crate::task_fsm::reconnect(&mut task, now)
        .map_err(|_| crate::error::SchedulerError::Fatal("reconnect transition rejected".into()))?;
    store.save_task(&task).await?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BaseKeyspace;
    use uuid::Uuid;

    fn task_with_status(status: TaskStatus, updated_at: DateTime<Utc>) -> Task {
        Task {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            agent_id: Some(Uuid::new_v4()),
            status,
            priority: 0,
            keyspace_start: BaseKeyspace(0),
            keyspace_end: BaseKeyspace(1000),
            keyspace_processed: BaseKeyspace(200),
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
            created_at: updated_at,
            assigned_at: Some(updated_at),
            started_at: Some(updated_at),
            completed_at: None,
            updated_at,
            last_checkpoint: BaseKeyspace(200),
            last_checkpoint_at: Some(updated_at),
        }
    }

    #[test]
    fn not_past_deadline_within_grace_period() {
        let now = Utc::now();
        let task = task_with_status(TaskStatus::ReconnectPending, now - Duration::seconds(60));
        assert!(!is_past_reconnect_deadline(&task, now, 300));
    }

    #[test]
    fn past_deadline_once_grace_period_elapses() {
        let now = Utc::now();
        let task = task_with_status(TaskStatus::ReconnectPending, now - Duration::seconds(301));
        assert!(is_past_reconnect_deadline(&task, now, 300));
    }

    #[test]
    fn non_reconnect_pending_task_is_never_past_deadline() {
        let now = Utc::now();
        let task = task_with_status(TaskStatus::Running, now - Duration::seconds(10_000));
        assert!(!is_past_reconnect_deadline(&task, now, 300));
    }
}
