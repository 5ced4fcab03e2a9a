//! C5 — Task Lifecycle FSM.
//!
//! Every transition named in §4.5, plus the replacement-task construction
//! each failure path implies. No function here ever moves a terminal task
//! back to a non-terminal status (Testable Property 3).

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{RetryReason, Task, TaskStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmError {
    /// Attempted transition out of a terminal state.
    AlreadyTerminal,
    /// Transition not valid from the task's current state.
    InvalidTransition,
}

/// `pending -> assigned`, on a successful dispatcher carve + send.
pub fn assign(task: &mut Task, agent_id: uuid::Uuid, now: DateTime<Utc>) -> Result<(), FsmError> {
    if task.status != TaskStatus::Pending {
        return Err(FsmError::InvalidTransition);
    }
    task.agent_id = Some(agent_id);
    task.status = TaskStatus::Assigned;
    task.assigned_at = Some(now);
    task.updated_at = now;
    Ok(())
}

/// `assigned -> running`, on the first progress update for the task.
pub fn start_running(task: &mut Task, now: DateTime<Utc>) -> Result<(), FsmError> {
    match task.status {
        TaskStatus::Assigned | TaskStatus::ReconnectPending => {
            task.status = TaskStatus::Running;
            if task.started_at.is_none() {
                task.started_at = Some(now);
            }
            task.updated_at = now;
            Ok(())
        }
        TaskStatus::Running => Ok(()), // idempotent
        _ if task.status.is_terminal() => Err(FsmError::AlreadyTerminal),
        _ => Err(FsmError::InvalidTransition),
    }
}

/// `running -> running`, applying a progress report. Purely updates the
/// monotone counter; callers (the reconciler) are responsible for ignoring
/// decreasing reports before calling this.
pub fn apply_progress(task: &mut Task, processed: crate::model::BaseKeyspace, now: DateTime<Utc>) -> Result<(), FsmError> {
    if task.status.is_terminal() {
        return Err(FsmError::AlreadyTerminal);
    }
    if processed.0 > task.keyspace_processed.0 {
        task.keyspace_processed = processed;
        task.last_checkpoint = processed + task.keyspace_start;
        task.last_checkpoint_at = Some(now);
    }
    task.updated_at = now;
    Ok(())
}

/// `running -> completed`.
pub fn complete(task: &mut Task, now: DateTime<Utc>) -> Result<(), FsmError> {
    if task.status.is_terminal() {
        return Err(FsmError::AlreadyTerminal);
    }
    task.status = TaskStatus::Completed;
    task.completed_at = Some(now);
    task.updated_at = now;
    Ok(())
}

/// `running -> failed`, on an agent-reported error.
pub fn fail(task: &mut Task, reason: RetryReason, error_message: Option<String>, now: DateTime<Utc>) -> Result<(), FsmError> {
    if task.status.is_terminal() {
        return Err(FsmError::AlreadyTerminal);
    }
    task.status = TaskStatus::Failed;
    task.last_retry_reason = Some(reason);
    task.error_message = error_message;
    task.completed_at = Some(now);
    task.updated_at = now;
    Ok(())
}

/// `{assigned,running} -> reconnect_pending`, on command-plane link drop or
/// backend restart.
pub fn mark_reconnect_pending(task: &mut Task, now: DateTime<Utc>) -> Result<(), FsmError> {
    match task.status {
        TaskStatus::Assigned | TaskStatus::Running => {
            task.status = TaskStatus::ReconnectPending;
            task.updated_at = now;
            Ok(())
        }
        _ if task.status.is_terminal() => Err(FsmError::AlreadyTerminal),
        _ => Err(FsmError::InvalidTransition),
    }
}

/// `reconnect_pending -> running`, same agent reconnects within the grace
/// period reporting the same task id.
pub fn reconnect(task: &mut Task, now: DateTime<Utc>) -> Result<(), FsmError> {
    if task.status != TaskStatus::ReconnectPending {
        return Err(FsmError::InvalidTransition);
    }
    task.status = TaskStatus::Running;
    task.updated_at = now;
    Ok(())
}

/// `* -> cancelled`, explicit cancel/delete or preemption. Immediately
/// terminal regardless of agent acknowledgement.
pub fn cancel(task: &mut Task, reason: RetryReason, now: DateTime<Utc>) -> Result<(), FsmError> {
    if task.status.is_terminal() {
        return Err(FsmError::AlreadyTerminal);
    }
    task.status = TaskStatus::Cancelled;
    task.last_retry_reason = Some(reason);
    task.completed_at = Some(now);
    task.updated_at = now;
    Ok(())
}

/// Builds a replacement `pending` task covering `[task.last_checkpoint,
/// task.keyspace_end)`, carrying `retry_count + 1` and the given reason.
/// Returns `None` once `retry_count >= max_retries`, per §4.5's retry
/// policy — the caller then lets the job fail with the aggregated error
/// instead of retrying further.
pub fn build_replacement(task: &Task, reason: RetryReason, max_retries: i32, now: DateTime<Utc>) -> Option<Task> {
    if task.retry_count >= max_retries {
        return None;
    }
    if task.last_checkpoint.0 >= task.keyspace_end.0 {
        return None;
    }
    Some(Task {
        id: Uuid::new_v4(),
        job_id: task.job_id,
        agent_id: None,
        status: TaskStatus::Pending,
        priority: task.priority,

        keyspace_start: task.last_checkpoint,
        keyspace_end: task.keyspace_end,
        keyspace_processed: crate::model::BaseKeyspace(0),

        effective_keyspace_start: None,
        effective_keyspace_end: None,
        effective_keyspace_processed: None,

        rule_start_index: task.rule_start_index,
        rule_end_index: task.rule_end_index,
        rule_chunk_path: task.rule_chunk_path.clone(),
        is_rule_split_task: task.is_rule_split_task,

        chunk_number: task.chunk_number,
        crack_count: 0,
        retry_count: task.retry_count + 1,
        last_retry_reason: Some(reason),

        benchmark_speed: task.benchmark_speed,
        average_speed: None,
        chunk_duration_secs: task.chunk_duration_secs,

        detailed_status: None,
        error_message: None,

        created_at: now,
        assigned_at: None,
        started_at: None,
        completed_at: None,
        updated_at: now,
        last_checkpoint: task.last_checkpoint,
        last_checkpoint_at: None,
    })
}
