//! C6 — Priority Arbiter.
//!
//! Ranks runnable jobs, picks eligible agents for each in priority order,
//! and decides preemption when a high-priority job would otherwise starve
//! (§4.6). This module only computes decisions — it never mutates a
//! [`Task`] or sends anything; the caller applies [`TickDecisions`] through
//! [`crate::task_fsm`] and the command plane.

use chrono::{DateTime, Utc};

use crate::model::{Agent, AgentId, Job, JobId, RetryReason, Task, TaskId, TaskStatus};
use crate::schedule_gate::agent_is_eligible_for_new_assignment;
use crate::settings::SchedulerSettings;

/// Ranks jobs `(priority desc, created_at asc, id asc)`, the tie-break
/// chain §4.6 requires for deterministic ordering.
pub fn rank_jobs<'a>(jobs: &'a [Job]) -> Vec<&'a Job> {
    let mut runnable: Vec<&Job> = jobs.iter().filter(|j| j.is_schedulable()).collect();
    runnable.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
    runnable
}

/// Per §4.6.1: enabled, active, heartbeat fresh, inside its schedule
/// window, below the consecutive-failure threshold, and not already at its
/// per-agent concurrency cap.
pub fn is_eligible_agent(
    agent: &Agent,
    now: DateTime<Utc>,
    running_tasks_for_agent: usize,
    settings: &SchedulerSettings,
) -> bool {
    agent.is_enabled
        && agent.status == crate::model::AgentStatus::Active
        && agent.heartbeat_is_fresh(now, settings.heartbeat_interval_secs)
        && agent.consecutive_failures < settings.consecutive_failure_threshold
        && running_tasks_for_agent < settings.max_concurrent_jobs_per_agent as usize
        && agent_is_eligible_for_new_assignment(
            settings.agent_scheduling_enabled,
            agent.scheduling_enabled,
            now,
            &agent.schedule,
        )
}

/// One unit of preemption: the task to cancel and the job it frees an
/// agent for.
#[derive(Debug, Clone)]
pub struct Preemption {
    pub victim_task_id: TaskId,
    pub victim_agent_id: AgentId,
    pub waiting_job_id: JobId,
}

/// Decides whether `waiting_job` should preempt any of `running_tasks`
/// (§4.6.3). Only called once no eligible agent remains for `waiting_job`
/// this tick. Picks the running task whose job has the strictly lowest
/// priority among those below `waiting_job`'s priority; ties broken by
/// oldest `started_at` (longest-running victim spared, newest preferred
/// for preemption) to bound how much progress is thrown away.
pub fn find_preemption_candidate<'a>(
    waiting_job: &Job,
    running_tasks: &'a [(&'a Task, &'a Job)],
    settings: &SchedulerSettings,
) -> Option<Preemption> {
    if !settings.job_interruption_enabled {
        return None;
    }
    if !waiting_job.allow_high_priority_override {
        return None;
    }
    if waiting_job.priority < settings.preemption_floor {
        return None;
    }

    running_tasks
        .iter()
        .filter(|(task, job)| task.status == TaskStatus::Running && job.priority < waiting_job.priority)
        .min_by(|(ta, ja), (tb, jb)| {
            ja.priority
                .cmp(&jb.priority)
                .reverse() // lowest-priority job first
                .then(tb.started_at.cmp(&ta.started_at)) // newest-started preferred as victim
        })
        .and_then(|(task, _)| {
            task.agent_id.map(|agent_id| Preemption {
                victim_task_id: task.id,
                victim_agent_id: agent_id,
                waiting_job_id: waiting_job.id,
            })
        })
}

/// Applies a chosen preemption: cancels the victim task and builds its
/// `pending` replacement covering the unprocessed range, per §4.6.3 /
/// §4.5's retry policy (preemption bypasses `max_chunk_retry_attempts`
/// since it isn't a failure).
pub fn apply_preemption(victim: &mut Task, now: DateTime<Utc>) -> Option<Task> {
    crate::task_fsm::cancel(victim, RetryReason::Preempted, now).ok()?;
    if victim.last_checkpoint.0 >= victim.keyspace_end.0 {
        return None;
    }
    use uuid::Uuid;
    Some(Task {
        id: Uuid::new_v4(),
        job_id: victim.job_id,
        agent_id: None,
        status: TaskStatus::Pending,
        priority: victim.priority,
        keyspace_start: victim.last_checkpoint,
        keyspace_end: victim.keyspace_end,
        keyspace_processed: crate::model::BaseKeyspace(0),
        effective_keyspace_start: None,
        effective_keyspace_end: None,
        effective_keyspace_processed: None,
        rule_start_index: victim.rule_start_index,
        rule_end_index: victim.rule_end_index,
        rule_chunk_path: victim.rule_chunk_path.clone(),
        is_rule_split_task: victim.is_rule_split_task,
        chunk_number: victim.chunk_number,
        crack_count: 0,
        retry_count: victim.retry_count,
        last_retry_reason: Some(RetryReason::Preempted),
        benchmark_speed: victim.benchmark_speed,
        average_speed: None,
        chunk_duration_secs: victim.chunk_duration_secs,
        detailed_status: None,
        error_message: None,
        created_at: now,
        assigned_at: None,
        started_at: None,
        completed_at: None,
        updated_at: now,
        last_checkpoint: victim.last_checkpoint,
        last_checkpoint_at: None,
    })
}
