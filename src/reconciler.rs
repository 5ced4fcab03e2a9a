//! C7 — Progress Reconciler.
//!
//! Merges a noisy `job_progress` report into task and job counters (§4.7).
//! Decreasing `keyspace_processed` reports are ignored outright — the
//! caller should still acknowledge them to the agent, just without calling
//! [`apply`].

use chrono::{DateTime, Utc};

use crate::keyspace::refine_avg_rule_multiplier;
use crate::model::{BaseKeyspace, EffectiveKeyspace, Job, Task};

/// EWMA smoothing factor for `average_speed` (§4.7).
const SPEED_EWMA_ALPHA: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct ProgressReport {
    pub keyspace_processed: BaseKeyspace,
    pub effective_progress: EffectiveKeyspace,
    pub total_effective_keyspace: Option<i64>,
    pub is_first_update: bool,
    pub hash_rate: f64,
    pub cracked_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Applied,
    IgnoredStale,
}

/// Applies one progress report to `task` and accumulates the delta onto
/// `job`. `task.keyspace_processed` is the authority for staleness: a
/// report whose `keyspace_processed` does not exceed the task's current
/// value is a no-op (§4.7: "decreases ignored").
pub fn apply(job: &mut Job, task: &mut Task, report: &ProgressReport, now: DateTime<Utc>, rules_per_pass: i64) -> ReportOutcome {
    if task.status.is_terminal() {
        return ReportOutcome::IgnoredStale;
    }
    if report.keyspace_processed.0 <= task.keyspace_processed.0 {
        return ReportOutcome::IgnoredStale;
    }

    let previous_effective = task.effective_keyspace_processed.map(|e| e.0).unwrap_or(0);
    let delta = report.effective_progress.0 - previous_effective;

    if report.is_first_update {
        if let Some(total_effective) = report.total_effective_keyspace {
            job.effective_keyspace = EffectiveKeyspace(total_effective);
            job.is_accurate_keyspace = true;
            job.avg_rule_multiplier =
                refine_avg_rule_multiplier(total_effective, job.base_keyspace.0, rules_per_pass);
        }
    }

    task.keyspace_processed = report.keyspace_processed;
    task.effective_keyspace_processed = Some(report.effective_progress);
    task.last_checkpoint = task.keyspace_start + report.keyspace_processed;
    task.last_checkpoint_at = Some(now);
    task.crack_count += report.cracked_count;

    task.average_speed = Some(match task.average_speed {
        Some(prev) => SPEED_EWMA_ALPHA * report.hash_rate + (1.0 - SPEED_EWMA_ALPHA) * prev,
        None => report.hash_rate,
    });

    task.updated_at = now;

    if delta > 0 {
        job.processed_keyspace = EffectiveKeyspace(job.processed_keyspace.0 + delta);
    }
    job.updated_at = now;

    ReportOutcome::Applied
}

/// Job completion per §4.7: every task (across all rule chunks) terminal,
/// at least one `completed`, and no unassigned keyspace remains.
pub fn job_is_complete(job: &Job, tasks: &[Task]) -> bool {
    let all_terminal = tasks.iter().all(|t| t.status.is_terminal());
    let any_completed = tasks.iter().any(|t| t.status == crate::model::TaskStatus::Completed);
    all_terminal && any_completed && job.remaining_base_keyspace().0 == 0
}

/// All tasks terminal but none completed (or unassigned keyspace remains
/// with no retries left) — the job should fail with an aggregated error.
pub fn job_has_failed_terminally(job: &Job, tasks: &[Task], has_pending_replacement: bool) -> bool {
    let all_terminal = tasks.iter().all(|t| t.status.is_terminal());
    let any_completed = tasks.iter().any(|t| t.status == crate::model::TaskStatus::Completed);
    all_terminal && !has_pending_replacement && (!any_completed || job.remaining_base_keyspace().0 > 0)
}

#[derive(Debug, Clone)]
pub struct DeviceMetricSample {
    pub agent_id: crate::model::AgentId,
    pub device_index: i32,
    pub task_id: crate::model::TaskId,
    pub hash_rate: f64,
    pub temperature_celsius: Option<f64>,
    pub utilization_percent: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AttackMode, JobStatus, TaskStatus};
    use uuid::Uuid;

    fn job() -> Job {
        Job {
            id: Uuid::new_v4(),
            name: "j".into(),
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
            base_keyspace: BaseKeyspace(1000),
            effective_keyspace: EffectiveKeyspace(1000),
            total_keyspace: EffectiveKeyspace(1000),
            dispatched_keyspace: BaseKeyspace(1000),
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

    fn task() -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            job_id: Uuid::new_v4(),
            agent_id: Some(Uuid::new_v4()),
            status: TaskStatus::Running,
            priority: 0,
            keyspace_start: BaseKeyspace(0),
            keyspace_end: BaseKeyspace(1000),
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
            last_checkpoint: BaseKeyspace(0),
            last_checkpoint_at: None,
        }
    }

    #[test]
    fn stale_report_is_ignored() {
        let mut j = job();
        let mut t = task();
        t.keyspace_processed = BaseKeyspace(500);
        let report = ProgressReport {
            keyspace_processed: BaseKeyspace(400),
            effective_progress: EffectiveKeyspace(400),
            total_effective_keyspace: None,
            is_first_update: false,
            hash_rate: 1000.0,
            cracked_count: 0,
        };
        assert_eq!(apply(&mut j, &mut t, &report, Utc::now(), 1), ReportOutcome::IgnoredStale);
        assert_eq!(t.keyspace_processed.0, 500);
    }

    #[test]
    fn job_processed_keyspace_accumulates_by_delta_not_total() {
        let mut j = job();
        let mut t = task();
        let r1 = ProgressReport {
            keyspace_processed: BaseKeyspace(100),
            effective_progress: EffectiveKeyspace(100),
            total_effective_keyspace: None,
            is_first_update: false,
            hash_rate: 10.0,
            cracked_count: 0,
        };
        apply(&mut j, &mut t, &r1, Utc::now(), 1);
        assert_eq!(j.processed_keyspace.0, 100);

        let r2 = ProgressReport {
            keyspace_processed: BaseKeyspace(250),
            effective_progress: EffectiveKeyspace(250),
            total_effective_keyspace: None,
            is_first_update: false,
            hash_rate: 12.0,
            cracked_count: 0,
        };
        apply(&mut j, &mut t, &r2, Utc::now(), 1);
        assert_eq!(j.processed_keyspace.0, 250);
    }

    #[test]
    fn first_update_sets_authoritative_effective_keyspace() {
        let mut j = job();
        j.is_accurate_keyspace = false;
        let mut t = task();
        let report = ProgressReport {
            keyspace_processed: BaseKeyspace(100),
            effective_progress: EffectiveKeyspace(100),
            total_effective_keyspace: Some(87_000_000_000_000),
            is_first_update: true,
            hash_rate: 10.0,
            cracked_count: 0,
        };
        apply(&mut j, &mut t, &report, Utc::now(), 1);
        assert!(j.is_accurate_keyspace);
        assert_eq!(j.effective_keyspace.0, 87_000_000_000_000);
    }

    #[test]
    fn average_speed_is_ewma_smoothed() {
        let mut j = job();
        let mut t = task();
        let r1 = ProgressReport {
            keyspace_processed: BaseKeyspace(100),
            effective_progress: EffectiveKeyspace(100),
            total_effective_keyspace: None,
            is_first_update: false,
            hash_rate: 100.0,
            cracked_count: 0,
        };
        apply(&mut j, &mut t, &r1, Utc::now(), 1);
        assert_eq!(t.average_speed, Some(100.0));

        let r2 = ProgressReport {
            keyspace_processed: BaseKeyspace(200),
            effective_progress: EffectiveKeyspace(200),
            total_effective_keyspace: None,
            is_first_update: false,
            hash_rate: 200.0,
            cracked_count: 0,
        };
        apply(&mut j, &mut t, &r2, Utc::now(), 1);
        // 0.3*200 + 0.7*100 = 130
        assert!((t.average_speed.unwrap() - 130.0).abs() < 1e-9);
    }

    #[test]
    fn job_completes_when_all_tasks_terminal_and_one_completed() {
        let j = job();
        let mut t = task();
        t.status = TaskStatus::Completed;
        assert!(job_is_complete(&j, &[t]));
    }

    #[test]
    fn job_not_complete_while_a_task_is_still_running() {
        let j = job();
        let t = task();
        assert!(!job_is_complete(&j, &[t]));
    }

    #[test]
    fn progress_on_a_terminal_task_is_ignored() {
        let mut j = job();
        let mut t = task();
        t.status = TaskStatus::Cancelled;
        let report = ProgressReport {
            keyspace_processed: BaseKeyspace(999),
            effective_progress: EffectiveKeyspace(999),
            total_effective_keyspace: None,
            is_first_update: false,
            hash_rate: 100.0,
            cracked_count: 5,
        };
        let outcome = apply(&mut j, &mut t, &report, Utc::now(), 1);
        assert_eq!(outcome, ReportOutcome::IgnoredStale);
        assert_eq!(t.keyspace_processed.0, 0);
        assert_eq!(j.processed_keyspace.0, 0);
    }
}
