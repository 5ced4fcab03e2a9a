use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AgentId, BaseKeyspace, EffectiveKeyspace, JobId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    ReconnectPending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Why a replacement task was created, per Open Question resolution #3: a
/// single `retry_count` is kept (as the distilled spec mandates) but this
/// field lets reporting distinguish the cause without a second counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryReason {
    NoStart,
    ReconnectTimeout,
    AgentFailure,
    Preempted,
}

/// A single unit of work assigned to a single agent, owning a keyspace range
/// and possibly a rule-chunk slice. See §3 and §4.5 for the full lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub job_id: JobId,
    pub agent_id: Option<AgentId>,
    pub status: TaskStatus,
    /// Frozen at creation time from the owning job's priority.
    pub priority: i32,

    pub keyspace_start: BaseKeyspace,
    pub keyspace_end: BaseKeyspace,
    pub keyspace_processed: BaseKeyspace,

    pub effective_keyspace_start: Option<EffectiveKeyspace>,
    pub effective_keyspace_end: Option<EffectiveKeyspace>,
    pub effective_keyspace_processed: Option<EffectiveKeyspace>,

    pub rule_start_index: Option<i64>,
    pub rule_end_index: Option<i64>,
    pub rule_chunk_path: Option<String>,
    pub is_rule_split_task: bool,

    pub chunk_number: i64,
    pub crack_count: i64,
    pub retry_count: i32,
    pub last_retry_reason: Option<RetryReason>,

    pub benchmark_speed: Option<f64>,
    pub average_speed: Option<f64>,
    pub chunk_duration_secs: i64,

    pub detailed_status: Option<String>,
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Restore point: the base-keyspace offset a resumed task continues
    /// from. Updated on every progress report.
    pub last_checkpoint: BaseKeyspace,
    pub last_checkpoint_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn size(&self) -> BaseKeyspace {
        self.keyspace_end - self.keyspace_start
    }

    pub fn unprocessed_range(&self) -> (BaseKeyspace, BaseKeyspace) {
        (self.last_checkpoint, self.keyspace_end)
    }
}
