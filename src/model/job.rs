use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BaseKeyspace, EffectiveKeyspace, HashlistId, JobId, UserId};

/// The hashcat attack mode integer. New modes extend this enum and the
/// matching arm in [`crate::keyspace::planner`] — attack-mode is a
/// discriminant, not an inheritance hierarchy (see design notes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum AttackMode {
    Straight = 0,
    Combinator = 1,
    Mask = 3,
    HybridWordlistMask = 6,
    HybridMaskWordlist = 7,
    Association = 9,
}

impl AttackMode {
    pub fn from_i16(v: i16) -> Option<Self> {
        Some(match v {
            0 => Self::Straight,
            1 => Self::Combinator,
            3 => Self::Mask,
            6 => Self::HybridWordlistMask,
            7 => Self::HybridMaskWordlist,
            9 => Self::Association,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }
}

/// A user-submitted attack configuration turned into a schedulable unit of
/// work. See §3 of the spec for the full field inventory and §8(1) for the
/// keyspace accounting invariant this type must uphold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub hashlist_id: HashlistId,
    pub priority: i32,
    pub hash_type: i32,
    pub attack_mode: AttackMode,
    pub wordlist_ids: Vec<i64>,
    pub rule_ids: Vec<i64>,
    pub mask: Option<String>,
    pub binary_version_id: i64,
    pub chunk_duration_secs: i64,
    pub allow_high_priority_override: bool,
    pub uses_rule_splitting: bool,

    pub base_keyspace: BaseKeyspace,
    pub effective_keyspace: EffectiveKeyspace,
    pub total_keyspace: EffectiveKeyspace,
    pub dispatched_keyspace: BaseKeyspace,
    pub processed_keyspace: EffectiveKeyspace,
    pub multiplication_factor: i64,
    pub avg_rule_multiplier: f64,
    pub is_accurate_keyspace: bool,

    pub status: JobStatus,
    pub max_agents: i32,
    pub error_message: Option<String>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Overall progress percentage, scaled against effective keyspace once
    /// known, otherwise against the initial estimate (§4.7).
    pub fn overall_progress_percent(&self) -> f64 {
        let denom = if self.effective_keyspace.0 > 0 {
            self.effective_keyspace.0
        } else {
            self.total_keyspace.0
        };
        if denom <= 0 {
            return 0.0;
        }
        (100.0 * self.processed_keyspace.0 as f64 / denom as f64).min(100.0)
    }

    pub fn remaining_base_keyspace(&self) -> BaseKeyspace {
        BaseKeyspace((self.base_keyspace.0 - self.dispatched_keyspace.0).max(0))
    }

    pub fn is_schedulable(&self) -> bool {
        matches!(self.status, JobStatus::Pending | JobStatus::Running)
            && self.remaining_base_keyspace().0 > 0
    }

    /// §8(1): 0 ≤ processed ≤ dispatched ≤ effective, checked in the unit
    /// domain each counter is actually tracked in (see design notes' Open
    /// Question resolution #2 — dispatched is base units, processed is
    /// effective units, so this only checks dispatched ≤ base here).
    pub fn check_keyspace_invariant(&self) -> Result<(), String> {
        if self.dispatched_keyspace.0 < 0 || self.dispatched_keyspace.0 > self.base_keyspace.0 {
            return Err(format!(
                "dispatched_keyspace {} out of range [0, {}]",
                self.dispatched_keyspace.0, self.base_keyspace.0
            ));
        }
        if self.effective_keyspace.0 > 0
            && (self.processed_keyspace.0 < 0 || self.processed_keyspace.0 > self.effective_keyspace.0)
        {
            return Err(format!(
                "processed_keyspace {} out of range [0, {}]",
                self.processed_keyspace.0, self.effective_keyspace.0
            ));
        }
        Ok(())
    }
}
