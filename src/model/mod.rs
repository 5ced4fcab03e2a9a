//! Core data model: jobs, tasks, agents, benchmarks, hashlists.
//!
//! Types here are plain data — the state machine logic that mutates them
//! lives in [`crate::task_fsm`], [`crate::arbiter`], and [`crate::reconciler`].

pub mod agent;
pub mod benchmark;
pub mod hashlist;
pub mod job;
pub mod task;

pub use agent::{Agent, AgentDevice, AgentStatus, DaySchedule, DeviceType};
pub use benchmark::{BenchmarkEntry, BenchmarkKey};
pub use hashlist::{Hash, Hashlist};
pub use job::{AttackMode, Job, JobStatus};
pub use task::{RetryReason, Task, TaskStatus};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Keyspace expressed in base (wordlist-position / hashcat restore-point)
/// units. Distinct from [`EffectiveKeyspace`] so the two coordinate systems
/// documented in the design notes' "rule-split accounting duality" cannot be
/// conflated at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BaseKeyspace(pub i64);

/// Keyspace expressed in effective (base × rule-multiplier, what the user
/// sees as progress) units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EffectiveKeyspace(pub i64);

impl fmt::Display for BaseKeyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for EffectiveKeyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for BaseKeyspace {
    type Output = BaseKeyspace;
    fn add(self, rhs: Self) -> Self::Output {
        BaseKeyspace(self.0 + rhs.0)
    }
}

impl std::ops::Sub for BaseKeyspace {
    type Output = BaseKeyspace;
    fn sub(self, rhs: Self) -> Self::Output {
        BaseKeyspace(self.0 - rhs.0)
    }
}

pub type JobId = uuid::Uuid;
pub type TaskId = uuid::Uuid;
pub type AgentId = uuid::Uuid;
pub type HashlistId = uuid::Uuid;
pub type UserId = uuid::Uuid;
