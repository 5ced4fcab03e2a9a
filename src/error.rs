//! Crate-wide error taxonomy.
//!
//! Mirrors the five non-validation kinds from the error handling design:
//! validation, transient transport, task execution failure, accounting
//! impossibility, and fatal. Preemption is deliberately absent — it is an
//! administrative outcome, not an error (see `TaskFsm::preempt`).

use thiserror::Error;

pub type SchedulerResult<T> = Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("transient transport error: {0}")]
    Transient(String),

    #[error("task execution failed: {0}")]
    TaskExecution(String),

    #[error("keyspace accounting impossible: {0}")]
    AccountingImpossible(String),

    #[error("fatal: invariant violated: {0}")]
    Fatal(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("config error: {0}")]
    Config(#[from] krakenhashes_config::ConfigError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchedulerError {
    /// Transient errors are retried at the component boundary and never
    /// surfaced to the user directly (see §7 propagation policy).
    pub fn is_transient(&self) -> bool {
        matches!(self, SchedulerError::Transient(_))
    }

    /// Fatal errors are logged with full context and transition the
    /// offending job to `failed` with a generic message.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SchedulerError::Fatal(_))
    }

    /// Accounting impossibilities park a job `pending` with a user-visible
    /// reason rather than failing it outright.
    pub fn is_accounting_impossible(&self) -> bool {
        matches!(self, SchedulerError::AccountingImpossible(_))
    }
}
