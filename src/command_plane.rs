//! C9 — Command Plane wiring.
//!
//! Connects [`krakenhashes_agent_plane`]'s transport to the scheduler core:
//! authenticates agents against the store, turns outbound decisions into
//! wire messages, and routes each [`InboundEvent`] into the reconciler,
//! task FSM, or crack ingest as appropriate.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{error, warn};
use uuid::Uuid;

use krakenhashes_agent_plane::messages::{
    BenchmarkResultPayload, CommandPlaneMessage, CrackedHash, JobProgressPayload, JobStopPayload,
    ReportedTaskStatus, TaskAssignmentPayload, TaskStatusPayload,
};
use krakenhashes_agent_plane::server::{AgentAuthenticator, InboundEvent};

use crate::crack_ingest::{self, CrackedHashReport};
use crate::model::{BenchmarkEntry, BenchmarkKey, RetryReason, Task, TaskStatus};
use crate::reconciler::{self, ProgressReport};
use crate::scheduler::SchedulerState;
use crate::store::SchedulerStore;

/// Hex-encoded SHA-256 of the raw API key, matching how `agents.api_key_hash`
/// is expected to be stored (never the plaintext key).
pub fn hash_api_key(raw: &str) -> String {
    let digest = Sha256::digest(raw.as_bytes());
    hex::encode(digest)
}

/// Authenticates a presented API key against the store's agent table.
pub struct StoreBackedAuthenticator {
    store: Arc<dyn SchedulerStore>,
}

impl StoreBackedAuthenticator {
    pub fn new(store: Arc<dyn SchedulerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AgentAuthenticator for StoreBackedAuthenticator {
    async fn authenticate(&self, api_key: &str) -> Option<Uuid> {
        let hashed = hash_api_key(api_key);
        match self.store.get_agent_by_api_key_hash(&hashed).await {
            Ok(Some(agent)) if agent.is_enabled => Some(agent.id),
            Ok(_) => None,
            Err(e) => {
                error!(error = %e, "agent lookup failed during authentication");
                None
            }
        }
    }
}

/// Builds the outbound `task_assignment` frame for a freshly-carved task.
/// `wordlist_paths`/`rule_paths`/`binary_path`/`hashlist_path` are resolved
/// by the caller from the job's configured ids — file storage is an
/// external collaborator this crate only describes the contract for.
pub fn build_task_assignment(
    task: &Task,
    job: &crate::model::Job,
    hashlist_path: String,
    wordlist_paths: Vec<String>,
    rule_paths: Vec<String>,
    binary_path: String,
) -> CommandPlaneMessage {
    CommandPlaneMessage::TaskAssignment(TaskAssignmentPayload {
        task_id: task.id,
        job_execution_id: job.id,
        hashlist_id: job.hashlist_id,
        hashlist_path,
        attack_mode: job.attack_mode as i16,
        hash_type: job.hash_type,
        keyspace_start: task.keyspace_start.0,
        keyspace_end: task.keyspace_end.0,
        wordlist_paths,
        rule_paths,
        rule_chunk_path: task.rule_chunk_path.clone(),
        mask: job.mask.clone(),
        binary_path,
        chunk_duration: task.chunk_duration_secs,
        report_interval: 5,
        output_format: "json".to_string(),
        extra_parameters: None,
    })
}

pub fn build_job_stop(task_id: Uuid) -> CommandPlaneMessage {
    CommandPlaneMessage::JobStop(JobStopPayload { task_id })
}

/// Processes one [`InboundEvent`], mutating store-backed job/task/hashlist
/// state as needed. Returns without error on unknown task ids (the agent
/// may be reporting a task this server no longer tracks, e.g. after a
/// restart lost the in-memory side of a reconnect) — those are logged, not
/// propagated, per §7's non-transient-error handling.
pub async fn handle_inbound_event(event: InboundEvent, state: &SchedulerState) {
    match event {
        InboundEvent::Message { agent_id, message } => {
            if let Err(e) = dispatch_message(agent_id, message, state).await {
                warn!(%agent_id, error = %e, "failed to process inbound command-plane message");
            }
        }
        InboundEvent::Disconnected { agent_id } => {
            if let Err(e) = mark_agent_tasks_reconnect_pending(agent_id, state.store.as_ref()).await {
                warn!(%agent_id, error = %e, "failed to mark tasks reconnect_pending on disconnect");
            }
        }
    }
}

async fn dispatch_message(
    agent_id: Uuid,
    message: CommandPlaneMessage,
    state: &SchedulerState,
) -> crate::error::SchedulerResult<()> {
    let store = state.store.as_ref();
    match message {
        CommandPlaneMessage::Heartbeat(_) => {
            let mut agent = store.get_agent(agent_id).await?;
            agent.last_heartbeat = Some(Utc::now());
            agent.updated_at = Utc::now();
            store.save_agent(&agent).await?;
        }
        CommandPlaneMessage::JobProgress(payload) => {
            apply_job_progress(payload, store).await?;
        }
        CommandPlaneMessage::TaskStatus(payload) => {
            apply_task_status(payload, store).await?;
        }
        CommandPlaneMessage::BenchmarkResult(payload) => {
            apply_benchmark_result(agent_id, payload, state).await?;
        }
        CommandPlaneMessage::DeviceUpdate(entries) => {
            // Device enable/disable is persisted against the agent's device
            // list; the store's `save_agent` call happens at the HTTP admin
            // boundary that owns device CRUD, so this only logs here.
            warn!(%agent_id, count = entries.len(), "device_update received (advisory, no task impact)");
        }
        other => {
            warn!(%agent_id, message_type = other.type_name(), "message type not handled by command plane wiring");
        }
    }
    Ok(())
}

/// C2↔C9 feedback loop: a `benchmark_result` is only useful once we recover
/// which `(attack_mode, hash_type)` it measured. That context lives in the
/// `benchmark_request` this replies to, tracked by `request_id` in
/// [`SchedulerState::pending_benchmarks`] since the payload itself doesn't
/// carry those fields.
async fn apply_benchmark_result(
    agent_id: Uuid,
    payload: BenchmarkResultPayload,
    state: &SchedulerState,
) -> crate::error::SchedulerResult<()> {
    let Some(pending) = state.take_pending_benchmark(payload.request_id) else {
        warn!(%agent_id, request_id = %payload.request_id, "benchmark_result for unknown or expired request");
        return Ok(());
    };

    if !payload.success || payload.total_speed <= 0.0 {
        warn!(%agent_id, error = ?payload.error_message, "benchmark_result reported failure, not recording");
        return Ok(());
    }

    let entry = BenchmarkEntry {
        key: BenchmarkKey {
            agent_id: pending.agent_id,
            attack_mode: pending.attack_mode,
            hash_type: pending.hash_type,
        },
        hashes_per_second: payload.total_speed,
        updated_at: Utc::now(),
    };
    state.benchmark_cache.record(pending.agent_id, pending.attack_mode, pending.hash_type, payload.total_speed);
    state.store.save_benchmark(&entry).await?;
    Ok(())
}

async fn apply_job_progress(payload: JobProgressPayload, store: &dyn SchedulerStore) -> crate::error::SchedulerResult<()> {
    let mut task = store.get_task(payload.task_id).await?;
    if task.status.is_terminal() {
        // A progress report racing a cancel/preemption/completion that
        // already landed. §5: dropped, not applied.
        return Ok(());
    }
    let mut job = store.get_job(task.job_id).await?;

    let report = ProgressReport {
        keyspace_processed: crate::model::BaseKeyspace(payload.keyspace_processed),
        effective_progress: crate::model::EffectiveKeyspace(payload.keyspace_processed),
        total_effective_keyspace: None,
        is_first_update: task.started_at.is_none(),
        hash_rate: payload.speed,
        cracked_count: payload.crack_count as i64,
    };

    if task.status == TaskStatus::Assigned || task.status == TaskStatus::ReconnectPending {
        crate::task_fsm::start_running(&mut task, Utc::now()).ok();
    }

    reconciler::apply(&mut job, &mut task, &report, Utc::now(), 1);

    if !payload.new_cracks.is_empty() {
        let hashlist = store.get_hashlist(job.hashlist_id).await?;
        let reports: Vec<CrackedHashReport> = payload
            .new_cracks
            .iter()
            .map(|c: &CrackedHash| CrackedHashReport {
                hash_value: c.hash_value.clone(),
                username: c.username.clone(),
                password: Some(c.password.clone()),
            })
            .collect();
        let mut already_cracked = std::collections::HashSet::new();
        for report in &reports {
            let normalized = crate::model::hashlist::normalize_hash_value(hashlist.hash_type_id, &report.hash_value);
            if store.is_already_cracked(hashlist.id, &normalized).await? {
                already_cracked.insert(normalized);
            }
        }
        let ledger = StoreCrackLedger { already_cracked: &already_cracked };
        let new_rows = crack_ingest::ingest(&hashlist, &reports, &ledger);
        if !new_rows.is_empty() {
            let increment = crack_ingest::cracked_count_increment(&new_rows);
            store.insert_cracked_hashes(&new_rows).await?;
            let mut hashlist = hashlist;
            hashlist.cracked_hashes += increment;
            store.save_hashlist(&hashlist).await?;
        }
    }

    if payload.keyspace_processed >= task.size().0 {
        crate::task_fsm::complete(&mut task, Utc::now()).ok();
    }

    store.save_task(&task).await?;
    store.save_job(&job).await?;
    Ok(())
}

async fn apply_task_status(payload: TaskStatusPayload, store: &dyn SchedulerStore) -> crate::error::SchedulerResult<()> {
    let mut task = store.get_task(payload.task_id).await?;
    let now = Utc::now();
    match payload.status {
        ReportedTaskStatus::Started => {
            crate::task_fsm::start_running(&mut task, now).ok();
        }
        ReportedTaskStatus::Completed => {
            crate::task_fsm::complete(&mut task, now).ok();
        }
        ReportedTaskStatus::Failed => {
            crate::task_fsm::fail(&mut task, RetryReason::AgentFailure, payload.error_message.clone(), now).ok();
        }
        ReportedTaskStatus::Rejected => {
            crate::task_fsm::fail(&mut task, RetryReason::NoStart, payload.error_message.clone(), now).ok();
        }
        ReportedTaskStatus::Accepted => {}
    }
    store.save_task(&task).await?;
    Ok(())
}

/// §4.9/§4.11: a dropped link transitions every `{assigned, running}` task
/// owned by the agent to `reconnect_pending`, starting its grace-period
/// clock. The recovery coordinator's periodic sweep fails any still
/// outstanding past `reconnect_grace_period`.
async fn mark_agent_tasks_reconnect_pending(agent_id: Uuid, store: &dyn SchedulerStore) -> crate::error::SchedulerResult<()> {
    let tasks = store.list_tasks_for_agent(agent_id).await?;
    let now = Utc::now();
    for mut task in tasks {
        if matches!(task.status, TaskStatus::Assigned | TaskStatus::Running) {
            if crate::task_fsm::mark_reconnect_pending(&mut task, now).is_ok() {
                store.save_task(&task).await?;
            }
        }
    }
    Ok(())
}

/// `CrackLedger` is a sync trait so `ingest()` stays pure and unit-testable
/// without a database. The async `store.is_already_cracked` lookups happen
/// up front in `apply_job_progress`, one per candidate report, and their
/// results are what this wraps.
struct StoreCrackLedger<'a> {
    already_cracked: &'a std::collections::HashSet<String>,
}

impl<'a> crack_ingest::CrackLedger for StoreCrackLedger<'a> {
    fn is_already_cracked(&self, _hashlist_id: crate::model::HashlistId, normalized_hash_value: &str) -> bool {
        self.already_cracked.contains(normalized_hash_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_api_key_is_deterministic() {
        assert_eq!(hash_api_key("secret"), hash_api_key("secret"));
        assert_ne!(hash_api_key("secret"), hash_api_key("other"));
    }
}
