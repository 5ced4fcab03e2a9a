//! Persistence seam.
//!
//! [`SchedulerStore`] is the only way the core touches durable state. An
//! in-memory implementation backs the unit/integration test suites;
//! production wiring plugs in [`PostgresStore`], built on runtime `sqlx`
//! queries (no compile-time `query!` macro, since there is no live database
//! at build time in this environment).

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::{SchedulerError, SchedulerResult};
use crate::model::{Agent, AgentId, BenchmarkEntry, BenchmarkKey, Hash, Hashlist, HashlistId, Job, JobId, Task, TaskId};

#[async_trait]
pub trait SchedulerStore: Send + Sync {
    async fn get_job(&self, id: JobId) -> SchedulerResult<Job>;
    async fn list_schedulable_jobs(&self) -> SchedulerResult<Vec<Job>>;
    async fn save_job(&self, job: &Job) -> SchedulerResult<()>;

    async fn get_task(&self, id: TaskId) -> SchedulerResult<Task>;
    async fn list_tasks_for_job(&self, job_id: JobId) -> SchedulerResult<Vec<Task>>;
    async fn list_tasks_for_agent(&self, agent_id: AgentId) -> SchedulerResult<Vec<Task>>;
    async fn list_tasks_by_status(&self, status: crate::model::TaskStatus) -> SchedulerResult<Vec<Task>>;
    async fn save_task(&self, task: &Task) -> SchedulerResult<()>;

    async fn get_agent(&self, id: AgentId) -> SchedulerResult<Agent>;
    async fn get_agent_by_api_key_hash(&self, api_key_hash: &str) -> SchedulerResult<Option<Agent>>;
    async fn list_agents(&self) -> SchedulerResult<Vec<Agent>>;
    async fn save_agent(&self, agent: &Agent) -> SchedulerResult<()>;

    async fn get_hashlist(&self, id: HashlistId) -> SchedulerResult<Hashlist>;
    async fn save_hashlist(&self, hashlist: &Hashlist) -> SchedulerResult<()>;
    async fn insert_cracked_hashes(&self, rows: &[Hash]) -> SchedulerResult<()>;
    async fn is_already_cracked(&self, hashlist_id: HashlistId, normalized_hash_value: &str) -> SchedulerResult<bool>;

    async fn get_benchmark(&self, key: BenchmarkKey) -> SchedulerResult<Option<BenchmarkEntry>>;
    async fn save_benchmark(&self, entry: &BenchmarkEntry) -> SchedulerResult<()>;
}

/// Thread-safe in-memory store. Used by the integration test suites and as
/// a reference implementation of [`SchedulerStore`]'s contract.
pub struct InMemoryStore {
    jobs: dashmap::DashMap<JobId, Job>,
    tasks: dashmap::DashMap<TaskId, Task>,
    agents: dashmap::DashMap<AgentId, Agent>,
    hashlists: dashmap::DashMap<HashlistId, Hashlist>,
    cracked: dashmap::DashMap<(HashlistId, String), ()>,
    benchmarks: dashmap::DashMap<BenchmarkKey, BenchmarkEntry>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            jobs: dashmap::DashMap::new(),
            tasks: dashmap::DashMap::new(),
            agents: dashmap::DashMap::new(),
            hashlists: dashmap::DashMap::new(),
            cracked: dashmap::DashMap::new(),
            benchmarks: dashmap::DashMap::new(),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchedulerStore for InMemoryStore {
    async fn get_job(&self, id: JobId) -> SchedulerResult<Job> {
        self.jobs
            .get(&id)
            .map(|j| j.clone())
            .ok_or_else(|| SchedulerError::NotFound(format!("job {id}")))
    }

    async fn list_schedulable_jobs(&self) -> SchedulerResult<Vec<Job>> {
        Ok(self.jobs.iter().filter(|j| j.is_schedulable()).map(|j| j.clone()).collect())
    }

    async fn save_job(&self, job: &Job) -> SchedulerResult<()> {
        self.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> SchedulerResult<Task> {
        self.tasks
            .get(&id)
            .map(|t| t.clone())
            .ok_or_else(|| SchedulerError::NotFound(format!("task {id}")))
    }

    async fn list_tasks_for_job(&self, job_id: JobId) -> SchedulerResult<Vec<Task>> {
        Ok(self.tasks.iter().filter(|t| t.job_id == job_id).map(|t| t.clone()).collect())
    }

    async fn list_tasks_for_agent(&self, agent_id: AgentId) -> SchedulerResult<Vec<Task>> {
        Ok(self
            .tasks
            .iter()
            .filter(|t| t.agent_id == Some(agent_id))
            .map(|t| t.clone())
            .collect())
    }

    async fn list_tasks_by_status(&self, status: crate::model::TaskStatus) -> SchedulerResult<Vec<Task>> {
        Ok(self.tasks.iter().filter(|t| t.status == status).map(|t| t.clone()).collect())
    }

    async fn save_task(&self, task: &Task) -> SchedulerResult<()> {
        self.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_agent(&self, id: AgentId) -> SchedulerResult<Agent> {
        self.agents
            .get(&id)
            .map(|a| a.clone())
            .ok_or_else(|| SchedulerError::NotFound(format!("agent {id}")))
    }

    async fn get_agent_by_api_key_hash(&self, api_key_hash: &str) -> SchedulerResult<Option<Agent>> {
        Ok(self.agents.iter().find(|a| a.api_key_hash == api_key_hash).map(|a| a.clone()))
    }

    async fn list_agents(&self) -> SchedulerResult<Vec<Agent>> {
        Ok(self.agents.iter().map(|a| a.clone()).collect())
    }

    async fn save_agent(&self, agent: &Agent) -> SchedulerResult<()> {
        self.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn get_hashlist(&self, id: HashlistId) -> SchedulerResult<Hashlist> {
        self.hashlists
            .get(&id)
            .map(|h| h.clone())
            .ok_or_else(|| SchedulerError::NotFound(format!("hashlist {id}")))
    }

    async fn save_hashlist(&self, hashlist: &Hashlist) -> SchedulerResult<()> {
        self.hashlists.insert(hashlist.id, hashlist.clone());
        Ok(())
    }

    async fn insert_cracked_hashes(&self, rows: &[Hash]) -> SchedulerResult<()> {
        for row in rows {
            let normalized = crate::model::hashlist::normalize_hash_value(
                self.hashlists
                    .get(&row.hashlist_id)
                    .map(|h| h.hash_type_id)
                    .unwrap_or_default(),
                &row.hash_value,
            );
            self.cracked.insert((row.hashlist_id, normalized), ());
        }
        Ok(())
    }

    async fn is_already_cracked(&self, hashlist_id: HashlistId, normalized_hash_value: &str) -> SchedulerResult<bool> {
        Ok(self.cracked.contains_key(&(hashlist_id, normalized_hash_value.to_string())))
    }

    async fn get_benchmark(&self, key: BenchmarkKey) -> SchedulerResult<Option<BenchmarkEntry>> {
        Ok(self.benchmarks.get(&key).map(|e| e.clone()))
    }

    async fn save_benchmark(&self, entry: &BenchmarkEntry) -> SchedulerResult<()> {
        self.benchmarks.insert(entry.key, entry.clone());
        Ok(())
    }
}

/// Runtime-query Postgres implementation. Mirrors the teacher's pattern of
/// holding a single `sqlx::PgPool` and issuing `sqlx::query(...)`/
/// `query_as(...)` calls rather than the `query!` compile-time macro, since
/// this crate is never built against a live database.
pub struct PostgresStore {
    pool: sqlx::PgPool,
}

impl PostgresStore {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SchedulerStore for PostgresStore {
    async fn get_job(&self, id: JobId) -> SchedulerResult<Job> {
        let row: JobRow = sqlx::query_as(
            r#"SELECT id, name, hashlist_id, priority, hash_type, attack_mode, wordlist_ids,
                      rule_ids, mask, binary_version_id, chunk_duration_secs,
                      allow_high_priority_override, uses_rule_splitting, base_keyspace,
                      effective_keyspace, total_keyspace, dispatched_keyspace, processed_keyspace,
                      multiplication_factor, avg_rule_multiplier, is_accurate_keyspace, status,
                      max_agents, error_message, created_by, created_at, started_at,
                      completed_at, updated_at
               FROM jobs WHERE id = $1"#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        row.try_into_job()
    }

    async fn list_schedulable_jobs(&self) -> SchedulerResult<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(
            r#"SELECT id, name, hashlist_id, priority, hash_type, attack_mode, wordlist_ids,
                      rule_ids, mask, binary_version_id, chunk_duration_secs,
                      allow_high_priority_override, uses_rule_splitting, base_keyspace,
                      effective_keyspace, total_keyspace, dispatched_keyspace, processed_keyspace,
                      multiplication_factor, avg_rule_multiplier, is_accurate_keyspace, status,
                      max_agents, error_message, created_by, created_at, started_at,
                      completed_at, updated_at
               FROM jobs WHERE status IN ('pending', 'running')"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|r| r.try_into_job())
            .filter(|j| j.as_ref().map(|j| j.is_schedulable()).unwrap_or(true))
            .collect()
    }

    async fn save_job(&self, job: &Job) -> SchedulerResult<()> {
        sqlx::query(
            r#"INSERT INTO jobs (id, name, hashlist_id, priority, hash_type, attack_mode,
                      wordlist_ids, rule_ids, mask, binary_version_id, chunk_duration_secs,
                      allow_high_priority_override, uses_rule_splitting, base_keyspace,
                      effective_keyspace, total_keyspace, dispatched_keyspace, processed_keyspace,
                      multiplication_factor, avg_rule_multiplier, is_accurate_keyspace, status,
                      max_agents, error_message, created_by, created_at, started_at,
                      completed_at, updated_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,
                       $21,$22,$23,$24,$25,$26,$27,$28,$29)
               ON CONFLICT (id) DO UPDATE SET
                 status = EXCLUDED.status,
                 dispatched_keyspace = EXCLUDED.dispatched_keyspace,
                 processed_keyspace = EXCLUDED.processed_keyspace,
                 effective_keyspace = EXCLUDED.effective_keyspace,
                 avg_rule_multiplier = EXCLUDED.avg_rule_multiplier,
                 is_accurate_keyspace = EXCLUDED.is_accurate_keyspace,
                 error_message = EXCLUDED.error_message,
                 started_at = EXCLUDED.started_at,
                 completed_at = EXCLUDED.completed_at,
                 updated_at = EXCLUDED.updated_at"#,
        )
        .bind(job.id)
        .bind(&job.name)
        .bind(job.hashlist_id)
        .bind(job.priority)
        .bind(job.hash_type)
        .bind(job.attack_mode as i16)
        .bind(&job.wordlist_ids)
        .bind(&job.rule_ids)
        .bind(&job.mask)
        .bind(job.binary_version_id)
        .bind(job.chunk_duration_secs)
        .bind(job.allow_high_priority_override)
        .bind(job.uses_rule_splitting)
        .bind(job.base_keyspace.0)
        .bind(job.effective_keyspace.0)
        .bind(job.total_keyspace.0)
        .bind(job.dispatched_keyspace.0)
        .bind(job.processed_keyspace.0)
        .bind(job.multiplication_factor)
        .bind(job.avg_rule_multiplier)
        .bind(job.is_accurate_keyspace)
        .bind(job_status_str(job.status))
        .bind(job.max_agents)
        .bind(&job.error_message)
        .bind(job.created_by)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: TaskId) -> SchedulerResult<Task> {
        let row: TaskRow = sqlx::query_as(TASK_SELECT_COLUMNS_WHERE_ID)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        row.try_into_task()
    }

    async fn list_tasks_for_job(&self, job_id: JobId) -> SchedulerResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(TASK_SELECT_COLUMNS_WHERE_JOB)
            .bind(job_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| r.try_into_task()).collect()
    }

    async fn list_tasks_for_agent(&self, agent_id: AgentId) -> SchedulerResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(TASK_SELECT_COLUMNS_WHERE_AGENT)
            .bind(agent_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| r.try_into_task()).collect()
    }

    async fn list_tasks_by_status(&self, status: crate::model::TaskStatus) -> SchedulerResult<Vec<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(TASK_SELECT_COLUMNS_WHERE_STATUS)
            .bind(task_status_str(status))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|r| r.try_into_task()).collect()
    }

    async fn save_task(&self, task: &Task) -> SchedulerResult<()> {
        sqlx::query(
            r#"INSERT INTO tasks (id, job_id, agent_id, status, priority, keyspace_start,
                      keyspace_end, keyspace_processed, effective_keyspace_start,
                      effective_keyspace_end, effective_keyspace_processed, rule_start_index,
                      rule_end_index, rule_chunk_path, is_rule_split_task, chunk_number,
                      crack_count, retry_count, last_retry_reason, benchmark_speed,
                      average_speed, chunk_duration_secs, detailed_status, error_message,
                      created_at, assigned_at, started_at, completed_at, updated_at,
                      last_checkpoint, last_checkpoint_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,
                       $21,$22,$23,$24,$25,$26,$27,$28,$29,$30,$31)
               ON CONFLICT (id) DO UPDATE SET
                 agent_id = EXCLUDED.agent_id,
                 status = EXCLUDED.status,
                 keyspace_processed = EXCLUDED.keyspace_processed,
                 effective_keyspace_processed = EXCLUDED.effective_keyspace_processed,
                 crack_count = EXCLUDED.crack_count,
                 retry_count = EXCLUDED.retry_count,
                 last_retry_reason = EXCLUDED.last_retry_reason,
                 benchmark_speed = EXCLUDED.benchmark_speed,
                 average_speed = EXCLUDED.average_speed,
                 detailed_status = EXCLUDED.detailed_status,
                 error_message = EXCLUDED.error_message,
                 assigned_at = EXCLUDED.assigned_at,
                 started_at = EXCLUDED.started_at,
                 completed_at = EXCLUDED.completed_at,
                 updated_at = EXCLUDED.updated_at,
                 last_checkpoint = EXCLUDED.last_checkpoint,
                 last_checkpoint_at = EXCLUDED.last_checkpoint_at"#,
        )
        .bind(task.id)
        .bind(task.job_id)
        .bind(task.agent_id)
        .bind(task_status_str(task.status))
        .bind(task.priority)
        .bind(task.keyspace_start.0)
        .bind(task.keyspace_end.0)
        .bind(task.keyspace_processed.0)
        .bind(task.effective_keyspace_start.map(|k| k.0))
        .bind(task.effective_keyspace_end.map(|k| k.0))
        .bind(task.effective_keyspace_processed.map(|k| k.0))
        .bind(task.rule_start_index)
        .bind(task.rule_end_index)
        .bind(&task.rule_chunk_path)
        .bind(task.is_rule_split_task)
        .bind(task.chunk_number)
        .bind(task.crack_count)
        .bind(task.retry_count)
        .bind(task.last_retry_reason.map(retry_reason_str))
        .bind(task.benchmark_speed)
        .bind(task.average_speed)
        .bind(task.chunk_duration_secs)
        .bind(&task.detailed_status)
        .bind(&task.error_message)
        .bind(task.created_at)
        .bind(task.assigned_at)
        .bind(task.started_at)
        .bind(task.completed_at)
        .bind(task.updated_at)
        .bind(task.last_checkpoint.0)
        .bind(task.last_checkpoint_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_agent(&self, id: AgentId) -> SchedulerResult<Agent> {
        let row: AgentRow = sqlx::query_as(AGENT_SELECT_COLUMNS_WHERE_ID)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        row.try_into_agent()
    }

    async fn get_agent_by_api_key_hash(&self, api_key_hash: &str) -> SchedulerResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as(AGENT_SELECT_COLUMNS_WHERE_API_KEY_HASH)
            .bind(api_key_hash)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_into_agent()).transpose()
    }

    async fn list_agents(&self) -> SchedulerResult<Vec<Agent>> {
        let rows: Vec<AgentRow> = sqlx::query_as(AGENT_SELECT_COLUMNS).fetch_all(&self.pool).await?;
        rows.into_iter().map(|r| r.try_into_agent()).collect()
    }

    async fn save_agent(&self, agent: &Agent) -> SchedulerResult<()> {
        let devices = sqlx::types::Json(&agent.devices);
        let schedule = sqlx::types::Json(&agent.schedule);
        sqlx::query(
            r#"INSERT INTO agents (id, name, status, owner_id, is_enabled, extra_parameters,
                      consecutive_failures, last_heartbeat, api_key_hash, scheduling_enabled,
                      devices, schedule, updated_at)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13)
               ON CONFLICT (id) DO UPDATE SET
                 name = EXCLUDED.name,
                 status = EXCLUDED.status,
                 is_enabled = EXCLUDED.is_enabled,
                 extra_parameters = EXCLUDED.extra_parameters,
                 consecutive_failures = EXCLUDED.consecutive_failures,
                 last_heartbeat = EXCLUDED.last_heartbeat,
                 scheduling_enabled = EXCLUDED.scheduling_enabled,
                 devices = EXCLUDED.devices,
                 schedule = EXCLUDED.schedule,
                 updated_at = EXCLUDED.updated_at"#,
        )
        .bind(agent.id)
        .bind(&agent.name)
        .bind(agent_status_str(agent.status))
        .bind(agent.owner_id)
        .bind(agent.is_enabled)
        .bind(&agent.extra_parameters)
        .bind(agent.consecutive_failures as i32)
        .bind(agent.last_heartbeat)
        .bind(&agent.api_key_hash)
        .bind(agent.scheduling_enabled)
        .bind(devices)
        .bind(schedule)
        .bind(agent.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_hashlist(&self, id: HashlistId) -> SchedulerResult<Hashlist> {
        let hashlist: Hashlist = sqlx::query_as(
            r#"SELECT id, name, hash_type_id, total_hashes, cracked_hashes, file_path
               FROM hashlists WHERE id = $1"#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(hashlist)
    }

    async fn save_hashlist(&self, hashlist: &Hashlist) -> SchedulerResult<()> {
        sqlx::query(
            r#"INSERT INTO hashlists (id, name, hash_type_id, total_hashes, cracked_hashes, file_path)
               VALUES ($1,$2,$3,$4,$5,$6)
               ON CONFLICT (id) DO UPDATE SET
                 cracked_hashes = EXCLUDED.cracked_hashes,
                 total_hashes = EXCLUDED.total_hashes"#,
        )
        .bind(hashlist.id)
        .bind(&hashlist.name)
        .bind(hashlist.hash_type_id)
        .bind(hashlist.total_hashes)
        .bind(hashlist.cracked_hashes)
        .bind(&hashlist.file_path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_cracked_hashes(&self, rows: &[Hash]) -> SchedulerResult<()> {
        for row in rows {
            sqlx::query(
                r#"INSERT INTO hashes (hashlist_id, hash_value, username, is_cracked, password, updated_at)
                   VALUES ($1,$2,$3,$4,$5,$6)
                   ON CONFLICT (hashlist_id, hash_value) DO NOTHING"#,
            )
            .bind(row.hashlist_id)
            .bind(&row.hash_value)
            .bind(&row.username)
            .bind(row.is_cracked)
            .bind(&row.password)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn is_already_cracked(&self, hashlist_id: HashlistId, normalized_hash_value: &str) -> SchedulerResult<bool> {
        let row: Option<(bool,)> = sqlx::query_as(
            r#"SELECT is_cracked FROM hashes
               WHERE hashlist_id = $1 AND lower(hash_value) = lower($2) AND is_cracked"#,
        )
        .bind(hashlist_id)
        .bind(normalized_hash_value)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn get_benchmark(&self, key: BenchmarkKey) -> SchedulerResult<Option<BenchmarkEntry>> {
        let row: Option<BenchmarkRow> = sqlx::query_as(
            r#"SELECT agent_id, attack_mode, hash_type, hashes_per_second, updated_at
               FROM agent_benchmarks WHERE agent_id = $1 AND attack_mode = $2 AND hash_type = $3"#,
        )
        .bind(key.agent_id)
        .bind(key.attack_mode)
        .bind(key.hash_type)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(BenchmarkRow::into_entry))
    }

    async fn save_benchmark(&self, entry: &BenchmarkEntry) -> SchedulerResult<()> {
        sqlx::query(
            r#"INSERT INTO agent_benchmarks (agent_id, attack_mode, hash_type, hashes_per_second, updated_at)
               VALUES ($1,$2,$3,$4,$5)
               ON CONFLICT (agent_id, attack_mode, hash_type) DO UPDATE SET
                 hashes_per_second = EXCLUDED.hashes_per_second,
                 updated_at = EXCLUDED.updated_at"#,
        )
        .bind(entry.key.agent_id)
        .bind(entry.key.attack_mode)
        .bind(entry.key.hash_type)
        .bind(entry.hashes_per_second)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

const TASK_SELECT_COLUMNS_WHERE_ID: &str =
    "SELECT id, job_id, agent_id, status, priority, keyspace_start, keyspace_end, \
     keyspace_processed, effective_keyspace_start, effective_keyspace_end, \
     effective_keyspace_processed, rule_start_index, rule_end_index, rule_chunk_path, \
     is_rule_split_task, chunk_number, crack_count, retry_count, last_retry_reason, \
     benchmark_speed, average_speed, chunk_duration_secs, detailed_status, error_message, \
     created_at, assigned_at, started_at, completed_at, updated_at, last_checkpoint, \
     last_checkpoint_at FROM tasks WHERE id = $1";
const TASK_SELECT_COLUMNS_WHERE_JOB: &str =
    "SELECT id, job_id, agent_id, status, priority, keyspace_start, keyspace_end, \
     keyspace_processed, effective_keyspace_start, effective_keyspace_end, \
     effective_keyspace_processed, rule_start_index, rule_end_index, rule_chunk_path, \
     is_rule_split_task, chunk_number, crack_count, retry_count, last_retry_reason, \
     benchmark_speed, average_speed, chunk_duration_secs, detailed_status, error_message, \
     created_at, assigned_at, started_at, completed_at, updated_at, last_checkpoint, \
     last_checkpoint_at FROM tasks WHERE job_id = $1";
const TASK_SELECT_COLUMNS_WHERE_AGENT: &str =
    "SELECT id, job_id, agent_id, status, priority, keyspace_start, keyspace_end, \
     keyspace_processed, effective_keyspace_start, effective_keyspace_end, \
     effective_keyspace_processed, rule_start_index, rule_end_index, rule_chunk_path, \
     is_rule_split_task, chunk_number, crack_count, retry_count, last_retry_reason, \
     benchmark_speed, average_speed, chunk_duration_secs, detailed_status, error_message, \
     created_at, assigned_at, started_at, completed_at, updated_at, last_checkpoint, \
     last_checkpoint_at FROM tasks WHERE agent_id = $1";
const TASK_SELECT_COLUMNS_WHERE_STATUS: &str =
    "SELECT id, job_id, agent_id, status, priority, keyspace_start, keyspace_end, \
     keyspace_processed, effective_keyspace_start, effective_keyspace_end, \
     effective_keyspace_processed, rule_start_index, rule_end_index, rule_chunk_path, \
     is_rule_split_task, chunk_number, crack_count, retry_count, last_retry_reason, \
     benchmark_speed, average_speed, chunk_duration_secs, detailed_status, error_message, \
     created_at, assigned_at, started_at, completed_at, updated_at, last_checkpoint, \
     last_checkpoint_at FROM tasks WHERE status = $1";

const AGENT_SELECT_COLUMNS: &str =
    "SELECT id, name, status, owner_id, is_enabled, extra_parameters, consecutive_failures, \
     last_heartbeat, api_key_hash, scheduling_enabled, devices, schedule, updated_at FROM agents";
const AGENT_SELECT_COLUMNS_WHERE_ID: &str =
    "SELECT id, name, status, owner_id, is_enabled, extra_parameters, consecutive_failures, \
     last_heartbeat, api_key_hash, scheduling_enabled, devices, schedule, updated_at \
     FROM agents WHERE id = $1";
const AGENT_SELECT_COLUMNS_WHERE_API_KEY_HASH: &str =
    "SELECT id, name, status, owner_id, is_enabled, extra_parameters, consecutive_failures, \
     last_heartbeat, api_key_hash, scheduling_enabled, devices, schedule, updated_at \
     FROM agents WHERE api_key_hash = $1";

/// Flat row shape matching the `jobs` table layout named in §6; kept
/// separate from [`Job`] so the newtype wrappers (`BaseKeyspace`,
/// `EffectiveKeyspace`, `AttackMode`) don't need `sqlx::Type` impls of
/// their own.
#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    name: String,
    hashlist_id: Uuid,
    priority: i32,
    hash_type: i32,
    attack_mode: i16,
    wordlist_ids: Vec<i64>,
    rule_ids: Vec<i64>,
    mask: Option<String>,
    binary_version_id: i64,
    chunk_duration_secs: i64,
    allow_high_priority_override: bool,
    uses_rule_splitting: bool,
    base_keyspace: i64,
    effective_keyspace: i64,
    total_keyspace: i64,
    dispatched_keyspace: i64,
    processed_keyspace: i64,
    multiplication_factor: i64,
    avg_rule_multiplier: f64,
    is_accurate_keyspace: bool,
    status: String,
    max_agents: i32,
    error_message: Option<String>,
    created_by: Uuid,
    created_at: chrono::DateTime<Utc>,
    started_at: Option<chrono::DateTime<Utc>>,
    completed_at: Option<chrono::DateTime<Utc>>,
    updated_at: chrono::DateTime<Utc>,
}

impl JobRow {
    fn try_into_job(self) -> SchedulerResult<Job> {
        let attack_mode = crate::model::AttackMode::from_i16(self.attack_mode)
            .ok_or_else(|| SchedulerError::Fatal(format!("unknown attack_mode {}", self.attack_mode)))?;
        let status = job_status_from_str(&self.status)
            .ok_or_else(|| SchedulerError::Fatal(format!("unknown job status {}", self.status)))?;
        Ok(Job {
            id: self.id,
            name: self.name,
            hashlist_id: self.hashlist_id,
            priority: self.priority,
            hash_type: self.hash_type,
            attack_mode,
            wordlist_ids: self.wordlist_ids,
            rule_ids: self.rule_ids,
            mask: self.mask,
            binary_version_id: self.binary_version_id,
            chunk_duration_secs: self.chunk_duration_secs,
            allow_high_priority_override: self.allow_high_priority_override,
            uses_rule_splitting: self.uses_rule_splitting,
            base_keyspace: crate::model::BaseKeyspace(self.base_keyspace),
            effective_keyspace: crate::model::EffectiveKeyspace(self.effective_keyspace),
            total_keyspace: crate::model::EffectiveKeyspace(self.total_keyspace),
            dispatched_keyspace: crate::model::BaseKeyspace(self.dispatched_keyspace),
            processed_keyspace: crate::model::EffectiveKeyspace(self.processed_keyspace),
            multiplication_factor: self.multiplication_factor,
            avg_rule_multiplier: self.avg_rule_multiplier,
            is_accurate_keyspace: self.is_accurate_keyspace,
            status,
            max_agents: self.max_agents,
            error_message: self.error_message,
            created_by: self.created_by,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            updated_at: self.updated_at,
        })
    }
}

fn job_status_str(status: crate::model::JobStatus) -> &'static str {
    use crate::model::JobStatus::*;
    match status {
        Pending => "pending",
        Running => "running",
        Paused => "paused",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

fn job_status_from_str(s: &str) -> Option<crate::model::JobStatus> {
    use crate::model::JobStatus::*;
    Some(match s {
        "pending" => Pending,
        "running" => Running,
        "paused" => Paused,
        "completed" => Completed,
        "failed" => Failed,
        "cancelled" => Cancelled,
        _ => return None,
    })
}

/// Flat row shape matching the `tasks` table (§6).
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    job_id: Uuid,
    agent_id: Option<Uuid>,
    status: String,
    priority: i32,
    keyspace_start: i64,
    keyspace_end: i64,
    keyspace_processed: i64,
    effective_keyspace_start: Option<i64>,
    effective_keyspace_end: Option<i64>,
    effective_keyspace_processed: Option<i64>,
    rule_start_index: Option<i64>,
    rule_end_index: Option<i64>,
    rule_chunk_path: Option<String>,
    is_rule_split_task: bool,
    chunk_number: i64,
    crack_count: i64,
    retry_count: i32,
    last_retry_reason: Option<String>,
    benchmark_speed: Option<f64>,
    average_speed: Option<f64>,
    chunk_duration_secs: i64,
    detailed_status: Option<String>,
    error_message: Option<String>,
    created_at: chrono::DateTime<Utc>,
    assigned_at: Option<chrono::DateTime<Utc>>,
    started_at: Option<chrono::DateTime<Utc>>,
    completed_at: Option<chrono::DateTime<Utc>>,
    updated_at: chrono::DateTime<Utc>,
    last_checkpoint: i64,
    last_checkpoint_at: Option<chrono::DateTime<Utc>>,
}

impl TaskRow {
    fn try_into_task(self) -> SchedulerResult<Task> {
        let status = task_status_from_str(&self.status)
            .ok_or_else(|| SchedulerError::Fatal(format!("unknown task status {}", self.status)))?;
        let last_retry_reason = self
            .last_retry_reason
            .as_deref()
            .map(retry_reason_from_str)
            .transpose()
            .map_err(SchedulerError::Fatal)?;
        Ok(Task {
            id: self.id,
            job_id: self.job_id,
            agent_id: self.agent_id,
            status,
            priority: self.priority,
            keyspace_start: crate::model::BaseKeyspace(self.keyspace_start),
            keyspace_end: crate::model::BaseKeyspace(self.keyspace_end),
            keyspace_processed: crate::model::BaseKeyspace(self.keyspace_processed),
            effective_keyspace_start: self.effective_keyspace_start.map(crate::model::EffectiveKeyspace),
            effective_keyspace_end: self.effective_keyspace_end.map(crate::model::EffectiveKeyspace),
            effective_keyspace_processed: self.effective_keyspace_processed.map(crate::model::EffectiveKeyspace),
            rule_start_index: self.rule_start_index,
            rule_end_index: self.rule_end_index,
            rule_chunk_path: self.rule_chunk_path,
            is_rule_split_task: self.is_rule_split_task,
            chunk_number: self.chunk_number,
            crack_count: self.crack_count,
            retry_count: self.retry_count,
            last_retry_reason,
            benchmark_speed: self.benchmark_speed,
            average_speed: self.average_speed,
            chunk_duration_secs: self.chunk_duration_secs,
            detailed_status: self.detailed_status,
            error_message: self.error_message,
            created_at: self.created_at,
            assigned_at: self.assigned_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            updated_at: self.updated_at,
            last_checkpoint: crate::model::BaseKeyspace(self.last_checkpoint),
            last_checkpoint_at: self.last_checkpoint_at,
        })
    }
}

fn task_status_str(status: crate::model::TaskStatus) -> &'static str {
    use crate::model::TaskStatus::*;
    match status {
        Pending => "pending",
        Assigned => "assigned",
        ReconnectPending => "reconnect_pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

fn task_status_from_str(s: &str) -> Option<crate::model::TaskStatus> {
    use crate::model::TaskStatus::*;
    Some(match s {
        "pending" => Pending,
        "assigned" => Assigned,
        "reconnect_pending" => ReconnectPending,
        "running" => Running,
        "completed" => Completed,
        "failed" => Failed,
        "cancelled" => Cancelled,
        _ => return None,
    })
}

fn retry_reason_str(reason: crate::model::RetryReason) -> &'static str {
    use crate::model::RetryReason::*;
    match reason {
        NoStart => "no_start",
        ReconnectTimeout => "reconnect_timeout",
        AgentFailure => "agent_failure",
        Preempted => "preempted",
    }
}

fn retry_reason_from_str(s: &str) -> Result<crate::model::RetryReason, String> {
    use crate::model::RetryReason::*;
    Ok(match s {
        "no_start" => NoStart,
        "reconnect_timeout" => ReconnectTimeout,
        "agent_failure" => AgentFailure,
        "preempted" => Preempted,
        other => return Err(format!("unknown retry reason {other}")),
    })
}

/// Flat row shape matching the `agents` table. `devices`/`schedule` are
/// stored as JSONB columns since they're small per-agent nested structures,
/// not separately queried — avoids a join for every eligibility check.
#[derive(sqlx::FromRow)]
struct AgentRow {
    id: Uuid,
    name: String,
    status: String,
    owner_id: Option<Uuid>,
    is_enabled: bool,
    extra_parameters: String,
    consecutive_failures: i32,
    last_heartbeat: Option<chrono::DateTime<Utc>>,
    api_key_hash: String,
    scheduling_enabled: bool,
    devices: sqlx::types::Json<Vec<crate::model::AgentDevice>>,
    schedule: sqlx::types::Json<Vec<crate::model::DaySchedule>>,
    updated_at: chrono::DateTime<Utc>,
}

impl AgentRow {
    fn try_into_agent(self) -> SchedulerResult<Agent> {
        let status = agent_status_from_str(&self.status)
            .ok_or_else(|| SchedulerError::Fatal(format!("unknown agent status {}", self.status)))?;
        Ok(Agent {
            id: self.id,
            name: self.name,
            status,
            owner_id: self.owner_id,
            is_enabled: self.is_enabled,
            extra_parameters: self.extra_parameters,
            consecutive_failures: self.consecutive_failures as u32,
            last_heartbeat: self.last_heartbeat,
            api_key_hash: self.api_key_hash,
            scheduling_enabled: self.scheduling_enabled,
            devices: self.devices.0,
            schedule: self.schedule.0,
            updated_at: self.updated_at,
        })
    }
}

fn agent_status_str(status: crate::model::AgentStatus) -> &'static str {
    use crate::model::AgentStatus::*;
    match status {
        Pending => "pending",
        Active => "active",
        Inactive => "inactive",
        Error => "error",
        Disabled => "disabled",
    }
}

fn agent_status_from_str(s: &str) -> Option<crate::model::AgentStatus> {
    use crate::model::AgentStatus::*;
    Some(match s {
        "pending" => Pending,
        "active" => Active,
        "inactive" => Inactive,
        "error" => Error,
        "disabled" => Disabled,
        _ => return None,
    })
}

/// Flat row shape matching the `agent_benchmarks` table.
#[derive(sqlx::FromRow)]
struct BenchmarkRow {
    agent_id: Uuid,
    attack_mode: i16,
    hash_type: i32,
    hashes_per_second: f64,
    updated_at: chrono::DateTime<Utc>,
}

impl BenchmarkRow {
    fn into_entry(self) -> BenchmarkEntry {
        BenchmarkEntry {
            key: BenchmarkKey {
                agent_id: self.agent_id,
                attack_mode: self.attack_mode,
                hash_type: self.hash_type,
            },
            hashes_per_second: self.hashes_per_second,
            updated_at: self.updated_at,
        }
    }
}
