//! Operator CLI: read-only inspection of jobs, tasks, and agents against
//! the same Postgres database the scheduler server runs against.

use clap::{Parser, Subcommand};
use uuid::Uuid;

use krakenhashes_core::model::TaskStatus;
use krakenhashes_core::store::{PostgresStore, SchedulerStore};

#[derive(Parser)]
#[command(name = "krakenhashes-cli", version, about = "Inspect KrakenHashes scheduler state")]
struct Cli {
    #[arg(long, env = "KRAKENHASHES_DATABASE_URL")]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List every job the scheduler would still consider for dispatch.
    Jobs,
    /// Show one job's keyspace accounting and status.
    Job { id: Uuid },
    /// List tasks for a job.
    Tasks { job_id: Uuid },
    /// List every task currently stuck in reconnect_pending.
    ReconnectPending,
    /// Show one agent's eligibility-relevant fields.
    Agent { id: Uuid },
    /// List all agents and their current status.
    Agents,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let pool = sqlx::postgres::PgPoolOptions::new().max_connections(5).connect(&cli.database_url).await?;
    let store = PostgresStore::new(pool);

    match cli.command {
        Command::Jobs => {
            for job in store.list_schedulable_jobs().await? {
                println!(
                    "{}  {:<30} priority={:<4} status={:?} progress={:.1}%",
                    job.id,
                    job.name,
                    job.priority,
                    job.status,
                    job.overall_progress_percent()
                );
            }
        }
        Command::Job { id } => {
            let job = store.get_job(id).await?;
            println!("{job:#?}");
            if let Err(e) = job.check_keyspace_invariant() {
                eprintln!("keyspace invariant violated: {e}");
            }
        }
        Command::Tasks { job_id } => {
            for task in store.list_tasks_for_job(job_id).await? {
                println!(
                    "{}  agent={:?} status={:?} [{}, {}) processed={}",
                    task.id, task.agent_id, task.status, task.keyspace_start, task.keyspace_end, task.keyspace_processed
                );
            }
        }
        Command::ReconnectPending => {
            for task in store.list_tasks_by_status(TaskStatus::ReconnectPending).await? {
                println!("{}  job={} agent={:?} updated_at={}", task.id, task.job_id, task.agent_id, task.updated_at);
            }
        }
        Command::Agent { id } => {
            let agent = store.get_agent(id).await?;
            println!("{agent:#?}");
        }
        Command::Agents => {
            for agent in store.list_agents().await? {
                println!(
                    "{}  {:<20} status={:?} enabled={} failures={}",
                    agent.id, agent.name, agent.status, agent.is_enabled, agent.consecutive_failures
                );
            }
        }
    }

    Ok(())
}
