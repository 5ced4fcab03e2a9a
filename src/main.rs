//! KrakenHashes scheduler server entry point.
//!
//! Loads configuration, connects to Postgres, brings up the agent command
//! plane, runs startup recovery, and spawns the four cooperating
//! scheduling loops before serving the command-plane router.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info};

use krakenhashes_agent_plane::server::{CommandPlaneServer, CommandPlaneServerConfig};
use krakenhashes_core::command_plane::StoreBackedAuthenticator;
use krakenhashes_core::model::HashlistId;
use krakenhashes_core::rule_splitter::FilesystemRuleStore;
use krakenhashes_core::scheduler::{AssetResolver, SchedulerState};
use krakenhashes_core::settings::SchedulerSettings;
use krakenhashes_core::store::{PostgresStore, SchedulerStore};
use krakenhashes_core::{scheduler, SchedulerResult};

/// Resolves the on-disk paths hashcat needs from the ids a job/task
/// carries. File storage itself lives outside this crate (§1's external
/// collaborator list); this impl assumes a flat layout under
/// `KRAKENHASHES_DATA_DIR`, the simplest arrangement that satisfies it.
struct DataDirAssetResolver {
    data_dir: PathBuf,
    store: Arc<dyn SchedulerStore>,
}

#[async_trait::async_trait]
impl AssetResolver for DataDirAssetResolver {
    async fn hashlist_path(&self, hashlist_id: HashlistId) -> SchedulerResult<String> {
        let hashlist = self.store.get_hashlist(hashlist_id).await?;
        Ok(hashlist.file_path)
    }

    async fn wordlist_paths(&self, wordlist_ids: &[i64]) -> SchedulerResult<Vec<String>> {
        Ok(wordlist_ids
            .iter()
            .map(|id| self.data_dir.join("wordlists").join(id.to_string()).display().to_string())
            .collect())
    }

    async fn rule_paths(&self, rule_ids: &[i64]) -> SchedulerResult<Vec<String>> {
        Ok(rule_ids
            .iter()
            .map(|id| self.data_dir.join("rules").join(id.to_string()).display().to_string())
            .collect())
    }

    async fn binary_path(&self, binary_version_id: i64) -> SchedulerResult<String> {
        Ok(self
            .data_dir
            .join("binaries")
            .join(binary_version_id.to_string())
            .display()
            .to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    krakenhashes_otel::init_from_env()?;

    let config = krakenhashes_config::load_config()?;
    info!(bind_address = %config.server.bind_address, "starting krakenhashes scheduler");

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.server.database_url)
        .await?;
    let store: Arc<dyn SchedulerStore> = Arc::new(PostgresStore::new(pool));

    let settings = SchedulerSettings::from(&config);

    let data_dir = std::env::var("KRAKENHASHES_DATA_DIR").unwrap_or_else(|_| "/var/lib/krakenhashes/data".to_string());
    let assets = Arc::new(DataDirAssetResolver {
        data_dir: PathBuf::from(data_dir),
        store: Arc::clone(&store),
    });

    let rule_store = Arc::new(FilesystemRuleStore {
        chunk_dir: PathBuf::from(settings.rule_chunk_dir.clone()),
    });

    let authenticator = Arc::new(StoreBackedAuthenticator::new(Arc::clone(&store)));
    let server_config = CommandPlaneServerConfig {
        bind_address: config.server.bind_address.clone(),
        ping_period: Duration::from_secs(config.command_plane.ping_period_secs),
        pong_wait: Duration::from_secs(config.command_plane.pong_wait_secs),
    };
    let (command_plane, mut inbound_rx) = CommandPlaneServer::new(server_config, authenticator);
    let registry = command_plane.registry();

    let state = Arc::new(SchedulerState::new(
        Arc::clone(&store),
        registry,
        rule_store,
        assets,
        settings,
    ));

    scheduler::recover_on_startup(&state).await?;

    let (wake_tx, _) = broadcast::channel::<()>(16);

    spawn_tick_loop(Arc::clone(&state), wake_tx.subscribe());
    spawn_reconnect_sweep_loop(Arc::clone(&state));
    spawn_benchmark_sweep_loop(Arc::clone(&state));
    spawn_rule_chunk_cleanup_loop(Arc::clone(&state));

    let inbound_state = Arc::clone(&state);
    let inbound_wake_tx = wake_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = inbound_rx.recv().await {
            krakenhashes_core::command_plane::handle_inbound_event(event, &inbound_state).await;
            let _ = inbound_wake_tx.send(());
        }
    });

    command_plane.start().await.map_err(|e| -> Box<dyn std::error::Error> { Box::new(std::io::Error::other(e.to_string())) })?;

    krakenhashes_otel::shutdown_tracing();
    Ok(())
}

fn spawn_tick_loop(state: Arc<SchedulerState>, mut wake_rx: broadcast::Receiver<()>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = wake_rx.recv() => {}
            }
            if let Err(e) = scheduler::run_tick(&state).await {
                error!(error = %e, "scheduling tick failed");
            }
        }
    });
}

/// ±25% jitter around `base`, mirroring the teacher's exponential-backoff
/// jitter but applied to a sweep cadence rather than a retry delay — keeps
/// a fleet of scheduler processes from sweeping in lockstep against the
/// same store.
fn jittered(base: Duration) -> Duration {
    let range_ms = (base.as_millis() / 4).max(1) as u64;
    let jitter = rand::random::<u64>() % (range_ms * 2);
    let base_ms = base.as_millis() as u64;
    Duration::from_millis(base_ms + jitter - range_ms)
}

fn spawn_reconnect_sweep_loop(state: Arc<SchedulerState>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(jittered(Duration::from_secs(30))).await;
            if let Err(e) = scheduler::run_reconnect_sweep(&state).await {
                error!(error = %e, "reconnect sweep failed");
            }
        }
    });
}

fn spawn_benchmark_sweep_loop(state: Arc<SchedulerState>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(jittered(Duration::from_secs(60))).await;
            scheduler::run_benchmark_ttl_sweep(&state);
        }
    });
}

fn spawn_rule_chunk_cleanup_loop(state: Arc<SchedulerState>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(jittered(Duration::from_secs(300))).await;
            if let Err(e) = scheduler::run_rule_chunk_cleanup(&state).await {
                error!(error = %e, "rule chunk cleanup failed");
            }
        }
    });
}
