//! # Application Wiring
//!
//! ```text
//! SyncConfig ──► RestClient? ──┐
//!                              ▼
//! Database ──────────► GatewayRegistry ──targets(entities)──► SyncEngine
//!                              ▲                                  ▲
//! Reachability ────────────────┴──────────────────────────────────┘
//! ```
//!
//! Without a configured remote the gateways get a detached in-memory store
//! that is always unreachable, so every operation stays local.

use std::path::PathBuf;
use std::sync::Arc;

use directories::ProjectDirs;
use tracing::info;

use hisab_core::Record;
use hisab_db::{Database, DbConfig};
use hisab_sync::{
    GatewayRegistry, MemoryRemoteStore, Reachability, RemoteSource, RemoteStore, RestClient,
    SyncConfig, SyncEngine, SyncEventEmitter, SyncStatusRegister,
};

use crate::error::{CliError, CliResult};

/// Remote source used when no remote store is configured.
struct Detached;

impl RemoteSource for Detached {
    fn remote<T: Record>(&self) -> Arc<dyn RemoteStore<T>> {
        let store = MemoryRemoteStore::<T>::new();
        store.set_unreachable(true);
        Arc::new(store)
    }
}

pub struct App {
    pub config: SyncConfig,
    pub reachability: Reachability,
    pub client: Option<RestClient>,
    pub engine: Arc<SyncEngine>,
    db: Database,
}

impl App {
    pub async fn open(
        db_path: Option<PathBuf>,
        config: SyncConfig,
        emitter: Arc<dyn SyncEventEmitter>,
    ) -> CliResult<Self> {
        let db_path = match db_path {
            Some(path) => path,
            None => get_database_path()?,
        };
        info!(?db_path, "Database path determined");
        let db = Database::new(DbConfig::new(db_path)).await?;

        let reachability = Reachability::new(false);
        let client = if config.has_remote() {
            Some(RestClient::new(&config.remote)?)
        } else {
            None
        };

        let registry = match &client {
            Some(client) => GatewayRegistry::connect(&db, client, reachability.clone()),
            None => GatewayRegistry::connect(&db, &Detached, reachability.clone()),
        };

        let register = Arc::new(SyncStatusRegister::load(db.sync_status()).await?);
        let engine = SyncEngine::builder()
            .with_targets(registry.targets(&config.sync.entities))
            .with_status_register(register)
            .with_reachability(reachability.clone())
            .with_emitter(emitter)
            .with_push_concurrency(config.sync.push_concurrency)
            .build()?;

        Ok(App {
            config,
            reachability,
            client,
            engine: Arc::new(engine),
            db,
        })
    }

    /// Probes the remote once. Always false without a configured remote.
    pub async fn probe(&self) -> bool {
        match &self.client {
            Some(client) => self.reachability.refresh(client).await,
            None => false,
        }
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}

/// Determines the database file path.
///
/// `HISAB_DB_PATH` wins; otherwise the platform data directory is used
/// (`~/.local/share/hisab/hisab.db` on Linux).
fn get_database_path() -> CliResult<PathBuf> {
    if let Ok(path) = std::env::var("HISAB_DB_PATH") {
        return Ok(PathBuf::from(path));
    }

    let proj_dirs = ProjectDirs::from("com", "hisab", "hisab").ok_or(CliError::NoDataDir)?;
    let data_dir = proj_dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;

    Ok(data_dir.join("hisab.db"))
}
