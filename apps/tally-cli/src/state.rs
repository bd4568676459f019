//! # Application State
//!
//! Everything a command needs, built once per invocation.
//!
//! ## Wiring
//! ```text
//! SyncConfig ──► Database (SQLite at config.database_path())
//!     │                │
//!     ▼                ▼ Arc<dyn DurableStore>
//! ApiClient ──► SyncEngine::start() ──► SyncEngineHandle
//!                                            │
//!                       ConnectivityMonitor ─┤
//!                                            ▼
//!                                      RecordsFacade
//! ```

use anyhow::Context;
use std::sync::Arc;
use tracing::{debug, info};

use tally_db::{Database, DbConfig, DurableStore, MemoryStore};
use tally_sync::{
    ApiClient, ConnectivityMonitor, EngineOptions, MemoryRemote, RecordsFacade, SyncConfig,
    SyncEngine,
};

/// Opened configuration, store, engine and facade.
pub struct AppState {
    config: SyncConfig,
    db: Option<Database>,
    facade: RecordsFacade,
    remote: Option<MemoryRemote>,
}

impl AppState {
    /// Opens the SQLite store named by `config` and starts the engine.
    ///
    /// With `offline` the connectivity monitor starts offline and the
    /// in-process remote, if used, refuses every call.
    pub async fn open(config: SyncConfig, offline: bool) -> anyhow::Result<Self> {
        let db_path = config.database_path();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }

        let db = Database::new(DbConfig::new(&db_path))
            .await
            .with_context(|| format!("opening database {}", db_path.display()))?;
        info!(?db_path, "Database connected and migrations applied");

        Self::assemble(config, Arc::new(db.clone()), Some(db), offline).await
    }

    /// Same wiring over an in-memory store. Nothing survives the process.
    pub async fn ephemeral(config: SyncConfig, offline: bool) -> anyhow::Result<Self> {
        Self::assemble(config, Arc::new(MemoryStore::new()), None, offline).await
    }

    async fn assemble(
        config: SyncConfig,
        store: Arc<dyn DurableStore>,
        db: Option<Database>,
        offline: bool,
    ) -> anyhow::Result<Self> {
        let (client, remote) = ApiClient::from_config(&config).context("building API client")?;
        if offline {
            if let Some(remote) = &remote {
                remote.set_offline(true);
            }
        }

        let engine = SyncEngine::new(client, store, EngineOptions::from_config(&config))
            .start()
            .await;
        let facade = RecordsFacade::new(engine, ConnectivityMonitor::new(!offline));
        debug!(offline, "Application state ready");

        Ok(AppState {
            config,
            db,
            facade,
            remote,
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn facade(&self) -> &RecordsFacade {
        &self.facade
    }

    /// The in-process remote when `api.base_url` is `memory://`.
    pub fn remote(&self) -> Option<&MemoryRemote> {
        self.remote.as_ref()
    }

    /// Stops the engine and closes the database.
    pub async fn close(self) -> anyhow::Result<()> {
        self.facade.engine().shutdown().await?;
        if let Some(db) = self.db {
            db.close().await;
        }
        Ok(())
    }
}
