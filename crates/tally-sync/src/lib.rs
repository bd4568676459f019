//! # tally-sync: Sync Engine for Tally
//!
//! This crate keeps locally created expense records and the remote records
//! service in agreement while the remote is slow, flaky or unreachable.
//! Nothing the user submits is lost: a failed submission is queued durably,
//! shown under a placeholder id, and replayed later.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Layer Architecture                          │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 RecordsFacade (presentation entry)               │  │
//! │  │  validation • optimistic view • status banner • push handling   │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │ SyncEngineHandle                        │
//! │  ┌────────────────────────────▼─────────────────────────────────────┐  │
//! │  │                    SyncEngine (actor task)                        │  │
//! │  │  submit_new • flush_pending • get_transactions • apply_pushed    │  │
//! │  └──────────┬──────────────────────────────────────┬────────────────┘  │
//! │             ▼                                      ▼                    │
//! │  ┌────────────────────┐                 ┌────────────────────────┐     │
//! │  │     ApiClient      │                 │   DurableStore         │     │
//! │  │ simulation hook    │                 │   (tally-db)           │     │
//! │  │ HttpTransport or   │                 │   "cache" / "queue"    │     │
//! │  │ MemoryRemote       │                 └────────────────────────┘     │
//! │  └────────────────────┘                                                 │
//! │                                                                         │
//! │  ┌────────────────────┐  ┌────────────────────┐  ┌────────────────┐    │
//! │  │   FlushWorker      │  │ ConnectivityMonitor│  │  EventBus /    │    │
//! │  │ replays on Online, │◄─│ Online / Offline   │  │  PushFeed      │    │
//! │  │ trigger, poll tick │  │ transitions        │  │                │    │
//! │  └────────────────────┘  └────────────────────┘  └────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`client`] - `ApiClient` with latency/failure simulation
//! - [`config`] - Sync configuration (TOML file + environment)
//! - [`connectivity`] - Online/offline state with change events
//! - [`engine`] - The `SyncEngine` actor and its handle
//! - [`error`] - Sync error types
//! - [`events`] - Typed publish/subscribe with subscription tokens
//! - [`facade`] - `RecordsFacade` for presentation code
//! - [`remote`] - In-process records service
//! - [`transport`] - `Transport` trait, `ApiError`, HTTP transport
//! - [`worker`] - Background `FlushWorker`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tally_db::{Database, DbConfig};
//! use tally_sync::{ApiClient, ConnectivityMonitor, EngineOptions, RecordsFacade, SyncConfig, SyncEngine};
//!
//! let config = SyncConfig::load_or_default(None);
//! let db = Database::new(DbConfig::new(config.database_path())).await?;
//! let (client, _remote) = ApiClient::from_config(&config)?;
//!
//! let engine = SyncEngine::new(client, Arc::new(db), EngineOptions::from_config(&config))
//!     .start()
//!     .await;
//! let facade = RecordsFacade::new(engine, ConnectivityMonitor::default());
//!
//! let records = facade.list_records().await?;
//! println!("{} records, {} pending", records.len(), facade.pending_count());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod events;
pub mod facade;
pub mod remote;
pub mod transport;
pub mod worker;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::{ApiClient, SimulationConfig};
pub use config::SyncConfig;
pub use connectivity::{ConnectivityEvent, ConnectivityMonitor};
pub use engine::{EngineOptions, FlushReport, Reconciliation, SyncEngine, SyncEngineHandle};
pub use error::{SyncError, SyncResult};
pub use events::{EventBus, PushFeed, Subscription};
pub use facade::{RecordsFacade, SyncStatus};
pub use remote::MemoryRemote;
pub use transport::{ApiError, ApiResult, HttpTransport, Transport};
pub use worker::{FlushWorker, FlushWorkerHandle};
