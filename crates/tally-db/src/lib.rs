//! # tally-db: Durable Store for Tally
//!
//! Persists the two documents the sync engine needs across restarts: the
//! record cache and the pending queue. Both are stored as JSON strings under
//! fixed keys.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Tally Data Flow                                  │
//! │                                                                         │
//! │  SyncEngine (tally-sync)                                               │
//! │       │  get("cache") / set("queue", json)                             │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │ DurableStore  │    │   Database    │    │  Migrations  │  │   │
//! │  │   │  (store.rs)   │◄───│   (pool.rs)   │───►│  (embedded)  │  │   │
//! │  │   │               │    │  KvRepository │    │ 001_kv.sql   │  │   │
//! │  │   │  MemoryStore  │    └───────────────┘    └──────────────┘  │   │
//! │  │   └───────────────┘                                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   ~/.local/share/tally/tally.db                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Key/value repository
//! - [`store`] - The `DurableStore` seam and its in-memory implementation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig, DurableStore, StoreKey};
//!
//! let db = Database::new(DbConfig::new("path/to/tally.db")).await?;
//! db.set(StoreKey::Queue.as_str(), "[]").await?;
//! let cache = db.get(StoreKey::Cache.as_str()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use repository::kv::KvRepository;
pub use store::{DurableStore, MemoryStore, StoreKey};
