//! # Durable Store
//!
//! The persistence seam used by the sync engine: string values under string
//! keys, surviving restarts.
//!
//! ## Implementations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DurableStore                                    │
//! │                                                                         │
//! │   get(key) -> Option<String>        set(key, value)                    │
//! │        │                                 │                              │
//! │        ├──────────────┬──────────────────┤                              │
//! │        ▼              ▼                                                 │
//! │   Database        MemoryStore                                          │
//! │   (SQLite)        (HashMap + failure injection, for tests and          │
//! │                    ephemeral runs)                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{DbError, DbResult};
use crate::pool::Database;

// =============================================================================
// Store Keys
// =============================================================================

/// The fixed keys the sync engine persists under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// JSON array of records, newest first.
    Cache,
    /// JSON array of queued records, FIFO.
    Queue,
}

impl StoreKey {
    pub const fn as_str(&self) -> &'static str {
        match self {
            StoreKey::Cache => "cache",
            StoreKey::Queue => "queue",
        }
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// DurableStore Trait
// =============================================================================

/// Asynchronous string key/value persistence.
///
/// A successful `set` must be visible to every later `get`, including after
/// a process restart for durable implementations.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Returns the stored value, `None` if the key was never written.
    async fn get(&self, key: &str) -> DbResult<Option<String>>;

    /// Replaces the value stored under `key`.
    async fn set(&self, key: &str, value: &str) -> DbResult<()>;
}

#[async_trait]
impl DurableStore for Database {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        self.kv().get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        self.kv().set(key, value).await
    }
}

// =============================================================================
// MemoryStore
// =============================================================================

#[derive(Debug, Default)]
struct MemoryInner {
    values: RwLock<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    failing_keys: RwLock<HashSet<String>>,
    writes: AtomicUsize,
}

/// In-process store. Clones share the same contents.
///
/// Reads and writes can be made to fail on demand, and successful writes are
/// counted, so callers can assert on persistence behavior.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `get` fail (or succeed again).
    pub fn fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `set` fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes subsequent writes to `key` alone fail.
    pub async fn fail_writes_to(&self, key: &str) {
        self.inner.failing_keys.write().await.insert(key.to_string());
    }

    /// Clears every per-key write failure.
    pub async fn clear_key_failures(&self) {
        self.inner.failing_keys.write().await.clear();
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Reads a value, bypassing failure injection.
    pub async fn peek(&self, key: &str) -> Option<String> {
        self.inner.values.read().await.get(key).cloned()
    }

    /// Writes a value, bypassing failure injection and the write counter.
    pub async fn insert(&self, key: &str, value: &str) {
        self.inner
            .values
            .write()
            .await
            .insert(key.to_string(), value.to_string());
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    async fn get(&self, key: &str) -> DbResult<Option<String>> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(DbError::read_failed(key, "read failure injected"));
        }
        Ok(self.peek(key).await)
    }

    async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        if self.inner.fail_writes.load(Ordering::SeqCst)
            || self.inner.failing_keys.read().await.contains(key)
        {
            return Err(DbError::write_failed(key, "write failure injected"));
        }
        self.insert(key, value).await;
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
