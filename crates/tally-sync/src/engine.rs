//! # Sync Engine
//!
//! Owns the record cache and the pending queue, and keeps both in agreement
//! with the remote records service.
//!
//! ## Engine Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        SyncEngine Architecture                          │
//! │                                                                         │
//! │  SyncEngineHandle (cloneable)                                          │
//! │  submit_new / flush_pending / get_transactions / apply_pushed ...      │
//! │         │                                                               │
//! │         │  Command + oneshot reply        watch<usize> (pending count) │
//! │         ▼                                        ▲                      │
//! │  ┌──────────────────────────────────────────────┴──────────────────┐  │
//! │  │                     EngineActor (one tokio task)                │  │
//! │  │                                                                 │  │
//! │  │  • Processes one command at a time, so cache read-modify-write │  │
//! │  │    sequences never interleave                                   │  │
//! │  │  • Holds the queue in memory, mirrored to the store             │  │
//! │  │  • Reads the cache from the store per operation                 │  │
//! │  └──────────────┬───────────────────────────────┬──────────────────┘  │
//! │                 ▼                               ▼                      │
//! │          ApiClient (remote)            DurableStore ("cache", "queue") │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Record Lifecycle
//! ```text
//! submit_new ──► send ──ok──► Confirmed (cache front)
//!                 │
//!               fail ──► placeholder "temp-…" at cache front
//!                        + QueuedRecord appended to queue
//!
//! flush_pending ──► replay queue FIFO ──ok──► placeholder rewritten in place
//!                                      │      (Reconciled), entry dequeued
//!                                      └─fail──► entry stays queued
//! ```
//!
//! Remote failures are absorbed (queued or served from cache). Store write
//! failures are returned as [`SyncError::Persistence`].

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use tally_core::fixtures::demo_records;
use tally_core::{NewRecord, QueuedRecord, Record, RecordState};
use tally_db::{DurableStore, StoreKey};

use crate::client::ApiClient;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Default capacity of the command channel.
const DEFAULT_COMMAND_BUFFER: usize = 64;

// =============================================================================
// Options & Reports
// =============================================================================

/// Engine behavior switches.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineOptions {
    /// Serve the demonstration records when the remote is unreachable and
    /// nothing is cached.
    pub seed_demo_data: bool,

    /// Capacity of the command channel.
    pub command_buffer: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        EngineOptions {
            seed_demo_data: true,
            command_buffer: DEFAULT_COMMAND_BUFFER,
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        EngineOptions {
            seed_demo_data: config.engine.seed_demo_data,
            ..Default::default()
        }
    }
}

/// A queued record that the remote accepted during a flush.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Placeholder id the record was shown under.
    pub temp_id: String,

    /// The server-confirmed record that replaced it.
    pub record: Record,
}

/// Outcome of one [`SyncEngineHandle::flush_pending`] pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushReport {
    /// Queue entries replayed against the remote.
    pub attempted: usize,

    /// Entries accepted, in replay order.
    pub reconciled: Vec<Reconciliation>,

    /// Entries still queued after the pass.
    pub retained: usize,
}

impl FlushReport {
    /// True when the pass found nothing to replay.
    pub fn is_noop(&self) -> bool {
        self.attempted == 0
    }

    /// True when entries were replayed and some are still queued.
    pub fn has_failures(&self) -> bool {
        self.attempted > self.reconciled.len()
    }
}

// =============================================================================
// Commands
// =============================================================================

type Reply<T> = oneshot::Sender<T>;

enum Command {
    SubmitNew {
        payload: NewRecord,
        reply: Reply<SyncResult<Record>>,
    },
    FlushPending {
        reply: Reply<SyncResult<FlushReport>>,
    },
    GetTransactions {
        reply: Reply<SyncResult<Vec<Record>>>,
    },
    Pending {
        reply: Reply<Vec<QueuedRecord>>,
    },
    Cached {
        reply: Reply<Vec<Record>>,
    },
    ApplyPushed {
        record: Record,
        reply: Reply<SyncResult<()>>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

// =============================================================================
// SyncEngine
// =============================================================================

/// Unstarted engine. [`SyncEngine::start`] turns it into a running actor.
pub struct SyncEngine {
    client: ApiClient,
    store: Arc<dyn DurableStore>,
    options: EngineOptions,
}

impl SyncEngine {
    pub fn new(client: ApiClient, store: Arc<dyn DurableStore>, options: EngineOptions) -> Self {
        SyncEngine {
            client,
            store,
            options,
        }
    }

    /// Loads the persisted queue and spawns the actor task.
    ///
    /// An unreadable or corrupt queue starts empty.
    pub async fn start(self) -> SyncEngineHandle {
        let queue: Vec<QueuedRecord> = load_list(self.store.as_ref(), StoreKey::Queue).await;
        let (tx, rx) = mpsc::channel(self.options.command_buffer.max(1));
        let (pending_tx, pending_rx) = watch::channel(queue.len());

        info!(
            pending = queue.len(),
            seed_demo_data = self.options.seed_demo_data,
            "Starting sync engine"
        );

        let actor = EngineActor {
            client: self.client,
            store: self.store,
            options: self.options,
            queue,
            pending_tx,
            rx,
        };
        tokio::spawn(actor.run());

        SyncEngineHandle { tx, pending_rx }
    }
}

// =============================================================================
// SyncEngineHandle
// =============================================================================

/// Handle for talking to a running engine. Clones address the same actor.
#[derive(Clone)]
pub struct SyncEngineHandle {
    tx: mpsc::Sender<Command>,
    pending_rx: watch::Receiver<usize>,
}

impl std::fmt::Debug for SyncEngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngineHandle")
            .field("pending", &self.pending_count())
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl SyncEngineHandle {
    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> SyncResult<T> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(make(reply))
            .await
            .map_err(|_| SyncError::ShuttingDown)?;
        response.await.map_err(|_| SyncError::ShuttingDown)
    }

    /// Submits a new record. The payload must already be valid.
    ///
    /// Returns the confirmed record, or a provisional placeholder when the
    /// remote call failed and the payload was queued.
    pub async fn submit_new(&self, payload: NewRecord) -> SyncResult<Record> {
        self.request(|reply| Command::SubmitNew { payload, reply })
            .await?
    }

    /// Replays every queued payload in FIFO order.
    pub async fn flush_pending(&self) -> SyncResult<FlushReport> {
        self.request(|reply| Command::FlushPending { reply }).await?
    }

    /// Returns the remote records, or the cache when the remote is
    /// unreachable.
    pub async fn get_transactions(&self) -> SyncResult<Vec<Record>> {
        self.request(|reply| Command::GetTransactions { reply })
            .await?
    }

    /// Number of queued entries. Does not wait on the actor.
    pub fn pending_count(&self) -> usize {
        *self.pending_rx.borrow()
    }

    /// Snapshot of the queued entries, oldest first.
    pub async fn pending(&self) -> SyncResult<Vec<QueuedRecord>> {
        self.request(|reply| Command::Pending { reply }).await
    }

    /// The persisted cache, without contacting the remote.
    pub async fn cached(&self) -> SyncResult<Vec<Record>> {
        self.request(|reply| Command::Cached { reply }).await
    }

    /// Stores a record that arrived out-of-band at the cache front.
    pub async fn apply_pushed(&self, record: Record) -> SyncResult<()> {
        self.request(|reply| Command::ApplyPushed { record, reply })
            .await?
    }

    /// Watches the pending count.
    pub fn subscribe_pending(&self) -> watch::Receiver<usize> {
        self.pending_rx.clone()
    }

    /// Stops the actor after the commands already queued ahead of it.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) -> SyncResult<()> {
        match self.request(|reply| Command::Shutdown { reply }).await {
            Ok(()) | Err(SyncError::ShuttingDown) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.tx.is_closed()
    }
}

// =============================================================================
// EngineActor
// =============================================================================

struct EngineActor {
    client: ApiClient,
    store: Arc<dyn DurableStore>,
    options: EngineOptions,
    queue: Vec<QueuedRecord>,
    pending_tx: watch::Sender<usize>,
    rx: mpsc::Receiver<Command>,
}

impl EngineActor {
    async fn run(mut self) {
        while let Some(command) = self.rx.recv().await {
            match command {
                Command::SubmitNew { payload, reply } => {
                    let _ = reply.send(self.submit_new(payload).await);
                }
                Command::FlushPending { reply } => {
                    let _ = reply.send(self.flush_pending().await);
                }
                Command::GetTransactions { reply } => {
                    let _ = reply.send(self.get_transactions().await);
                }
                Command::Pending { reply } => {
                    let _ = reply.send(self.queue.clone());
                }
                Command::Cached { reply } => {
                    let _ = reply.send(self.load_cache().await);
                }
                Command::ApplyPushed { record, reply } => {
                    let _ = reply.send(self.apply_pushed(record).await);
                }
                Command::Shutdown { reply } => {
                    info!(pending = self.queue.len(), "Sync engine shutting down");
                    let _ = reply.send(());
                    break;
                }
            }
        }

        info!("Sync engine stopped");
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    async fn submit_new(&mut self, payload: NewRecord) -> SyncResult<Record> {
        debug!(
            merchant = %payload.merchant,
            state = ?RecordState::PendingRemote,
            "Submitting record"
        );

        let failure = match self.client.submit_record(&payload).await {
            Ok(record) => {
                let mut cache = self.load_cache().await;
                upsert_front(&mut cache, record.clone());
                self.save(StoreKey::Cache, &cache).await?;

                info!(id = %record.id, state = ?RecordState::Confirmed, "Record confirmed");
                return Ok(record);
            }
            Err(err) => err,
        };

        let now = Utc::now();
        let placeholder = payload.to_provisional(now);

        self.queue
            .push(QueuedRecord::new(placeholder.id.clone(), payload, now));
        if let Err(e) = self.save_queue().await {
            self.queue.pop();
            error!(temp_id = %placeholder.id, error = %e, "Failed to persist pending queue");
            return Err(e);
        }
        self.publish_pending();

        let mut cache = self.load_cache().await;
        cache.insert(0, placeholder.clone());
        self.save(StoreKey::Cache, &cache).await?;

        warn!(
            temp_id = %placeholder.id,
            error = %failure,
            state = ?RecordState::QueuedLocal,
            pending = self.queue.len(),
            "Remote submission failed, record queued"
        );
        Ok(placeholder)
    }

    async fn flush_pending(&mut self) -> SyncResult<FlushReport> {
        if self.queue.is_empty() {
            debug!("Nothing pending, skipping flush");
            return Ok(FlushReport::default());
        }

        let snapshot = self.queue.clone();
        info!(count = snapshot.len(), "Flushing pending records");

        let mut attempted = 0;
        let mut reconciled = Vec::new();
        let mut cache_error = None;

        for entry in &snapshot {
            attempted += 1;

            let record = match self.client.submit_record(&entry.payload).await {
                Ok(record) => record,
                Err(err) => {
                    warn!(temp_id = %entry.temp_id, error = %err, "Replay failed, record stays queued");
                    continue;
                }
            };

            let mut cache = self.load_cache().await;
            reconcile(&mut cache, &entry.temp_id, record.clone());
            reconciled.push(Reconciliation {
                temp_id: entry.temp_id.clone(),
                record: record.clone(),
            });

            if let Err(e) = self.save(StoreKey::Cache, &cache).await {
                error!(temp_id = %entry.temp_id, error = %e, "Failed to persist reconciled cache");
                cache_error = Some(e);
                break;
            }

            info!(
                temp_id = %entry.temp_id,
                id = %record.id,
                state = ?RecordState::Reconciled,
                "Record reconciled"
            );
        }

        // Accepted entries leave the queue even if the cache write failed,
        // otherwise the next flush would submit them again.
        let done: HashSet<&str> = reconciled.iter().map(|r| r.temp_id.as_str()).collect();
        self.queue.retain(|q| !done.contains(q.temp_id.as_str()));
        let queue_result = self.save_queue().await;
        self.publish_pending();

        if let Some(e) = cache_error {
            return Err(e);
        }
        if let Err(e) = queue_result {
            error!(error = %e, "Failed to persist pending queue after flush");
            return Err(e);
        }

        let report = FlushReport {
            attempted,
            reconciled,
            retained: self.queue.len(),
        };
        info!(
            attempted = report.attempted,
            reconciled = report.reconciled.len(),
            retained = report.retained,
            "Flush complete"
        );
        Ok(report)
    }

    async fn get_transactions(&mut self) -> SyncResult<Vec<Record>> {
        let remote = match self.client.fetch_records().await {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "Fetch failed, serving cached records");
                return self.fallback().await;
            }
        };

        self.save(StoreKey::Cache, &remote).await?;
        debug!(count = remote.len(), "Cache replaced from remote");
        Ok(remote)
    }

    async fn fallback(&self) -> SyncResult<Vec<Record>> {
        let cached = self.load_cache().await;
        if !cached.is_empty() || !self.options.seed_demo_data {
            return Ok(cached);
        }

        let demo = demo_records(Utc::now());
        self.save(StoreKey::Cache, &demo).await?;
        info!(count = demo.len(), "Seeded demonstration records");
        Ok(demo)
    }

    async fn apply_pushed(&mut self, record: Record) -> SyncResult<()> {
        let id = record.id.clone();
        let mut cache = self.load_cache().await;
        upsert_front(&mut cache, record);
        self.save(StoreKey::Cache, &cache).await?;

        debug!(id = %id, "Applied pushed record");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    async fn load_cache(&self) -> Vec<Record> {
        load_list(self.store.as_ref(), StoreKey::Cache).await
    }

    async fn save<T: Serialize>(&self, key: StoreKey, value: &T) -> SyncResult<()> {
        let json = serde_json::to_string(value)?;
        self.store.set(key.as_str(), &json).await?;
        Ok(())
    }

    async fn save_queue(&self) -> SyncResult<()> {
        self.save(StoreKey::Queue, &self.queue).await
    }

    fn publish_pending(&self) {
        self.pending_tx.send_replace(self.queue.len());
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Reads a JSON array, treating a missing, unreadable or corrupt value as empty.
async fn load_list<T: DeserializeOwned>(store: &dyn DurableStore, key: StoreKey) -> Vec<T> {
    let raw = match store.get(key.as_str()).await {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(e) => {
            warn!(key = %key, error = %e, "Store read failed, treating as empty");
            return Vec::new();
        }
    };

    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(key = %key, error = %e, "Stored value is corrupt, treating as empty");
        Vec::new()
    })
}

/// Puts `record` at the front, dropping any entry with the same id.
fn upsert_front(cache: &mut Vec<Record>, record: Record) {
    cache.retain(|r| r.id != record.id);
    cache.insert(0, record);
}

/// Rewrites the entry shown under `temp_id` in place.
///
/// Other entries already carrying the confirmed id are dropped. If the
/// placeholder is gone the record goes to the front instead.
fn reconcile(cache: &mut Vec<Record>, temp_id: &str, record: Record) {
    let Some(index) = cache.iter().position(|r| r.id == temp_id) else {
        upsert_front(cache, record);
        return;
    };

    let id = record.id.clone();
    cache[index] = record;

    let mut position = 0;
    cache.retain(|r| {
        let keep = position == index || r.id != id;
        position += 1;
        keep
    });
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MemoryRemote, Scripted};
    use serde_json::json;
    use tally_core::Category;
    use tally_db::MemoryStore;

    async fn start_engine(
        remote: &MemoryRemote,
        store: &MemoryStore,
        seed_demo_data: bool,
    ) -> SyncEngineHandle {
        let client = ApiClient::direct(Arc::new(remote.clone()));
        let options = EngineOptions {
            seed_demo_data,
            ..Default::default()
        };
        SyncEngine::new(client, Arc::new(store.clone()), options)
            .start()
            .await
    }

    fn payload(merchant: &str) -> NewRecord {
        NewRecord::new(merchant, 10.0, Category::Food)
    }

    async fn stored_cache(store: &MemoryStore) -> Vec<Record> {
        serde_json::from_str(&store.peek("cache").await.unwrap()).unwrap()
    }

    async fn stored_queue(store: &MemoryStore) -> Vec<QueuedRecord> {
        serde_json::from_str(&store.peek("queue").await.unwrap()).unwrap()
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_reconcile_rewrites_in_place_and_dedupes() {
        let now = Utc::now();
        let mut cache = vec![
            payload("C").to_record("temp-c", now),
            payload("B").to_record("srv-9", now),
            payload("A").to_record("temp-a", now),
        ];

        reconcile(&mut cache, "temp-a", payload("A").to_record("srv-9", now));
        assert_eq!(ids(&cache), ["temp-c", "srv-9"]);
        assert_eq!(cache[1].merchant, "A");

        reconcile(&mut cache, "temp-gone", payload("Z").to_record("srv-10", now));
        assert_eq!(ids(&cache), ["srv-10", "temp-c", "srv-9"]);
    }

    #[tokio::test]
    async fn test_submit_confirmed_goes_to_cache_front() {
        let remote = MemoryRemote::new();
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, true).await;

        let first = engine.submit_new(payload("A")).await.unwrap();
        let second = engine.submit_new(payload("B")).await.unwrap();

        assert_eq!(first.id, "srv-1");
        assert!(!second.is_provisional());
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(ids(&stored_cache(&store).await), ["srv-2", "srv-1"]);
    }

    #[tokio::test]
    async fn test_offline_submit_queues_placeholder() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, true).await;

        let record = engine
            .submit_new(NewRecord::new("Test Store", 50.0, Category::Food))
            .await
            .unwrap();

        assert!(record.is_provisional());
        assert_eq!(record.merchant, "Test Store");
        assert_eq!(engine.pending_count(), 1);

        let queue = stored_queue(&store).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].temp_id, record.id);
        assert_eq!(stored_cache(&store).await, vec![record]);
    }

    #[tokio::test]
    async fn test_flush_reconciles_with_server_record() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, true).await;

        let placeholder = engine
            .submit_new(NewRecord::new("Test Store", 50.0, Category::Food))
            .await
            .unwrap();

        remote.set_offline(false);
        remote
            .push_script(Scripted::Respond(json!({
                "id": "123",
                "merchant": "Test Store",
                "amount": 50.0,
                "category": "Food",
                "date": "2025-10-15T10:00:00Z",
                "createdAt": "2025-10-15T10:00:00Z"
            })))
            .await;

        let report = engine.flush_pending().await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.retained, 0);
        assert_eq!(report.reconciled[0].temp_id, placeholder.id);
        assert_eq!(engine.pending_count(), 0);

        let cache = stored_cache(&store).await;
        assert_eq!(ids(&cache), ["123"]);
        assert!(cache.iter().all(|r| !r.is_provisional()));
        assert!(stored_queue(&store).await.is_empty());
    }

    #[tokio::test]
    async fn test_flush_is_fifo_and_keeps_failures_in_place() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, true).await;

        for merchant in ["A", "B", "C"] {
            engine.submit_new(payload(merchant)).await.unwrap();
        }
        let temp_b = engine.pending().await.unwrap()[1].temp_id.clone();

        remote.set_offline(false);
        remote.push_script(Scripted::Pass).await;
        remote.fail_next(1).await;

        let report = engine.flush_pending().await.unwrap();
        assert_eq!(report.attempted, 3);
        assert_eq!(report.reconciled.len(), 2);
        assert_eq!(report.retained, 1);
        assert!(report.has_failures());

        let received: Vec<_> = remote
            .received()
            .await
            .into_iter()
            .map(|p| p.merchant)
            .collect();
        assert_eq!(received, ["A", "C"]);

        let queue = engine.pending().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].payload.merchant, "B");
        assert_eq!(stored_queue(&store).await, queue);

        // C was newest, so it stays in front; B keeps its slot.
        let cache = stored_cache(&store).await;
        assert_eq!(ids(&cache), ["srv-2", temp_b.as_str(), "srv-1"]);
    }

    #[tokio::test]
    async fn test_empty_flush_writes_nothing() {
        let remote = MemoryRemote::new();
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, true).await;

        let report = engine.flush_pending().await.unwrap();
        assert!(report.is_noop());
        assert_eq!(store.write_count(), 0);
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cold_start_offline_seeds_demo_records() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, true).await;

        let records = engine.get_transactions().await.unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(stored_cache(&store).await, records);

        // Served from cache from now on, no second seeding.
        let writes = store.write_count();
        assert_eq!(engine.get_transactions().await.unwrap(), records);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_cold_start_without_demo_data_is_empty() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, false).await;

        assert!(engine.get_transactions().await.unwrap().is_empty());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_fetch_replaces_cache() {
        let now = Utc::now();
        let remote = MemoryRemote::with_records(vec![payload("Remote").to_record("srv-a", now)]).await;
        let store = MemoryStore::new();
        let stale = payload("Stale").to_record("temp-1-deadbeef", now);
        store
            .insert("cache", &serde_json::to_string(&vec![stale]).unwrap())
            .await;

        let engine = start_engine(&remote, &store, true).await;

        let records = engine.get_transactions().await.unwrap();
        assert_eq!(ids(&records), ["srv-a"]);
        assert_eq!(stored_cache(&store).await, records);
    }

    #[tokio::test]
    async fn test_fetch_drops_placeholder_until_flush() {
        let remote = MemoryRemote::new();
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, true).await;

        remote.set_offline(true);
        let placeholder = engine.submit_new(payload("Local")).await.unwrap();
        remote.set_offline(false);

        // The remote has nothing yet, so the refreshed cache is empty.
        assert!(engine.get_transactions().await.unwrap().is_empty());
        assert_eq!(engine.pending_count(), 1);

        // The queued record comes back through reconciliation.
        let report = engine.flush_pending().await.unwrap();
        assert_eq!(report.reconciled[0].temp_id, placeholder.id);
        let cache = engine.cached().await.unwrap();
        assert_eq!(ids(&cache), ["srv-1"]);
        assert_eq!(cache[0].merchant, "Local");
    }

    #[tokio::test]
    async fn test_fetch_failure_serves_cache() {
        let remote = MemoryRemote::new();
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, true).await;

        let record = engine.submit_new(payload("A")).await.unwrap();
        remote.set_offline(true);

        assert_eq!(engine.get_transactions().await.unwrap(), vec![record.clone()]);
        assert_eq!(engine.cached().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_queue_survives_restart() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let store = MemoryStore::new();

        let engine = start_engine(&remote, &store, true).await;
        let placeholder = engine.submit_new(payload("A")).await.unwrap();
        engine.shutdown().await.unwrap();

        let restarted = start_engine(&remote, &store, true).await;
        assert_eq!(restarted.pending_count(), 1);
        assert_eq!(restarted.pending().await.unwrap()[0].temp_id, placeholder.id);

        remote.set_offline(false);
        restarted.flush_pending().await.unwrap();
        assert_eq!(restarted.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_queue_write_failure_is_fatal_and_rolled_back() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let store = MemoryStore::new();
        store.fail_writes(true);
        let engine = start_engine(&remote, &store, true).await;

        let err = engine.submit_new(payload("A")).await.unwrap_err();
        assert!(matches!(err, SyncError::Persistence(_)));
        assert_eq!(engine.pending_count(), 0);
        assert!(engine.pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cache_failure_mid_flush_still_dequeues_accepted() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, true).await;

        engine.submit_new(payload("A")).await.unwrap();
        engine.submit_new(payload("B")).await.unwrap();

        remote.set_offline(false);
        store.fail_writes_to("cache").await;

        let err = engine.flush_pending().await.unwrap_err();
        assert!(matches!(err, SyncError::Persistence(_)));

        let received: Vec<_> = remote.received().await.into_iter().map(|p| p.merchant).collect();
        assert_eq!(received, ["A"]);

        let queue = stored_queue(&store).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].payload.merchant, "B");
        assert_eq!(engine.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_documents_are_treated_as_empty() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let store = MemoryStore::new();
        store.insert("queue", "not json").await;
        store.insert("cache", "{").await;

        let engine = start_engine(&remote, &store, false).await;
        assert_eq!(engine.pending_count(), 0);
        assert!(engine.get_transactions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_failure_is_treated_as_empty() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let store = MemoryStore::new();
        store.fail_reads(true);

        let engine = start_engine(&remote, &store, false).await;
        assert!(engine.cached().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_pushed_replaces_same_id() {
        let now = Utc::now();
        let remote = MemoryRemote::new();
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, true).await;

        engine.submit_new(payload("A")).await.unwrap();
        engine
            .apply_pushed(payload("B").to_record("push-1", now))
            .await
            .unwrap();
        engine
            .apply_pushed(payload("B2").to_record("push-1", now))
            .await
            .unwrap();

        let cache = engine.cached().await.unwrap();
        assert_eq!(ids(&cache), ["push-1", "srv-1"]);
        assert_eq!(cache[0].merchant, "B2");
    }

    #[tokio::test]
    async fn test_duplicate_submissions_are_both_queued() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, true).await;

        let a = engine.submit_new(payload("Same")).await.unwrap();
        let b = engine.submit_new(payload("Same")).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(engine.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_pending_watch_tracks_queue() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, true).await;
        let mut watch = engine.subscribe_pending();

        engine.submit_new(payload("A")).await.unwrap();
        assert!(watch.has_changed().unwrap());
        assert_eq!(*watch.borrow_and_update(), 1);

        remote.set_offline(false);
        engine.flush_pending().await.unwrap();
        assert_eq!(*watch.borrow_and_update(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_and_flushes_lose_nothing() {
        let remote = MemoryRemote::new();
        let store = MemoryStore::new();
        let engine = start_engine(&remote, &store, false).await;

        remote.set_offline(true);
        let tasks: Vec<_> = (0..40)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.submit_new(payload(&format!("Offline {i}"))).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_provisional());
        }
        assert_eq!(engine.pending_count(), 40);
        assert_eq!(stored_queue(&store).await.len(), 40);
        assert_eq!(engine.cached().await.unwrap().len(), 40);

        remote.set_offline(false);
        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        engine.flush_pending().await.map(|_| ())
                    } else {
                        engine.submit_new(payload(&format!("Online {i}"))).await.map(|_| ())
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        engine.flush_pending().await.unwrap();

        let cache = engine.cached().await.unwrap();
        assert_eq!(cache.len(), 50);
        assert!(cache.iter().all(|r| !r.is_provisional()));
        assert_eq!(engine.pending_count(), 0);
        assert!(stored_queue(&store).await.is_empty());
        assert_eq!(remote.records().await.len(), 50);
    }

    #[tokio::test]
    async fn test_calls_after_shutdown_fail() {
        let engine = start_engine(&MemoryRemote::new(), &MemoryStore::new(), true).await;
        let other = engine.clone();

        engine.shutdown().await.unwrap();
        engine.shutdown().await.unwrap();

        assert!(matches!(
            other.flush_pending().await,
            Err(SyncError::ShuttingDown)
        ));
        assert!(matches!(
            other.submit_new(payload("A")).await,
            Err(SyncError::ShuttingDown)
        ));
    }
}
