//! # Records Facade
//!
//! The surface presentation code talks to. Wraps a [`SyncEngineHandle`] with
//! input validation, an optimistic view of the record list, and the
//! offline/pending status shown to users.
//!
//! ## Optimistic Create
//! ```text
//! create_record(payload)
//!      │
//!      ├── validate ──invalid──► Err(Validation), view untouched
//!      │
//!      ├── insert "optimistic-<millis>-<n>" at view front   (visible immediately)
//!      │
//!      ▼
//! engine.submit_new(payload)
//!      │
//!      ├── Ok(record) ──► replace optimistic entry with record
//!      │                  (confirmed, or a queued placeholder)
//!      │
//!      └── Err(e) ──────► remove the optimistic entry, return Err(e)
//!
//! Only this call's entry is touched, so concurrent creates keep theirs.
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use tally_core::summary::calculate_summary;
use tally_core::validation::validate_new_record;
use tally_core::{NewRecord, Record, RecordSummary, OPTIMISTIC_ID_PREFIX};

use crate::connectivity::ConnectivityMonitor;
use crate::engine::{FlushReport, SyncEngineHandle};
use crate::error::SyncResult;
use crate::events::{PushFeed, Subscription};

// =============================================================================
// Sync Status
// =============================================================================

/// What the user should be told about sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    /// Whether the remote is believed reachable.
    pub online: bool,

    /// Records waiting for replay.
    pub pending: usize,
}

impl SyncStatus {
    pub fn show_offline_banner(&self) -> bool {
        !self.online || self.pending > 0
    }

    /// Banner message, `None` when there is nothing to report.
    pub fn banner_text(&self) -> Option<String> {
        let queued = match self.pending {
            0 => None,
            1 => Some("1 expense queued for sync".to_string()),
            n => Some(format!("{} expenses queued for sync", n)),
        };

        match (self.online, queued) {
            (true, None) => None,
            (true, Some(queued)) => Some(queued),
            (false, None) => Some("You're offline".to_string()),
            (false, Some(queued)) => Some(format!("You're offline. {}", queued)),
        }
    }
}

// =============================================================================
// RecordsFacade
// =============================================================================

/// Query/mutation entry point with an optimistic view. Clones share the view.
#[derive(Debug, Clone)]
pub struct RecordsFacade {
    engine: SyncEngineHandle,
    connectivity: ConnectivityMonitor,
    view: Arc<RwLock<Vec<Record>>>,
    next_optimistic: Arc<AtomicU64>,
}

impl RecordsFacade {
    pub fn new(engine: SyncEngineHandle, connectivity: ConnectivityMonitor) -> Self {
        RecordsFacade {
            engine,
            connectivity,
            view: Arc::new(RwLock::new(Vec::new())),
            next_optimistic: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn engine(&self) -> &SyncEngineHandle {
        &self.engine
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Remote records, or the cache when the remote is unreachable.
    ///
    /// The result becomes the current view.
    pub async fn list_records(&self) -> SyncResult<Vec<Record>> {
        let records = self.engine.get_transactions().await?;
        self.set_view(records.clone());
        Ok(records)
    }

    /// Validates and submits a new record, showing it optimistically first.
    pub async fn create_record(&self, payload: NewRecord) -> SyncResult<Record> {
        validate_new_record(&payload)?;

        let now = Utc::now();
        let optimistic = payload.to_record(
            format!(
                "{}{}-{}",
                OPTIMISTIC_ID_PREFIX,
                now.timestamp_millis(),
                self.next_optimistic.fetch_add(1, Ordering::Relaxed)
            ),
            now,
        );
        self.update_view(|view| view.insert(0, optimistic.clone()));

        match self.engine.submit_new(payload).await {
            Ok(record) => {
                self.update_view(|view| replace_entry(view, &optimistic.id, record.clone()));
                debug!(id = %record.id, provisional = record.is_provisional(), "Record created");
                Ok(record)
            }
            Err(e) => {
                warn!(error = %e, "Create failed, removing optimistic entry");
                self.update_view(|view| view.retain(|r| r.id != optimistic.id));
                Err(e)
            }
        }
    }

    /// Replays pending records, then refreshes the view from the cache.
    ///
    /// Safe to call with nothing pending.
    pub async fn flush(&self) -> SyncResult<FlushReport> {
        let report = self.engine.flush_pending().await?;
        let cached = self.engine.cached().await?;
        self.set_view(cached);
        Ok(report)
    }

    pub fn pending_count(&self) -> usize {
        self.engine.pending_count()
    }

    /// Current view, newest first.
    pub fn view(&self) -> Vec<Record> {
        self.view.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            online: self.connectivity.is_online(),
            pending: self.pending_count(),
        }
    }

    /// Totals over the current view.
    pub fn summary(&self) -> RecordSummary {
        calculate_summary(&self.view())
    }

    /// Stores an out-of-band record and shows it at the view front.
    pub async fn handle_push(&self, record: Record) -> SyncResult<()> {
        self.engine.apply_pushed(record.clone()).await?;
        self.update_view(|view| {
            view.retain(|r| r.id != record.id);
            view.insert(0, record);
        });
        Ok(())
    }

    /// Routes every record published on `feed` through [`Self::handle_push`].
    ///
    /// Publishing must happen inside a Tokio runtime; records published
    /// elsewhere are dropped with a warning.
    pub fn attach_push_feed(&self, feed: &PushFeed) -> Subscription {
        let facade = self.clone();
        feed.subscribe(move |record: &Record| {
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                warn!(id = %record.id, "Pushed record outside a runtime, dropped");
                return;
            };

            let facade = facade.clone();
            let record = record.clone();
            runtime.spawn(async move {
                let id = record.id.clone();
                if let Err(e) = facade.handle_push(record).await {
                    warn!(id = %id, error = %e, "Failed to apply pushed record");
                }
            });
        })
    }

    fn set_view(&self, records: Vec<Record>) {
        if let Ok(mut view) = self.view.write() {
            *view = records;
        }
    }

    fn update_view(&self, f: impl FnOnce(&mut Vec<Record>)) {
        if let Ok(mut view) = self.view.write() {
            f(&mut view);
        }
    }
}

/// Swaps the entry with `id` for `record`, dropping other copies of it.
fn replace_entry(view: &mut Vec<Record>, id: &str, record: Record) {
    view.retain(|r| r.id == id || r.id != record.id);
    match view.iter_mut().find(|r| r.id == id) {
        Some(slot) => *slot = record,
        None => view.insert(0, record),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiClient;
    use crate::engine::{EngineOptions, SyncEngine};
    use crate::error::SyncError;
    use crate::remote::{MemoryRemote, Scripted};
    use crate::transport::{ApiResult, Transport};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::time::Duration;
    use tally_core::Category;
    use tally_db::MemoryStore;
    use tokio::sync::Semaphore;

    async fn facade_over(transport: Arc<dyn Transport>, store: &MemoryStore) -> RecordsFacade {
        let engine = SyncEngine::new(
            ApiClient::direct(transport),
            Arc::new(store.clone()),
            EngineOptions {
                seed_demo_data: false,
                ..Default::default()
            },
        )
        .start()
        .await;
        RecordsFacade::new(engine, ConnectivityMonitor::default())
    }

    async fn facade(remote: &MemoryRemote, store: &MemoryStore) -> RecordsFacade {
        facade_over(Arc::new(remote.clone()), store).await
    }

    fn record(id: &str, amount: f64, category: Category) -> Record {
        NewRecord::new("Shop", amount, category).to_record(id, Utc::now())
    }

    /// Holds every POST until a permit is added.
    struct GatedTransport {
        inner: MemoryRemote,
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn get(&self, path: &str) -> ApiResult<Value> {
            self.inner.get(path).await
        }

        async fn post(&self, path: &str, body: Value) -> ApiResult<Value> {
            if let Ok(permit) = self.gate.acquire().await {
                permit.forget();
            }
            self.inner.post(path, body).await
        }
    }

    #[test]
    fn test_banner_text() {
        let status = |online, pending| SyncStatus { online, pending };

        assert_eq!(status(true, 0).banner_text(), None);
        assert!(!status(true, 0).show_offline_banner());
        assert_eq!(
            status(true, 1).banner_text().as_deref(),
            Some("1 expense queued for sync")
        );
        assert_eq!(status(false, 0).banner_text().as_deref(), Some("You're offline"));
        assert_eq!(
            status(false, 3).banner_text().as_deref(),
            Some("You're offline. 3 expenses queued for sync")
        );
        assert!(status(true, 2).show_offline_banner());
    }

    #[tokio::test]
    async fn test_invalid_payload_never_reaches_engine() {
        let remote = MemoryRemote::new();
        let facade = facade(&remote, &MemoryStore::new()).await;

        let err = facade
            .create_record(NewRecord::new("   ", 10.0, Category::Food))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let err = facade
            .create_record(NewRecord::new("Cafe", -1.0, Category::Food))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        assert!(facade.view().is_empty());
        assert_eq!(remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_optimistic_entry_visible_until_engine_answers() {
        let remote = MemoryRemote::new();
        let gate = Arc::new(Semaphore::new(0));
        let transport = Arc::new(GatedTransport {
            inner: remote.clone(),
            gate: gate.clone(),
        });
        let facade = facade_over(transport, &MemoryStore::new()).await;

        let pending = tokio::spawn({
            let facade = facade.clone();
            async move {
                facade
                    .create_record(NewRecord::new("Cafe", 4.5, Category::Food))
                    .await
            }
        });

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        let view = facade.view();
        assert_eq!(view.len(), 1);
        assert!(view[0].id.starts_with(OPTIMISTIC_ID_PREFIX));
        assert_eq!(view[0].merchant, "Cafe");

        gate.add_permits(1);
        let created = pending.await.unwrap().unwrap();
        assert_eq!(created.id, "srv-1");
        assert_eq!(facade.view(), vec![created]);
    }

    #[tokio::test]
    async fn test_offline_create_shows_placeholder_and_status() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let facade = facade(&remote, &MemoryStore::new()).await;

        let created = facade
            .create_record(NewRecord::new("Test Store", 50.0, Category::Food))
            .await
            .unwrap();

        assert!(created.is_provisional());
        assert_eq!(facade.view(), vec![created]);
        assert_eq!(facade.pending_count(), 1);

        let status = facade.status();
        assert!(status.online);
        assert_eq!(status.pending, 1);
        assert!(status.show_offline_banner());
    }

    #[tokio::test]
    async fn test_failed_create_restores_view() {
        let remote = MemoryRemote::with_records(vec![record("srv-a", 10.0, Category::Food)]).await;
        let store = MemoryStore::new();
        let facade = facade(&remote, &store).await;

        let before = facade.list_records().await.unwrap();
        remote.set_offline(true);
        store.fail_writes(true);

        let err = facade
            .create_record(NewRecord::new("Cafe", 4.5, Category::Food))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Persistence(_)));
        assert_eq!(facade.view(), before);
        assert_eq!(facade.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_create_keeps_concurrent_success() {
        let remote = MemoryRemote::new();
        remote.push_script(Scripted::Pass).await;
        remote.fail_next(1).await;
        let store = MemoryStore::new();
        store.fail_writes_to("queue").await;

        let gate = Arc::new(Semaphore::new(0));
        let transport = Arc::new(GatedTransport {
            inner: remote.clone(),
            gate: gate.clone(),
        });
        let facade = facade_over(transport, &store).await;

        let spawn_create = |merchant: &'static str| {
            let facade = facade.clone();
            tokio::spawn(async move {
                facade
                    .create_record(NewRecord::new(merchant, 4.5, Category::Food))
                    .await
            })
        };
        async fn wait_for_view(facade: &RecordsFacade, len: usize) {
            for _ in 0..50 {
                if facade.view().len() == len {
                    return;
                }
                tokio::task::yield_now().await;
            }
            panic!("view never reached {len} entries");
        }

        let first = spawn_create("Cafe");
        wait_for_view(&facade, 1).await;
        let second = spawn_create("Bakery");
        wait_for_view(&facade, 2).await;

        let ids: Vec<_> = facade.view().into_iter().map(|r| r.id).collect();
        assert_ne!(ids[0], ids[1]);

        gate.add_permits(2);
        let confirmed = first.await.unwrap().unwrap();
        let err = second.await.unwrap().unwrap_err();

        assert_eq!(confirmed.id, "srv-1");
        assert!(matches!(err, SyncError::Persistence(_)));
        assert_eq!(facade.view(), vec![confirmed]);
        assert_eq!(facade.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_flush_refreshes_view() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        let facade = facade(&remote, &MemoryStore::new()).await;

        facade
            .create_record(NewRecord::new("Test Store", 50.0, Category::Food))
            .await
            .unwrap();

        remote.set_offline(false);
        let report = facade.flush().await.unwrap();
        assert_eq!(report.reconciled.len(), 1);

        let view = facade.view();
        assert_eq!(view.len(), 1);
        assert_eq!(view[0].id, "srv-1");
        assert!(!facade.status().show_offline_banner());

        // Nothing left: flushing again is a no-op.
        assert!(facade.flush().await.unwrap().is_noop());
    }

    #[tokio::test]
    async fn test_summary_over_view() {
        let remote = MemoryRemote::with_records(vec![
            record("3", 75.0, Category::Food),
            record("2", 50.0, Category::Transport),
            record("1", 100.0, Category::Food),
        ])
        .await;
        let facade = facade(&remote, &MemoryStore::new()).await;

        assert_eq!(facade.summary(), RecordSummary::default());

        facade.list_records().await.unwrap();
        let summary = facade.summary();
        assert_eq!(summary.total_spend, 225.0);
        assert_eq!(summary.transaction_count, 3);
        assert_eq!(summary.average_transaction, 75.0);
        assert_eq!(summary.spend_for(Category::Food), 175.0);
        assert_eq!(summary.spend_for(Category::Transport), 50.0);
    }

    #[tokio::test]
    async fn test_pushed_records_reach_view_and_cache() {
        let remote = MemoryRemote::new();
        let facade = facade(&remote, &MemoryStore::new()).await;

        facade
            .handle_push(record("push-1", 9.0, Category::Other))
            .await
            .unwrap();
        assert_eq!(facade.view()[0].id, "push-1");

        let feed = PushFeed::new();
        let subscription = facade.attach_push_feed(&feed);
        feed.publish(&record("push-2", 3.0, Category::Food));

        let mut applied = false;
        for _ in 0..50 {
            if facade.view().iter().any(|r| r.id == "push-2") {
                applied = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(applied);

        let cached = facade.engine().cached().await.unwrap();
        let ids: Vec<_> = cached.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["push-2", "push-1"]);

        subscription.unsubscribe();
        assert_eq!(feed.subscriber_count(), 0);
    }
}
