//! # Flush Worker
//!
//! Background task that replays the pending queue without being asked.
//!
//! ## Flush Triggers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        FlushWorker Loop                                 │
//! │                                                                         │
//! │  ConnectivityEvent::Online ──┐                                         │
//! │  FlushWorkerHandle::trigger ─┼──► flush_with_retry()                   │
//! │  poll tick (online &&        │        │                                 │
//! │    pending > 0) ─────────────┘        ▼                                 │
//! │                              engine.flush_pending()                    │
//! │                                       │                                 │
//! │                   retained == 0 ◄─────┴─────► retained > 0 or Err      │
//! │                        │                          │                     │
//! │                      done               failures < max_retry_attempts? │
//! │                                          │ yes               │ no       │
//! │                                          ▼                   ▼          │
//! │                               sleep(next_backoff)   wait for next      │
//! │                               and try again          trigger            │
//! │                                                                         │
//! │  TIMING (WorkerSettings):                                              │
//! │  • Poll interval: 30 seconds                                           │
//! │  • Backoff: 500 ms doubling, capped at 60 seconds                      │
//! │  • Max consecutive failures per trigger: 3                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::WorkerSettings;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::engine::SyncEngineHandle;
use crate::error::{SyncError, SyncResult};

// =============================================================================
// Flush Worker
// =============================================================================

/// Flushes the engine queue on connectivity changes, triggers and a timer.
pub struct FlushWorker {
    engine: SyncEngineHandle,
    connectivity: ConnectivityMonitor,
    settings: WorkerSettings,

    /// Kept so the connectivity subscription can raise triggers.
    trigger_tx: mpsc::Sender<()>,
    trigger_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for controlling the flush worker.
#[derive(Debug, Clone)]
pub struct FlushWorkerHandle {
    trigger_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl FlushWorkerHandle {
    /// Requests a flush. Triggers raised while one is already waiting merge.
    pub fn trigger(&self) {
        match self.trigger_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => debug!("Flush worker stopped, trigger ignored"),
        }
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelError("Shutdown channel closed".into()))
    }
}

impl FlushWorker {
    /// Creates a new flush worker and returns a handle.
    ///
    /// Dropping every handle stops the worker.
    pub fn new(
        engine: SyncEngineHandle,
        connectivity: ConnectivityMonitor,
        settings: WorkerSettings,
    ) -> (Self, FlushWorkerHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let worker = FlushWorker {
            engine,
            connectivity,
            settings,
            trigger_tx: trigger_tx.clone(),
            trigger_rx,
            shutdown_rx,
        };

        (worker, FlushWorkerHandle { trigger_tx, shutdown_tx })
    }

    /// Spawns [`Self::run`] on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs the worker loop until shutdown.
    pub async fn run(mut self) {
        info!(
            poll_interval_secs = self.settings.poll_interval_secs,
            "Flush worker starting"
        );

        let trigger_tx = self.trigger_tx.clone();
        let subscription = self.connectivity.subscribe(move |event| {
            if *event == ConnectivityEvent::Online {
                let _ = trigger_tx.try_send(());
            }
        });

        let poll_interval = Duration::from_secs(self.settings.poll_interval_secs.max(1));
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            let stop = tokio::select! {
                _ = interval.tick() => {
                    if self.connectivity.is_online() && self.engine.pending_count() > 0 {
                        self.flush_with_retry().await
                    } else {
                        false
                    }
                }

                Some(()) = self.trigger_rx.recv() => {
                    debug!("Flush triggered");
                    self.flush_with_retry().await
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Flush worker shutting down");
                    true
                }
            };

            if stop {
                break;
            }
        }

        subscription.unsubscribe();
        info!("Flush worker stopped");
    }

    /// Flushes until the queue drains, the attempt budget runs out or
    /// connectivity drops. Returns true if the worker should stop.
    async fn flush_with_retry(&mut self) -> bool {
        let mut backoff = self.create_backoff();
        let mut failures = 0u32;

        loop {
            if !self.connectivity.is_online() {
                debug!("Offline, skipping flush");
                return false;
            }

            match self.engine.flush_pending().await {
                Ok(report) if report.retained == 0 => {
                    if !report.is_noop() {
                        info!(reconciled = report.reconciled.len(), "Pending queue drained");
                    }
                    return false;
                }
                Ok(report) => {
                    warn!(
                        reconciled = report.reconciled.len(),
                        retained = report.retained,
                        "Flush left records queued"
                    );
                }
                Err(SyncError::ShuttingDown) => {
                    info!("Sync engine stopped, flush worker exiting");
                    return true;
                }
                Err(e) if e.is_retryable() => {
                    error!(error = %e, "Flush failed");
                }
                Err(e) => {
                    error!(error = %e, "Flush failed, not retrying");
                    return false;
                }
            }

            failures += 1;
            if failures >= self.settings.max_retry_attempts {
                warn!(
                    attempts = failures,
                    pending = self.engine.pending_count(),
                    "Giving up until next trigger"
                );
                return false;
            }

            let Some(delay) = backoff.next_backoff() else {
                return false;
            };
            debug!(?delay, attempt = failures, "Waiting before next flush");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown during backoff");
                    return true;
                }
            }
        }
    }

    /// Creates the exponential backoff configuration.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.settings.initial_backoff_ms),
            max_interval: Duration::from_secs(self.settings.max_backoff_secs),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        }
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
    use crate::remote::MemoryRemote;
    use std::sync::Arc;
    use tally_core::{Category, NewRecord};
    use tally_db::MemoryStore;

    fn settings() -> WorkerSettings {
        WorkerSettings {
            poll_interval_secs: 3600,
            initial_backoff_ms: 100,
            max_backoff_secs: 1,
            max_retry_attempts: 3,
        }
    }

    /// Engine with one record queued while the remote was offline.
    async fn engine_with_pending(remote: &MemoryRemote) -> SyncEngineHandle {
        let engine = SyncEngine::new(
            ApiClient::direct(Arc::new(remote.clone())),
            Arc::new(MemoryStore::new()),
            EngineOptions::default(),
        )
        .start()
        .await;

        remote.set_offline(true);
        engine
            .submit_new(NewRecord::new("Test Store", 50.0, Category::Food))
            .await
            .unwrap();
        assert_eq!(engine.pending_count(), 1);
        engine
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_restored_flushes() {
        let remote = MemoryRemote::new();
        let engine = engine_with_pending(&remote).await;
        let connectivity = ConnectivityMonitor::new(false);

        let (worker, handle) = FlushWorker::new(engine.clone(), connectivity.clone(), settings());
        let task = worker.spawn();
        settle().await;
        assert_eq!(engine.pending_count(), 1);

        remote.set_offline(false);
        connectivity.set_online(true);
        settle().await;
        assert_eq!(engine.pending_count(), 0);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts_until_next_trigger() {
        let remote = MemoryRemote::new();
        let engine = engine_with_pending(&remote).await;
        let calls_before = remote.call_count();

        // Online as far as the monitor knows, but the remote keeps failing.
        let (worker, handle) =
            FlushWorker::new(engine.clone(), ConnectivityMonitor::new(true), settings());
        let task = worker.spawn();
        settle().await;

        assert_eq!(remote.call_count() - calls_before, 3);
        assert_eq!(engine.pending_count(), 1);

        remote.set_offline(false);
        handle.trigger();
        settle().await;
        assert_eq!(engine.pending_count(), 0);
        assert_eq!(remote.call_count() - calls_before, 4);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_storage_failure_is_retried() {
        let remote = MemoryRemote::new();
        let store = MemoryStore::new();
        let engine = SyncEngine::new(
            ApiClient::direct(Arc::new(remote.clone())),
            Arc::new(store.clone()),
            EngineOptions::default(),
        )
        .start()
        .await;

        remote.set_offline(true);
        for merchant in ["A", "B"] {
            engine
                .submit_new(NewRecord::new(merchant, 5.0, Category::Food))
                .await
                .unwrap();
        }
        remote.set_offline(false);

        // Each flush stops at the first failed cache write.
        store.fail_writes_to("cache").await;

        let (worker, handle) =
            FlushWorker::new(engine.clone(), ConnectivityMonitor::new(true), settings());
        let task = worker.spawn();
        handle.trigger();
        settle().await;

        let received: Vec<_> = remote
            .received()
            .await
            .into_iter()
            .map(|p| p.merchant)
            .collect();
        assert_eq!(received, ["A", "B"]);
        assert_eq!(engine.pending_count(), 0);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_skips_while_offline() {
        let remote = MemoryRemote::new();
        let engine = engine_with_pending(&remote).await;
        remote.set_offline(false);
        let calls_before = remote.call_count();

        let mut quick = settings();
        quick.poll_interval_secs = 5;
        let connectivity = ConnectivityMonitor::new(false);
        let (worker, handle) = FlushWorker::new(engine.clone(), connectivity.clone(), quick);
        let task = worker.spawn();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(remote.call_count(), calls_before);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
        assert_eq!(engine.pending_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_flushes_records_queued_later() {
        let remote = MemoryRemote::new();
        let engine = engine_with_pending(&remote).await;
        remote.set_offline(false);
        engine.flush_pending().await.unwrap();

        let mut quick = settings();
        quick.poll_interval_secs = 5;
        let (worker, handle) = FlushWorker::new(engine.clone(), ConnectivityMonitor::new(true), quick);
        let task = worker.spawn();

        remote.set_offline(true);
        engine
            .submit_new(NewRecord::new("Later", 5.0, Category::Other))
            .await
            .unwrap();
        remote.set_offline(false);
        assert_eq!(engine.pending_count(), 1);

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(engine.pending_count(), 0);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_shutdown_stops_worker() {
        let remote = MemoryRemote::new();
        let engine = engine_with_pending(&remote).await;
        let (worker, handle) = FlushWorker::new(engine.clone(), ConnectivityMonitor::new(true), settings());

        engine.shutdown().await.unwrap();
        let task = worker.spawn();
        handle.trigger();
        task.await.unwrap();
    }
}
