//! # In-Process Remote
//!
//! A fake records service that speaks the same wire contract as the real
//! one. Used by tests and by the CLI when `api.base_url = "memory://"`.
//!
//! ```text
//! GET  /records  → JSON array of Record, newest first
//! POST /records  → NewRecord body, returns the stored Record (id "srv-N")
//! ```
//!
//! Behavior can be steered per call: switch the whole remote offline, or
//! queue scripted outcomes that are consumed one per request before the
//! normal handling applies.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use tally_core::{NewRecord, Record};

use crate::client::RECORDS_PATH;
use crate::transport::{ApiError, ApiResult, Transport};

/// Base URL that selects the in-process remote.
pub const MEMORY_URL: &str = "memory://";

/// A one-shot outcome for the next request.
#[derive(Debug, Clone)]
pub enum Scripted {
    /// Fail with this error.
    Fail(ApiError),
    /// Answer with this body, bypassing the stored records.
    Respond(Value),
    /// Handle the request normally. Lets a script skip a call.
    Pass,
}

#[derive(Debug, Default)]
struct RemoteState {
    records: Vec<Record>,
    script: VecDeque<Scripted>,
    received: Vec<NewRecord>,
}

/// In-memory records service. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemote {
    state: Arc<Mutex<RemoteState>>,
    offline: Arc<AtomicBool>,
    next_id: Arc<AtomicU64>,
    calls: Arc<AtomicU64>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts with `records` already stored (newest first).
    pub async fn with_records(records: Vec<Record>) -> Self {
        let remote = Self::new();
        remote.state.lock().await.records = records;
        remote
    }

    /// While offline every request fails with code `OFFLINE`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Queues a scripted outcome.
    pub async fn push_script(&self, outcome: Scripted) {
        self.state.lock().await.script.push_back(outcome);
    }

    /// Makes the next `n` requests fail.
    pub async fn fail_next(&self, n: usize) {
        let mut state = self.state.lock().await;
        for _ in 0..n {
            state
                .script
                .push_back(Scripted::Fail(ApiError::new("Scripted failure").with_code("SCRIPTED")));
        }
    }

    /// Records currently stored, newest first.
    pub async fn records(&self) -> Vec<Record> {
        self.state.lock().await.records.clone()
    }

    /// Every payload accepted by `POST /records`, in arrival order.
    pub async fn received(&self) -> Vec<NewRecord> {
        self.state.lock().await.received.clone()
    }

    /// Number of requests seen, including failed ones.
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn take_script(&self) -> Option<Scripted> {
        self.state.lock().await.script.pop_front()
    }

    /// Common prelude: count, offline check, scripted outcome.
    async fn intercept(&self) -> Option<ApiResult<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.is_offline() {
            return Some(Err(
                ApiError::new("Remote is unreachable").with_code(ApiError::OFFLINE)
            ));
        }

        match self.take_script().await {
            Some(Scripted::Fail(err)) => Some(Err(err)),
            Some(Scripted::Respond(body)) => Some(Ok(body)),
            Some(Scripted::Pass) | None => None,
        }
    }
}

fn not_found(path: &str) -> ApiError {
    ApiError::http_status(404, format!("No route for {}", path))
}

fn encode<T: serde::Serialize>(value: &T) -> ApiResult<Value> {
    serde_json::to_value(value).map_err(|e| ApiError::decode(e.to_string()))
}

#[async_trait]
impl Transport for MemoryRemote {
    async fn get(&self, path: &str) -> ApiResult<Value> {
        if let Some(outcome) = self.intercept().await {
            return outcome;
        }
        if path != RECORDS_PATH {
            return Err(not_found(path));
        }

        let state = self.state.lock().await;
        encode(&state.records)
    }

    async fn post(&self, path: &str, body: Value) -> ApiResult<Value> {
        if let Some(outcome) = self.intercept().await {
            return outcome;
        }
        if path != RECORDS_PATH {
            return Err(not_found(path));
        }

        let payload: NewRecord = serde_json::from_value(body)
            .map_err(|e| ApiError::http_status(400, format!("Invalid record: {}", e)))?;

        let id = format!("srv-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let record = payload.to_record(id, Utc::now());
        debug!(id = %record.id, merchant = %record.merchant, "Remote stored record");

        let mut state = self.state.lock().await;
        state.received.push(payload);
        state.records.insert(0, record.clone());
        encode(&record)
    }
}
