//! # API Client
//!
//! Typed access to the records service on top of any [`Transport`], with an
//! optional simulation hook in front of every call.
//!
//! ## Call Path
//! ```text
//! fetch::<T>(path) / send::<B, T>(path, body)
//!      │
//!      ▼
//! simulate()  ── sleep U[0, latency) ── roll < failure_rate? ──► SIMULATED_FAILURE
//!      │
//!      ▼
//! transport.get / transport.post   (ApiResult<Value>)
//!      │
//!      ▼
//! serde_json::from_value::<T>      (DECODE_FAILED on mismatch)
//! ```
//!
//! The random source is a seedable `StdRng`, so a fixed seed replays the
//! same sequence of delays and failures.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use tally_core::{NewRecord, Record};

use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::remote::MemoryRemote;
use crate::transport::{ApiError, ApiResult, HttpTransport, Transport};

/// Path of the records collection.
pub const RECORDS_PATH: &str = "/records";

// =============================================================================
// Simulation
// =============================================================================

/// Latency and failure injection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationConfig {
    /// Upper bound of the uniform delay before each call.
    pub latency: Duration,

    /// Probability in `[0, 1]` of failing a call without reaching the remote.
    pub failure_rate: f64,

    /// Fixed seed for the random source.
    pub seed: Option<u64>,
}

impl SimulationConfig {
    /// No delay, no injected failures.
    pub fn disabled() -> Self {
        SimulationConfig {
            latency: Duration::ZERO,
            failure_rate: 0.0,
            seed: None,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.latency.is_zero() || self.failure_rate > 0.0
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self::disabled()
    }
}

// =============================================================================
// ApiClient
// =============================================================================

/// Typed records-service client.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    simulation: SimulationConfig,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("simulation", &self.simulation)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, simulation: SimulationConfig) -> Self {
        let rng = match simulation.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        ApiClient {
            transport,
            simulation,
            rng: Mutex::new(rng),
        }
    }

    /// Client with simulation disabled.
    pub fn direct(transport: Arc<dyn Transport>) -> Self {
        Self::new(transport, SimulationConfig::disabled())
    }

    /// Builds the transport named by `config.api` and wraps it.
    ///
    /// For `memory://` the in-process remote is returned too so the caller
    /// can share it.
    pub fn from_config(config: &SyncConfig) -> SyncResult<(Self, Option<MemoryRemote>)> {
        let simulation = config.simulation.to_simulation_config();

        if config.api.is_memory() {
            info!("Using in-process remote");
            let remote = MemoryRemote::new();
            let client = Self::new(Arc::new(remote.clone()), simulation);
            return Ok((client, Some(remote)));
        }

        info!(base_url = %config.api.base_url, "Using HTTP remote");
        let transport = HttpTransport::new(&config.api.base_url, config.api.timeout())?;
        Ok((Self::new(Arc::new(transport), simulation), None))
    }

    pub fn simulation(&self) -> &SimulationConfig {
        &self.simulation
    }

    /// Draws the delay and the failure roll for one call.
    fn roll(&self) -> (Duration, bool) {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let delay = if self.simulation.latency.is_zero() {
            Duration::ZERO
        } else {
            let max_ms = self.simulation.latency.as_millis() as u64;
            Duration::from_millis(rng.gen_range(0..max_ms.max(1)))
        };

        let rate = self.simulation.failure_rate;
        let fail = rate > 0.0 && rng.gen::<f64>() < rate;
        (delay, fail)
    }

    async fn simulate(&self, path: &str) -> ApiResult<()> {
        if !self.simulation.is_active() {
            return Ok(());
        }

        let (delay, fail) = self.roll();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if fail {
            debug!(path = %path, "Simulated network failure");
            return Err(
                ApiError::new("Simulated network failure").with_code(ApiError::SIMULATED_FAILURE)
            );
        }
        Ok(())
    }

    /// `GET path`, decoded as `T`.
    pub async fn fetch<T: DeserializeOwned>(&self, path: &str) -> ApiResult<T> {
        self.simulate(path).await?;
        let body = self.transport.get(path).await?;
        serde_json::from_value(body).map_err(|e| ApiError::decode(e.to_string()))
    }

    /// `POST path` with `body`, response decoded as `T`.
    pub async fn send<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::decode(format!("Unserializable request body: {}", e)))?;
        self.simulate(path).await?;
        let response = self.transport.post(path, body).await?;
        serde_json::from_value(response).map_err(|e| ApiError::decode(e.to_string()))
    }

    /// `GET /records`.
    pub async fn fetch_records(&self) -> ApiResult<Vec<Record>> {
        self.fetch(RECORDS_PATH).await
    }

    /// `POST /records`.
    pub async fn submit_record(&self, payload: &NewRecord) -> ApiResult<Record> {
        self.send(RECORDS_PATH, payload).await
    }
}
