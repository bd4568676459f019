//! # Transport
//!
//! Raw request/response access to the records service. Every failure mode
//! (timeout, refused connection, error status, unreadable body) comes back
//! as an [`ApiError`] value; nothing here panics or returns a transport
//! library error.
//!
//! ## Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  ApiClient (client.rs)   typed fetch/send + latency/failure simulation │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  dyn Transport           get(path) / post(path, body) over JSON values │
//! │       │                                                                 │
//! │       ├──────────────────────────┐                                      │
//! │       ▼                          ▼                                      │
//! │  HttpTransport (reqwest)    MemoryRemote (remote.rs)                   │
//! │                                                                         │
//! │  ERROR CODES                                                           │
//! │  ───────────                                                           │
//! │  TIMEOUT            per-call timeout elapsed                           │
//! │  REQUEST_FAILED     connection refused / reset / DNS                   │
//! │  HTTP_<status>      non-2xx response, `status` set                     │
//! │  DECODE_FAILED      body is not the expected JSON                      │
//! │  SIMULATED_FAILURE  injected by ApiClient                              │
//! │  OFFLINE            MemoryRemote switched offline                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// ApiError
// =============================================================================

/// Failure shape for every remote call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{message}")]
pub struct ApiError {
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// HTTP status, when the remote answered at all.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Outcome of a remote call.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub const TIMEOUT: &'static str = "TIMEOUT";
    pub const REQUEST_FAILED: &'static str = "REQUEST_FAILED";
    pub const DECODE_FAILED: &'static str = "DECODE_FAILED";
    pub const SIMULATED_FAILURE: &'static str = "SIMULATED_FAILURE";
    pub const OFFLINE: &'static str = "OFFLINE";

    pub fn new(message: impl Into<String>) -> Self {
        ApiError {
            message: message.into(),
            code: None,
            status: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// `HTTP_<status>` error for a non-success response.
    pub fn http_status(status: u16, message: impl Into<String>) -> Self {
        ApiError::new(message)
            .with_code(format!("HTTP_{}", status))
            .with_status(status)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        ApiError::new(message).with_code(Self::DECODE_FAILED)
    }

    /// Returns true if the error carries the given code.
    pub fn has_code(&self, code: &str) -> bool {
        self.code.as_deref() == Some(code)
    }
}

// =============================================================================
// Transport Trait
// =============================================================================

/// Untyped access to the records service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET {path}`, returning the decoded JSON body.
    async fn get(&self, path: &str) -> ApiResult<Value>;

    /// `POST {path}` with a JSON body, returning the decoded JSON body.
    async fn post(&self, path: &str, body: Value) -> ApiResult<Value>;
}

// =============================================================================
// HTTP Transport
// =============================================================================

/// reqwest-backed transport with a base URL and per-call timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Creates a transport rooted at `base_url`.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let base_url = base_url.into();
        url::Url::parse(&base_url)?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(HttpTransport {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn execute(&self, request: reqwest::RequestBuilder, path: &str) -> ApiResult<Value> {
        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status();

        if !status.is_success() {
            warn!(path = %path, status = status.as_u16(), "Remote returned error status");
            return Err(ApiError::http_status(
                status.as_u16(),
                format!("Request failed with status {}", status),
            ));
        }

        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let body = serde_json::from_slice(&bytes)
            .map_err(|e| ApiError::decode(format!("Malformed response body: {}", e)))?;

        debug!(path = %path, status = status.as_u16(), "Remote call succeeded");
        Ok(body)
    }
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        ApiError::new(format!("Request timed out: {}", err)).with_code(ApiError::TIMEOUT)
    } else if err.is_decode() {
        ApiError::decode(err.to_string())
    } else {
        let error = ApiError::new(err.to_string()).with_code(ApiError::REQUEST_FAILED);
        match err.status() {
            Some(status) => error.with_status(status.as_u16()),
            None => error,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str) -> ApiResult<Value> {
        debug!(path = %path, "GET");
        self.execute(self.client.get(self.url(path)), path).await
    }

    async fn post(&self, path: &str, body: Value) -> ApiResult<Value> {
        debug!(path = %path, "POST");
        self.execute(self.client.post(self.url(path)).json(&body), path)
            .await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
