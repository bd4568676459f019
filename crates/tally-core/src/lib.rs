//! # tally-core: Pure Domain Logic for Tally
//!
//! This crate holds the expense domain as plain data and pure functions with
//! zero I/O dependencies. Everything that talks to a disk or a network lives
//! in `tally-db` and `tally-sync`.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Presentation (CLI today, any UI later)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ RecordsFacade                          │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            tally-sync (engine, transport, worker)               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  summary  │  │ fixtures  │  │ validation│  │   │
//! │  │   │  Record   │  │  totals   │  │ demo data │  │   rules   │  │   │
//! │  │   │ NewRecord │  │ by categ. │  │           │  │           │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Record, NewRecord, QueuedRecord, Category)
//! - [`summary`] - Spend totals, grouping and ordering helpers
//! - [`fixtures`] - Fixed demonstration dataset for cold starts
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation for new records
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use tally_core::{Category, NewRecord};
//!
//! let payload = NewRecord::new("Test Store", 50.0, Category::Food);
//! let provisional = payload.to_provisional(Utc::now());
//!
//! assert!(provisional.is_provisional());
//! assert_eq!(provisional.merchant, "Test Store");
//! ```

pub mod error;
pub mod fixtures;
pub mod summary;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use summary::RecordSummary;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Prefix marking a record id as a locally generated placeholder.
///
/// A record carrying this prefix has not been accepted by the remote service
/// yet; its id is replaced during reconciliation.
pub const PROVISIONAL_ID_PREFIX: &str = "temp-";

/// Prefix for ids the facade shows before the engine has answered.
pub const OPTIMISTIC_ID_PREFIX: &str = "optimistic-";

/// Maximum merchant name length accepted by validation.
pub const MAX_MERCHANT_LENGTH: usize = 200;
