//! # Domain Types
//!
//! Core domain types used throughout Tally.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   NewRecord     │   │     Record      │   │  QueuedRecord   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  merchant       │──►│  id             │◄──│  temp_id        │       │
//! │  │  amount         │   │  merchant       │   │  payload        │       │
//! │  │  category       │   │  amount         │   │  enqueued_at    │       │
//! │  │  date?          │   │  category       │   └─────────────────┘       │
//! │  └─────────────────┘   │  date           │                             │
//! │                        │  created_at     │   ┌─────────────────┐       │
//! │                        └─────────────────┘   │    Category     │       │
//! │                                              │  Food, Transport│       │
//! │                                              │  ... Other      │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Provisional Identity
//! A record that failed remote submission is shown under a placeholder id
//! (`temp-<millis>-<suffix>`). The matching [`QueuedRecord`] carries the same
//! id in `temp_id`, which is how a successful replay finds the cache entry to
//! replace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::CoreError;
use crate::PROVISIONAL_ID_PREFIX;

// =============================================================================
// Category
// =============================================================================

/// Closed set of expense categories.
///
/// Serialized as the variant name (`"Food"`, `"Transport"`, ...), which is the
/// shape the remote service uses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub enum Category {
    Food,
    Transport,
    Entertainment,
    Utilities,
    Shopping,
    Healthcare,
    Other,
}

impl Category {
    /// Every category, in display order.
    pub const ALL: [Category; 7] = [
        Category::Food,
        Category::Transport,
        Category::Entertainment,
        Category::Utilities,
        Category::Shopping,
        Category::Healthcare,
        Category::Other,
    ];

    /// Returns the wire name of the category.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Transport => "Transport",
            Category::Entertainment => "Entertainment",
            Category::Utilities => "Utilities",
            Category::Shopping => "Shopping",
            Category::Healthcare => "Healthcare",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| CoreError::UnknownCategory(s.to_string()))
    }
}

// =============================================================================
// Record
// =============================================================================

/// A committed expense entry, either server-confirmed or provisional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Server-assigned id, or a `temp-` placeholder while queued.
    pub id: String,

    pub merchant: String,

    /// Amount in currency units (always positive).
    pub amount: f64,

    pub category: Category,

    /// When the expense happened.
    #[ts(as = "String")]
    pub date: DateTime<Utc>,

    /// When the record was created. Never mutated.
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Record {
    /// Returns true if this record carries a locally generated placeholder id.
    pub fn is_provisional(&self) -> bool {
        self.id.starts_with(PROVISIONAL_ID_PREFIX)
    }
}

// =============================================================================
// New Record
// =============================================================================

/// Caller-supplied payload for a record that does not exist yet.
///
/// This is also the exact body sent on `POST /records` and the payload kept
/// in the pending queue for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct NewRecord {
    pub merchant: String,
    pub amount: f64,
    pub category: Category,

    /// Defaults to the submission time when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(optional, as = "Option<String>")]
    pub date: Option<DateTime<Utc>>,
}

impl NewRecord {
    /// Creates a payload without an explicit date.
    pub fn new(merchant: impl Into<String>, amount: f64, category: Category) -> Self {
        NewRecord {
            merchant: merchant.into(),
            amount,
            category,
            date: None,
        }
    }

    /// Sets the date of the expense.
    pub fn with_date(mut self, date: DateTime<Utc>) -> Self {
        self.date = Some(date);
        self
    }

    /// Builds the placeholder record shown while this payload is queued.
    ///
    /// `date` falls back to `now`, `created_at` is always `now`.
    pub fn to_provisional(&self, now: DateTime<Utc>) -> Record {
        self.to_record(provisional_id(now), now)
    }

    /// Builds a record with the given id from this payload.
    pub fn to_record(&self, id: impl Into<String>, now: DateTime<Utc>) -> Record {
        Record {
            id: id.into(),
            merchant: self.merchant.clone(),
            amount: self.amount,
            category: self.category,
            date: self.date.unwrap_or(now),
            created_at: now,
        }
    }
}

/// Generates a unique placeholder id: `temp-<unix millis>-<8 hex chars>`.
///
/// The random suffix keeps two submissions in the same millisecond apart.
pub fn provisional_id(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}{}-{}",
        PROVISIONAL_ID_PREFIX,
        now.timestamp_millis(),
        &suffix[..8]
    )
}

// =============================================================================
// Queued Record
// =============================================================================

/// A payload that failed remote submission and waits for replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRecord {
    /// Id of the placeholder record mirrored into the cache.
    pub temp_id: String,

    /// The original payload, replayed verbatim.
    pub payload: NewRecord,

    /// When the entry was queued.
    #[ts(as = "String")]
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedRecord {
    pub fn new(temp_id: impl Into<String>, payload: NewRecord, enqueued_at: DateTime<Utc>) -> Self {
        QueuedRecord {
            temp_id: temp_id.into(),
            payload,
            enqueued_at,
        }
    }
}

// =============================================================================
// Record Lifecycle State
// =============================================================================

/// Where a single record is in its sync lifecycle.
///
/// ```text
/// Pending-Remote ──ok──► Confirmed
///       │
///     fail
///       ▼
/// Queued-Local ──replay ok──► Reconciled
///       ▲  │
///       └──┘ replay fails
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Submitted, remote call in flight.
    PendingRemote,
    /// Accepted by the remote on first attempt.
    Confirmed,
    /// Remote call failed; placeholder cached and payload queued.
    QueuedLocal,
    /// A queued payload was replayed successfully.
    Reconciled,
}

// =============================================================================
// Unit Tests
// =============================================================================
