//! # Spend Summary
//!
//! Aggregations over a record set: totals, per-category spend, grouping and
//! date ordering. Amounts are `f64` currency units, as they travel on the
//! wire; the summary does not round.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::types::{Category, Record};

/// Aggregate figures for a set of records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
    pub total_spend: f64,
    pub transaction_count: usize,
    /// Zero when there are no records.
    pub average_transaction: f64,
    /// Only categories that appear in the input are present.
    pub spend_by_category: BTreeMap<Category, f64>,
}

impl RecordSummary {
    /// Spend for one category, zero if absent.
    pub fn spend_for(&self, category: Category) -> f64 {
        self.spend_by_category.get(&category).copied().unwrap_or(0.0)
    }
}

/// Computes totals over `records`.
///
/// An empty slice yields an all-zero summary without dividing by zero.
pub fn calculate_summary(records: &[Record]) -> RecordSummary {
    let total_spend: f64 = records.iter().map(|r| r.amount).sum();
    let transaction_count = records.len();
    let average_transaction = if transaction_count > 0 {
        total_spend / transaction_count as f64
    } else {
        0.0
    };

    let mut spend_by_category = BTreeMap::new();
    for record in records {
        *spend_by_category.entry(record.category).or_insert(0.0) += record.amount;
    }

    RecordSummary {
        total_spend,
        transaction_count,
        average_transaction,
        spend_by_category,
    }
}

/// Groups records by category, keeping their relative order.
pub fn group_by_category(records: &[Record]) -> BTreeMap<Category, Vec<Record>> {
    let mut groups: BTreeMap<Category, Vec<Record>> = BTreeMap::new();
    for record in records {
        groups.entry(record.category).or_default().push(record.clone());
    }
    groups
}

/// Returns a copy of `records` sorted by `date`; newest first unless `ascending`.
///
/// The sort is stable, so records sharing a date keep their input order.
pub fn sort_by_date(records: &[Record], ascending: bool) -> Vec<Record> {
    let mut sorted = records.to_vec();
    let key = |r: &Record| -> DateTime<Utc> { r.date };
    if ascending {
        sorted.sort_by_key(key);
    } else {
        sorted.sort_by(|a, b| key(b).cmp(&key(a)));
    }
    sorted
}
