//! # Demonstration Fixture
//!
//! The fixed dataset shown on a cold start when the remote is unreachable
//! and nothing has been cached yet. Dates are relative to `now` so the list
//! always looks recent.

use chrono::{DateTime, Duration, Utc};

use crate::types::{Category, Record};

/// Four sample records, newest first, dated one to four days before `now`.
pub fn demo_records(now: DateTime<Utc>) -> Vec<Record> {
    let days_ago = |days: i64| now - Duration::days(days);

    [
        ("1", "Whole Foods", 87.32, Category::Food, 1),
        ("2", "Uber", 23.50, Category::Transport, 2),
        ("3", "Netflix", 15.99, Category::Entertainment, 3),
        ("4", "Amazon", 124.99, Category::Shopping, 4),
    ]
    .into_iter()
    .map(|(id, merchant, amount, category, days)| Record {
        id: id.to_string(),
        merchant: merchant.to_string(),
        amount,
        category,
        date: days_ago(days),
        created_at: days_ago(days),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_demo_records_shape() {
        let now = Utc::now();
        let records = demo_records(now);

        assert_eq!(records.len(), 4);
        assert_eq!(records[0].merchant, "Whole Foods");
        assert_eq!(records[0].date, now - Duration::days(1));
        assert_eq!(records[3].amount, 124.99);

        let ids: HashSet<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids.len(), 4);
        assert!(records.iter().all(|r| !r.is_provisional()));
    }
}
