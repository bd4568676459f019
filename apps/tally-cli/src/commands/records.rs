//! # Record Commands
//!
//! `tally list`, `tally add` and `tally summary`.

use std::io::Write;
use tracing::debug;

use tally_core::summary::{group_by_category, sort_by_date};
use tally_core::Record;

use crate::args::{AddArgs, DateOrder, ListArgs};
use crate::state::AppState;

/// Prints the remote records, or the cache when the remote is unreachable.
pub async fn list(
    state: &AppState,
    args: &ListArgs,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let mut records = state.facade().list_records().await?;
    debug!(count = records.len(), "list command");

    if let Some(order) = args.sort {
        records = sort_by_date(&records, order == DateOrder::Oldest);
    }

    if json {
        if args.by_category {
            writeln!(out, "{}", serde_json::to_string_pretty(&group_by_category(&records))?)?;
        } else {
            writeln!(out, "{}", serde_json::to_string_pretty(&records)?)?;
        }
        return Ok(());
    }

    if records.is_empty() {
        writeln!(out, "No records.")?;
        return Ok(());
    }

    if args.by_category {
        for (i, (category, group)) in group_by_category(&records).iter().enumerate() {
            if i > 0 {
                writeln!(out)?;
            }
            writeln!(out, "{} ({})", category, group.len())?;
            for record in group {
                write_record(out, record)?;
            }
        }
    } else {
        for record in &records {
            write_record(out, record)?;
        }
    }
    if records.iter().any(Record::is_provisional) {
        writeln!(out, "\n* queued for sync")?;
    }
    Ok(())
}

/// Validates and submits a new record.
pub async fn add(
    state: &AppState,
    args: &AddArgs,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let record = state.facade().create_record(args.to_payload()).await?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&record)?)?;
    } else if record.is_provisional() {
        writeln!(
            out,
            "Queued {} ({:.2}, {}) as {}; run `tally flush` when online.",
            record.merchant, record.amount, record.category, record.id
        )?;
    } else {
        writeln!(
            out,
            "Saved {} ({:.2}, {}) as {}.",
            record.merchant, record.amount, record.category, record.id
        )?;
    }
    Ok(())
}

/// Prints totals over the current records.
pub async fn summary(state: &AppState, json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    state.facade().list_records().await?;
    let summary = state.facade().summary();

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
        return Ok(());
    }

    writeln!(out, "Total:    {:>10.2}", summary.total_spend)?;
    writeln!(out, "Count:    {:>10}", summary.transaction_count)?;
    writeln!(out, "Average:  {:>10.2}", summary.average_transaction)?;
    if !summary.spend_by_category.is_empty() {
        writeln!(out)?;
        for (category, spend) in &summary.spend_by_category {
            writeln!(out, "{:<14}{:>10.2}", category.as_str(), spend)?;
        }
    }
    Ok(())
}

fn write_record(out: &mut impl Write, record: &Record) -> std::io::Result<()> {
    let marker = if record.is_provisional() { "*" } else { " " };
    writeln!(
        out,
        "{}{:<28} {}  {:<13} {:>10.2}  {}",
        marker,
        record.id,
        record.date.format("%Y-%m-%d"),
        record.category.as_str(),
        record.amount,
        record.merchant
    )
}
