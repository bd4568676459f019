//! # Sync Commands
//!
//! `tally flush`, `tally status`, `tally pending` and `tally watch`.

use anyhow::Context;
use serde_json::json;
use std::future::Future;
use std::io::Write;
use tracing::{debug, info};

use tally_sync::FlushWorker;

use crate::state::AppState;

/// Replays queued records. Skipped while offline.
pub async fn flush(state: &AppState, json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    let facade = state.facade();

    if !facade.status().online {
        info!(pending = facade.pending_count(), "Offline, flush skipped");
        if json {
            writeln!(out, "{}", json!({ "skipped": true, "pending": facade.pending_count() }))?;
        } else {
            writeln!(
                out,
                "Offline, nothing flushed ({} pending).",
                facade.pending_count()
            )?;
        }
        return Ok(());
    }

    let report = facade.flush().await?;

    if json {
        let reconciled: Vec<_> = report
            .reconciled
            .iter()
            .map(|r| json!({ "tempId": r.temp_id, "id": r.record.id }))
            .collect();
        let body = json!({
            "attempted": report.attempted,
            "reconciled": reconciled,
            "retained": report.retained,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&body)?)?;
        return Ok(());
    }

    if report.is_noop() {
        writeln!(out, "Nothing to flush.")?;
        return Ok(());
    }

    for r in &report.reconciled {
        writeln!(out, "{} -> {}  {}", r.temp_id, r.record.id, r.record.merchant)?;
    }
    writeln!(
        out,
        "Delivered {} of {}, {} still queued.",
        report.reconciled.len(),
        report.attempted,
        report.retained
    )?;
    Ok(())
}

/// Prints connectivity, the pending count and the banner text.
pub fn status(state: &AppState, json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    let status = state.facade().status();
    let banner = status.banner_text();

    if json {
        let body = json!({
            "online": status.online,
            "pending": status.pending,
            "banner": banner,
            "remote": state.config().api.base_url,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&body)?)?;
        return Ok(());
    }

    let connectivity = if status.online { "online" } else { "offline" };
    writeln!(out, "Remote:   {} ({})", state.config().api.base_url, connectivity)?;
    writeln!(out, "Pending:  {}", status.pending)?;
    if let Some(banner) = banner {
        writeln!(out, "{}", banner)?;
    }
    Ok(())
}

/// Lists queued records, oldest first.
pub async fn pending(state: &AppState, json: bool, out: &mut impl Write) -> anyhow::Result<()> {
    let queue = state.facade().engine().pending().await?;

    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(&queue)?)?;
        return Ok(());
    }

    if queue.is_empty() {
        writeln!(out, "Nothing queued.")?;
        return Ok(());
    }

    for entry in &queue {
        writeln!(
            out,
            "{:<28} queued {}  {:<13} {:>10.2}  {}",
            entry.temp_id,
            entry.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
            entry.payload.category.as_str(),
            entry.payload.amount,
            entry.payload.merchant
        )?;
    }
    Ok(())
}

/// Runs the flush worker until `stop` resolves.
pub async fn watch<F>(state: &AppState, stop: F, out: &mut impl Write) -> anyhow::Result<()>
where
    F: Future<Output = std::io::Result<()>>,
{
    let facade = state.facade();
    let (worker, handle) = FlushWorker::new(
        facade.engine().clone(),
        facade.connectivity().clone(),
        state.config().worker.clone(),
    );
    let task = worker.spawn();
    handle.trigger();

    writeln!(
        out,
        "Watching with {} pending, press Ctrl-C to stop.",
        facade.pending_count()
    )?;
    out.flush()?;

    stop.await.context("waiting for stop signal")?;

    if let Err(e) = handle.shutdown().await {
        debug!(error = %e, "Flush worker already stopped");
    }
    task.await.context("flush worker task failed")?;

    writeln!(out, "Stopped with {} pending.", facade.engine().pending_count())?;
    Ok(())
}
