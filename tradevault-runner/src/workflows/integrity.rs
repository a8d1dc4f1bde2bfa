//! Tick-data integrity check over every ticker with `tick` partitions.

use super::RunContext;
use crate::progress::task_bar;
use crate::reports::write_csv_report;
use crate::scheduler::{run_in_batches, BatchLimits, TaskOutcome};
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tradevault_core::analytics::integrity::sort_integrity_report;
use tradevault_core::analytics::{analyze_ticker_integrity, discover_tick_files, IntegritySummary};
use tracing::{info, warn};

pub struct IntegrityRun {
    pub rows: Vec<IntegritySummary>,
    pub path: Option<PathBuf>,
    /// Remaining batches were abandoned after a worker panic.
    pub aborted: bool,
}

pub fn run_integrity_check(ctx: &RunContext) -> Result<IntegrityRun> {
    let root = ctx.layout.trading_history_root();
    let tickers: Vec<(String, Vec<PathBuf>)> = discover_tick_files(&root)?.into_iter().collect();
    if tickers.is_empty() {
        warn!(root = %root.display(), "no tick data found");
        return Ok(IntegrityRun {
            rows: Vec::new(),
            path: None,
            aborted: false,
        });
    }
    info!(tickers = tickers.len(), "starting integrity check");

    let bar = task_bar(tickers.len(), "integrity");
    let mut rows = Vec::with_capacity(tickers.len());
    let batch = run_in_batches(
        tickers,
        BatchLimits::analytics(),
        &ctx.cancel,
        |(ticker, files)| analyze_ticker_integrity(ticker, files),
        |(ticker, _), outcome| {
            rows.push(match outcome {
                TaskOutcome::Done(summary) => summary,
                TaskOutcome::Panicked(msg) => IntegritySummary::failed(&ticker, &format!("panic: {msg}")),
            });
            bar.inc(1);
        },
    )?;
    bar.finish_with_message(format!("{} checked", rows.len()));

    if batch.aborted {
        warn!(skipped = batch.skipped, "integrity check aborted early; writing partial report");
    }
    sort_integrity_report(&mut rows);

    let mut by_status: BTreeMap<&str, usize> = BTreeMap::new();
    for r in &rows {
        *by_status.entry(r.status.label()).or_default() += 1;
    }
    for (status, count) in &by_status {
        info!(status, count, "integrity summary");
    }

    let path = write_csv_report(&ctx.layout.integrity_report_path(), &rows)?;
    info!(path = %path.display(), "integrity report written");
    Ok(IntegrityRun {
        rows,
        path: Some(path),
        aborted: batch.aborted,
    })
}
