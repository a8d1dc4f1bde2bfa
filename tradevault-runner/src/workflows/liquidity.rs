//! Liquidity screen over every ticker with `tick` partitions.

use super::RunContext;
use crate::progress::task_bar;
use crate::reports::write_csv_report;
use crate::scheduler::{run_in_batches, BatchLimits, TaskOutcome};
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tradevault_core::analytics::liquidity::sort_liquidity_report;
use tradevault_core::analytics::{calculate_liquidity_metrics, discover_tick_files, LiquidityMetrics};
use tracing::{info, warn};

pub struct LiquidityRun {
    pub rows: Vec<LiquidityMetrics>,
    pub path: Option<PathBuf>,
    pub aborted: bool,
}

pub fn run_liquidity_screen(ctx: &RunContext) -> Result<LiquidityRun> {
    let root = ctx.layout.trading_history_root();
    let tickers: Vec<(String, Vec<PathBuf>)> = discover_tick_files(&root)?.into_iter().collect();
    if tickers.is_empty() {
        warn!(root = %root.display(), "no tick data found");
        return Ok(LiquidityRun {
            rows: Vec::new(),
            path: None,
            aborted: false,
        });
    }
    info!(tickers = tickers.len(), today = %ctx.today, "starting liquidity screen");

    let today = ctx.today;
    let bar = task_bar(tickers.len(), "liquidity");
    let mut rows = Vec::with_capacity(tickers.len());
    let batch = run_in_batches(
        tickers,
        BatchLimits::analytics(),
        &ctx.cancel,
        |(ticker, files)| calculate_liquidity_metrics(ticker, files, today),
        |(ticker, _), outcome| {
            rows.push(match outcome {
                TaskOutcome::Done(m) => m,
                TaskOutcome::Panicked(msg) => LiquidityMetrics::failed(&ticker, &format!("panic: {msg}")),
            });
            bar.inc(1);
        },
    )?;
    bar.finish_with_message(format!("{} screened", rows.len()));

    if batch.aborted {
        warn!(skipped = batch.skipped, "liquidity screen aborted early; writing partial report");
    }
    sort_liquidity_report(&mut rows);

    let mut by_recommendation: BTreeMap<&str, usize> = BTreeMap::new();
    for r in &rows {
        *by_recommendation.entry(r.recommendation.as_str()).or_default() += 1;
    }
    for (recommendation, count) in &by_recommendation {
        info!(recommendation, count, "liquidity summary");
    }

    let path = write_csv_report(&ctx.layout.liquidity_report_path(), &rows)?;
    info!(path = %path.display(), "liquidity report written");
    Ok(LiquidityRun {
        rows,
        path: Some(path),
        aborted: batch.aborted,
    })
}
