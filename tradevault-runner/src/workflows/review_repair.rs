//! Act on a reviewed anomaly report.
//!
//! The newest `stock_ticker_review*.csv` is read back. Every row the
//! reviewer left with an empty `ignore` cell (or with no `ignore` column at
//! all) is deleted and fetched again for the range in its file name.

use super::repair::remove_if_exists;
use super::{execute_requests, RunContext};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tradevault_core::data::{DownloadSummary, MarketDataProvider};
use tradevault_core::domain::{parse_partition_name, DateRange, Fidelity, JobKey};
use tradevault_core::error_log::ErrorLog;
use tradevault_core::gaps::DownloadRequest;
use tradevault_core::layout::find_latest_file;
use tracing::{info, warn};

pub const SCRIPT_NAME: &str = "review-repair";
pub const REVIEW_PREFIX: &str = "stock_ticker_review";

/// The columns review-repair needs from an anomaly report.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewRow {
    pub ticker: String,
    pub fidelity: String,
    pub file_name: String,
    pub full_path: String,
    #[serde(default)]
    pub ignore: Option<String>,
}

impl ReviewRow {
    pub fn is_ignored(&self) -> bool {
        self.ignore.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Default)]
pub struct ReviewRepairReport {
    pub report: Option<PathBuf>,
    pub rows: usize,
    pub ignored: usize,
    pub deleted: usize,
    pub downloads: DownloadSummary,
}

pub fn read_review_rows(path: &Path) -> Result<Vec<ReviewRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let mut rows = Vec::new();
    for row in reader.deserialize::<ReviewRow>() {
        rows.push(row.with_context(|| format!("reading {}", path.display()))?);
    }
    Ok(rows)
}

/// Re-fetch request for one reviewed row.
fn request_for_row(row: &ReviewRow) -> Result<DownloadRequest, String> {
    let fidelity = Fidelity::parse(&row.fidelity).map_err(|e| e.to_string())?;
    let name = parse_partition_name(&row.file_name).map_err(|e| e.to_string())?;
    let range = DateRange::new(name.range_start, name.range_end).map_err(|e| e.to_string())?;
    Ok(DownloadRequest {
        job: JobKey::new(row.ticker.clone(), fidelity),
        range,
    })
}

pub fn run_review_repair(
    ctx: &RunContext,
    provider: &dyn MarketDataProvider,
    error_log: &ErrorLog,
) -> Result<ReviewRepairReport> {
    let stocks = ctx.layout.stocks_dir();
    let Some(report_path) = find_latest_file(&stocks, REVIEW_PREFIX, ".csv")
        .with_context(|| format!("looking for review files in {}", stocks.display()))?
    else {
        warn!(dir = %stocks.display(), "no {REVIEW_PREFIX}*.csv found, nothing to repair");
        return Ok(ReviewRepairReport::default());
    };
    info!(path = %report_path.display(), "using review file");

    let rows = read_review_rows(&report_path)?;
    let mut report = ReviewRepairReport {
        report: Some(report_path),
        rows: rows.len(),
        ..Default::default()
    };

    let mut requests = Vec::new();
    for row in &rows {
        if row.is_ignored() {
            report.ignored += 1;
            continue;
        }

        let request = match request_for_row(row) {
            Ok(r) => r,
            Err(reason) => {
                error_log.record(&row.ticker, &row.fidelity, None, None, reason);
                continue;
            }
        };

        match remove_if_exists(Path::new(&row.full_path)) {
            Ok(deleted) => {
                if deleted {
                    report.deleted += 1;
                }
                requests.push(request);
            }
            Err(e) => {
                error_log.record(
                    &row.ticker,
                    &row.fidelity,
                    Some(request.range.start),
                    Some(request.range.end),
                    format!("failed to delete {}: {e}", row.full_path),
                );
            }
        }
    }

    info!(
        rows = report.rows,
        ignored = report.ignored,
        deleted = report.deleted,
        refetch = requests.len(),
        "review processed"
    );
    if !requests.is_empty() {
        report.downloads = execute_requests(ctx, provider, requests, error_log)?;
    }
    Ok(report)
}
