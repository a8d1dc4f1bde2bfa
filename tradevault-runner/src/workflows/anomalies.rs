//! File-size anomaly report over the whole trading-history tree.

use super::RunContext;
use crate::reports::write_csv_report;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tradevault_core::anomaly::{detect_anomalies, AnomalyRecord, DEFAULT_SIZE_THRESHOLD_PERCENT};
use tradevault_core::catalog::CatalogSnapshot;
use tracing::info;

pub struct AnomalyReport {
    pub records: Vec<AnomalyRecord>,
    /// `None` when nothing was flagged.
    pub path: Option<PathBuf>,
}

pub fn run_anomaly_report(ctx: &RunContext) -> Result<AnomalyReport> {
    let root = ctx.layout.trading_history_root();
    let snapshot = CatalogSnapshot::scan(&root).with_context(|| format!("scanning {}", root.display()))?;
    let records = detect_anomalies(&snapshot, DEFAULT_SIZE_THRESHOLD_PERCENT);
    info!(jobs = snapshot.len(), flagged = records.len(), "anomaly scan complete");

    if records.is_empty() {
        return Ok(AnomalyReport { records, path: None });
    }
    let path = write_csv_report(&ctx.layout.anomaly_report_path(), &records)?;
    info!(path = %path.display(), "anomaly report written");
    Ok(AnomalyReport {
        records,
        path: Some(path),
    })
}
