//! Major and minor repair of the trading-history tree.
//!
//! Scan, validate every job against its expected monthly partitions, then
//! either rebuild incomplete jobs from scratch (major) or fetch just the
//! missing months (minor).

use super::{execute_requests, RunContext};
use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::Path;
use tradevault_core::catalog::CatalogSnapshot;
use tradevault_core::data::{DownloadSummary, MarketDataProvider};
use tradevault_core::error_log::ErrorLog;
use tradevault_core::gaps::{plan_repairs, RepairAction, RepairMode};
use tracing::{info, warn};

pub fn script_name(mode: RepairMode) -> &'static str {
    match mode {
        RepairMode::Major => "repair-major",
        RepairMode::Minor => "repair-minor",
    }
}

#[derive(Debug, Default)]
pub struct RepairReport {
    pub jobs_checked: usize,
    pub complete: usize,
    pub incomplete: usize,
    pub invalid: usize,
    pub files_deleted: usize,
    pub downloads: DownloadSummary,
}

/// Remove a file if present. Returns whether something was deleted.
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

pub fn run_repair(
    ctx: &RunContext,
    provider: &dyn MarketDataProvider,
    mode: RepairMode,
    error_log: &ErrorLog,
) -> Result<RepairReport> {
    let root = ctx.layout.trading_history_root();
    let snapshot = CatalogSnapshot::scan(&root).with_context(|| format!("scanning {}", root.display()))?;
    info!(root = %root.display(), jobs = snapshot.len(), ?mode, "validating trading history");

    let plan = plan_repairs(&snapshot, mode, ctx.today);
    let mut report = RepairReport {
        jobs_checked: snapshot.len(),
        complete: plan.complete.len(),
        incomplete: plan.actions.len(),
        invalid: plan.invalid.len(),
        ..Default::default()
    };

    for (job, err) in &plan.invalid {
        error_log.record(&job.ticker, job.fidelity.label(), None, None, err);
    }

    let mut requests = Vec::new();
    for action in plan.actions {
        match action {
            RepairAction::Rebuild { job, delete, refetch } => {
                info!(%job, files = delete.len(), range = %refetch.range, "rebuilding job");
                let mut deletion_failed = false;
                for path in &delete {
                    match remove_if_exists(path) {
                        Ok(true) => report.files_deleted += 1,
                        Ok(false) => {}
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "could not delete partition");
                            error_log.record(
                                &job.ticker,
                                job.fidelity.label(),
                                Some(refetch.range.start),
                                Some(refetch.range.end),
                                format!("failed to delete {}: {e}", path.display()),
                            );
                            deletion_failed = true;
                        }
                    }
                }
                if deletion_failed {
                    warn!(%job, "skipping re-fetch, old partitions could not be removed");
                    continue;
                }
                requests.push(refetch);
            }
            RepairAction::FillGaps { job, refetch } => {
                info!(%job, missing = refetch.len(), "filling gaps");
                requests.extend(refetch);
            }
        }
    }

    info!(
        checked = report.jobs_checked,
        complete = report.complete,
        incomplete = report.incomplete,
        invalid = report.invalid,
        "validation summary"
    );
    if !requests.is_empty() {
        report.downloads = execute_requests(ctx, provider, requests, error_log)?;
    }
    Ok(report)
}
