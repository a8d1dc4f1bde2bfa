//! Trading-history download: every target job from `today - duration` to
//! today, in monthly chunks.

use super::{execute_requests, RunContext};
use anyhow::Result;
use tradevault_core::calendar::months_before;
use tradevault_core::data::{DownloadSummary, MarketDataProvider, TargetJob};
use tradevault_core::domain::DateRange;
use tradevault_core::error_log::ErrorLog;
use tradevault_core::gaps::DownloadRequest;
use tracing::info;

pub const SCRIPT_NAME: &str = "download";

/// The request covering a target's configured history.
pub fn request_for_target(target: &TargetJob, ctx: &RunContext) -> DownloadRequest {
    DownloadRequest {
        job: target.job_key(),
        range: DateRange {
            start: months_before(ctx.today, target.duration_months),
            end: ctx.today,
        },
    }
}

pub fn run_download(
    ctx: &RunContext,
    provider: &dyn MarketDataProvider,
    targets: &[TargetJob],
    error_log: &ErrorLog,
) -> Result<DownloadSummary> {
    info!(targets = targets.len(), provider = provider.name(), "starting trading-history download");
    let requests = targets.iter().map(|t| request_for_target(t, ctx)).collect();
    Ok(execute_requests(ctx, provider, requests, error_log)?)
}
