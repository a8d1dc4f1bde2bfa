//! One module per maintenance tool. Each workflow returns a summary and
//! leaves per-job failures in the shared error log.

pub mod anomalies;
pub mod corporate_actions;
pub mod download;
pub mod filings;
pub mod integrity;
pub mod liquidity;
pub mod repair;
pub mod review_repair;

use crate::progress::BarProgress;
use crate::scheduler::{run_in_batches, BatchLimits, SchedulerError, TaskOutcome};
use chrono::NaiveDate;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tradevault_core::calendar::MonthChunks;
use tradevault_core::config::AppConfig;
use tradevault_core::data::{
    download_range, DownloadProgress, DownloadSummary, MarketDataProvider, PartitionWriter,
};
use tradevault_core::error_log::ErrorLog;
use tradevault_core::gaps::DownloadRequest;
use tradevault_core::layout::DataLayout;
use tracing::info;

/// What every workflow runs against.
#[derive(Clone)]
pub struct RunContext {
    pub layout: DataLayout,
    pub cancel: Arc<AtomicBool>,
    pub today: NaiveDate,
    pub max_concurrent_requests: usize,
}

impl RunContext {
    pub fn new(config: &AppConfig, cancel: Arc<AtomicBool>) -> Self {
        Self {
            layout: DataLayout::new(config.base_output_path()),
            cancel,
            today: chrono::Local::now().date_naive(),
            max_concurrent_requests: config.max_concurrent_requests(),
        }
    }

    /// Fixed `today`, for tests and reproducible runs.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn writer(&self) -> PartitionWriter {
        PartitionWriter::new(self.layout.clone())
    }
}

fn count_chunks(requests: &[DownloadRequest]) -> usize {
    requests
        .iter()
        .map(|r| MonthChunks::new(r.range.start, r.range.end).count())
        .sum()
}

/// Fetch and write every request on a bounded pool with a terminal progress
/// bar. Jobs run concurrently; the monthly chunks of one job run in order on
/// its worker. Failed chunks go to `error_log`.
pub fn execute_requests(
    ctx: &RunContext,
    provider: &dyn MarketDataProvider,
    requests: Vec<DownloadRequest>,
    error_log: &ErrorLog,
) -> Result<DownloadSummary, SchedulerError> {
    let progress = BarProgress::new(count_chunks(&requests), "downloading");
    execute_requests_with(ctx, provider, requests, error_log, &progress)
}

/// [`execute_requests`] reporting to `progress`. `on_batch_complete` fires
/// once, after the last job, with chunk totals.
pub fn execute_requests_with(
    ctx: &RunContext,
    provider: &dyn MarketDataProvider,
    requests: Vec<DownloadRequest>,
    error_log: &ErrorLog,
    progress: &dyn DownloadProgress,
) -> Result<DownloadSummary, SchedulerError> {
    let total_chunks = count_chunks(&requests);
    info!(jobs = requests.len(), chunks = total_chunks, "executing download requests");

    let writer = ctx.writer();
    let mut summary = DownloadSummary::default();

    let report = run_in_batches(
        requests,
        BatchLimits::single_pool(ctx.max_concurrent_requests),
        &ctx.cancel,
        |req: &DownloadRequest| {
            download_range(
                provider,
                &writer,
                &req.job.ticker,
                &req.job.fidelity,
                req.range.start,
                req.range.end,
                progress,
                &ctx.cancel,
            )
        },
        |req, outcome| match outcome {
            TaskOutcome::Done(job_summary) => {
                for f in &job_summary.failures {
                    error_log.record(&f.ticker, f.fidelity.label(), Some(f.start), Some(f.end), &f.error);
                }
                summary.merge(job_summary);
            }
            TaskOutcome::Panicked(msg) => {
                summary.failed += 1;
                error_log.record(
                    &req.job.ticker,
                    req.job.fidelity.label(),
                    Some(req.range.start),
                    Some(req.range.end),
                    format!("worker panicked: {msg}"),
                );
            }
        },
    )?;

    summary.skipped += report.skipped;
    progress.on_batch_complete(summary.written + summary.empty, summary.failed, total_chunks);
    info!(
        written = summary.written,
        empty = summary.empty,
        failed = summary.failed,
        skipped = summary.skipped,
        "downloads finished"
    );
    Ok(summary)
}
