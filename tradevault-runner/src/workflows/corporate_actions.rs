//! Corporate-actions fetch: IPOs, splits, dividends and ticker events for
//! every ticker in the stock targets file.
//!
//! Each ticker is fetched once over `today - duration` to today, using the
//! longest duration among its target rows. Tickers run on a bounded pool;
//! the four kinds of one ticker are fetched in order on its worker.

use super::RunContext;
use crate::progress::task_bar;
use crate::scheduler::{run_in_batches, BatchLimits, TaskOutcome};
use anyhow::Result;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tradevault_core::calendar::months_before;
use tradevault_core::data::{
    save_corporate_actions, ActionRecord, CorporateAction, CorporateActionsSource, DataError, TargetJob,
};
use tradevault_core::error_log::ErrorLog;
use tracing::{debug, info};

pub const SCRIPT_NAME: &str = "corporate_actions";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CorporateActionsReport {
    pub tickers: usize,
    pub files_written: usize,
    pub records_written: usize,
    /// Fetches that returned nothing.
    pub empty: usize,
    pub failed: usize,
}

/// One ticker's fetch window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionsRequest {
    pub ticker: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// One request per distinct ticker, widest window wins.
pub fn requests_for_targets(targets: &[TargetJob], today: NaiveDate) -> Vec<ActionsRequest> {
    let mut longest: BTreeMap<&str, u32> = BTreeMap::new();
    for t in targets {
        let months = longest.entry(t.ticker.as_str()).or_default();
        *months = (*months).max(t.duration_months);
    }
    longest
        .into_iter()
        .map(|(ticker, months)| ActionsRequest {
            ticker: ticker.to_string(),
            start: months_before(today, months),
            end: today,
        })
        .collect()
}

type KindResults = Vec<(CorporateAction, Result<Vec<ActionRecord>, DataError>)>;

fn fetch_all_kinds(source: &dyn CorporateActionsSource, req: &ActionsRequest) -> KindResults {
    CorporateAction::ALL
        .iter()
        .map(|&action| {
            debug!(ticker = %req.ticker, %action, "fetching corporate actions");
            (action, source.fetch_actions(action, &req.ticker, req.start, req.end))
        })
        .collect()
}

pub fn run_corporate_actions(
    ctx: &RunContext,
    source: &dyn CorporateActionsSource,
    targets: &[TargetJob],
    error_log: &ErrorLog,
) -> Result<CorporateActionsReport> {
    let requests = requests_for_targets(targets, ctx.today);
    let mut report = CorporateActionsReport {
        tickers: requests.len(),
        ..Default::default()
    };
    info!(tickers = requests.len(), "starting corporate actions fetch");

    let bar = task_bar(requests.len(), "corporate actions");
    run_in_batches(
        requests,
        BatchLimits::single_pool(ctx.max_concurrent_requests),
        &ctx.cancel,
        |req: &ActionsRequest| fetch_all_kinds(source, req),
        |req, outcome| {
            match outcome {
                TaskOutcome::Done(results) => {
                    for (action, result) in results {
                        let saved = result.map_err(|e| e.to_string()).and_then(|records| {
                            save_corporate_actions(&ctx.layout, action, &req.ticker, req.start, req.end, &records)
                                .map(|path| (path, records.len()))
                                .map_err(|e| e.to_string())
                        });
                        match saved {
                            Ok((Some(path), rows)) => {
                                report.files_written += 1;
                                report.records_written += rows;
                                debug!(path = %path.display(), rows, "saved");
                            }
                            Ok((None, _)) => {
                                report.empty += 1;
                                info!(ticker = %req.ticker, %action, "no records returned, skipping save");
                            }
                            Err(e) => {
                                report.failed += 1;
                                error_log.record(&req.ticker, action.name(), Some(req.start), Some(req.end), e);
                            }
                        }
                    }
                }
                TaskOutcome::Panicked(msg) => {
                    report.failed += CorporateAction::ALL.len();
                    error_log.record(
                        &req.ticker,
                        SCRIPT_NAME,
                        Some(req.start),
                        Some(req.end),
                        format!("worker panicked: {msg}"),
                    );
                }
            }
            bar.inc(1);
        },
    )?;
    bar.finish_with_message(format!("{} files", report.files_written));

    info!(
        files = report.files_written,
        records = report.records_written,
        empty = report.empty,
        failed = report.failed,
        "corporate actions fetch complete"
    );
    Ok(report)
}
