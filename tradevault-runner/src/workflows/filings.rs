//! SEC filings fetch.
//!
//! Stage 1 discovers filing metadata one target at a time (the search API is
//! the tighter rate limit). Stage 2 extracts sections on a bounded pool and
//! appends each filing's records as soon as it completes.

use super::RunContext;
use crate::progress::task_bar;
use crate::scheduler::{run_in_batches, BatchLimits, TaskOutcome};
use anyhow::Result;
use std::sync::atomic::Ordering;
use tradevault_core::sec::{
    append_records, dedupe_filings, extract_filing, DiscoveredFiling, FilingSearch, FilingTarget,
    SectionSource,
};
use tracing::{error, info, warn};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FilingsReport {
    pub targets: usize,
    pub discovered: usize,
    pub unique: usize,
    pub extracted_filings: usize,
    pub records_written: usize,
    pub failed_filings: usize,
}

pub fn run_filings_fetch(
    ctx: &RunContext,
    search: &dyn FilingSearch,
    sections: &dyn SectionSource,
    targets: &[FilingTarget],
) -> Result<FilingsReport> {
    let mut report = FilingsReport {
        targets: targets.len(),
        ..Default::default()
    };

    info!(targets = targets.len(), "discovering filings");
    let bar = task_bar(targets.len(), "discovering");
    let mut found = Vec::new();
    for target in targets {
        if ctx.cancel.load(Ordering::SeqCst) {
            warn!("interrupted during discovery");
            break;
        }
        let filings = search.discover(&target.ticker, &target.cik_unpadded, ctx.today);
        found.extend(filings.into_iter().map(|meta| DiscoveredFiling {
            ticker: target.ticker.clone(),
            cik_padded: target.cik_padded.clone(),
            meta,
        }));
        bar.inc(1);
        search.pause_between_targets();
    }
    bar.finish_and_clear();

    report.discovered = found.len();
    let unique = dedupe_filings(found);
    report.unique = unique.len();
    info!(discovered = report.discovered, unique = report.unique, "discovery complete");
    if unique.is_empty() {
        return Ok(report);
    }

    let filings_dir = ctx.layout.filings_dir();
    let bar = task_bar(unique.len(), "extracting");
    run_in_batches(
        unique,
        BatchLimits::single_pool(ctx.max_concurrent_requests),
        &ctx.cancel,
        |filing: &DiscoveredFiling| extract_filing(sections, filing),
        |filing, outcome| {
            match outcome {
                TaskOutcome::Done(records) => {
                    report.extracted_filings += 1;
                    match append_records(&filings_dir, &filing.ticker, records) {
                        Ok(n) => report.records_written += n,
                        Err(e) => {
                            report.failed_filings += 1;
                            error!(ticker = %filing.ticker, accession = ?filing.meta.accession_no, error = %e, "saving records failed");
                        }
                    }
                }
                TaskOutcome::Panicked(msg) => {
                    report.failed_filings += 1;
                    error!(ticker = %filing.ticker, accession = ?filing.meta.accession_no, panic = %msg, "extraction failed");
                }
            }
            bar.inc(1);
        },
    )?;
    bar.finish_with_message(format!("{} records", report.records_written));

    info!(
        filings = report.extracted_filings,
        records = report.records_written,
        failed = report.failed_filings,
        "filings fetch complete"
    );
    Ok(report)
}
