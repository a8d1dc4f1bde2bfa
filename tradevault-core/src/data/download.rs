//! Download orchestrator: fetch a date range chunk by chunk and write each
//! chunk as one partition.
//!
//! The range is split into the same clipped calendar months the gap detector
//! expects, so a download always produces exactly the file names a later
//! scan looks for.

use super::provider::{DataError, DownloadProgress, MarketDataProvider};
use super::writer::{PartitionWriter, WriteError, WriteOutcome};
use crate::calendar::MonthChunks;
use crate::domain::{Fidelity, PartitionError, PartitionKey};
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] DataError),

    #[error("write failed: {0}")]
    Write(#[from] WriteError),

    #[error(transparent)]
    Partition(#[from] PartitionError),
}

/// A chunk that failed.
#[derive(Debug)]
pub struct ChunkFailure {
    pub ticker: String,
    pub fidelity: Fidelity,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub error: ChunkError,
}

/// Summary of a chunked download.
#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub total: usize,
    pub written: usize,
    /// Chunks the provider returned no data for.
    pub empty: usize,
    pub failed: usize,
    /// Chunks never started because of cancellation.
    pub skipped: usize,
    pub failures: Vec<ChunkFailure>,
}

impl DownloadSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }

    pub fn merge(&mut self, other: DownloadSummary) {
        self.total += other.total;
        self.written += other.written;
        self.empty += other.empty;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.failures.extend(other.failures);
    }
}

/// Fetch `[start, end]` for one job in monthly chunks and write each one.
///
/// A failed chunk is recorded and the next chunk is attempted. If `cancel`
/// is set, chunks not yet started are skipped.
#[allow(clippy::too_many_arguments)]
pub fn download_range(
    provider: &dyn MarketDataProvider,
    writer: &PartitionWriter,
    ticker: &str,
    fidelity: &Fidelity,
    start: NaiveDate,
    end: NaiveDate,
    progress: &dyn DownloadProgress,
    cancel: &AtomicBool,
) -> DownloadSummary {
    let chunks: Vec<_> = MonthChunks::new(start, end).collect();
    let mut summary = DownloadSummary {
        total: chunks.len(),
        ..Default::default()
    };

    for range in chunks {
        if cancel.load(Ordering::SeqCst) {
            summary.skipped += 1;
            continue;
        }

        let key = match PartitionKey::new(ticker, fidelity.clone(), range.start, range.end) {
            Ok(k) => k,
            Err(e) => {
                summary.failed += 1;
                summary.failures.push(ChunkFailure {
                    ticker: ticker.to_string(),
                    fidelity: fidelity.clone(),
                    start: range.start,
                    end: range.end,
                    error: e.into(),
                });
                continue;
            }
        };

        progress.on_start(&key);
        let result = download_chunk(provider, writer, &key);
        let reported = match &result {
            Ok(WriteOutcome::Written { rows, .. }) => Ok(*rows),
            Ok(WriteOutcome::Empty) => Ok(0),
            Err(e) => Err(e.to_string()),
        };
        progress.on_complete(&key, &reported);

        match result {
            Ok(WriteOutcome::Written { .. }) => summary.written += 1,
            Ok(WriteOutcome::Empty) => summary.empty += 1,
            Err(error) => {
                summary.failed += 1;
                summary.failures.push(ChunkFailure {
                    ticker: ticker.to_string(),
                    fidelity: fidelity.clone(),
                    start: range.start,
                    end: range.end,
                    error,
                });
            }
        }
    }

    summary
}

/// Fetch → write for a single partition.
pub fn download_chunk(
    provider: &dyn MarketDataProvider,
    writer: &PartitionWriter,
    key: &PartitionKey,
) -> Result<WriteOutcome, ChunkError> {
    let records = provider.fetch(key.ticker(), key.fidelity(), key.start(), key.end())?;
    Ok(writer.write(key, &records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::SilentProgress;
    use crate::data::records::{AggregateBar, MarketRecords};
    use crate::layout::DataLayout;
    use std::sync::Mutex;

    struct FakeProvider {
        calls: Mutex<Vec<(NaiveDate, NaiveDate)>>,
        fail_month: Option<u32>,
    }

    impl MarketDataProvider for FakeProvider {
        fn name(&self) -> &str {
            "fake"
        }

        fn fetch(
            &self,
            _ticker: &str,
            _fidelity: &Fidelity,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<MarketRecords, DataError> {
            use chrono::Datelike;
            self.calls.lock().unwrap().push((start, end));
            if Some(start.month()) == self.fail_month {
                return Err(DataError::ServerError { status: 500 });
            }
            Ok(MarketRecords::Bars(vec![AggregateBar {
                v: 1.0,
                vw: None,
                o: 1.0,
                c: 1.0,
                h: 1.0,
                l: 1.0,
                t: 0,
                n: None,
            }]))
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn writes_one_partition_per_month() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PartitionWriter::new(DataLayout::new(dir.path()));
        let provider = FakeProvider { calls: Mutex::new(vec![]), fail_month: None };
        let f = Fidelity::parse("day").unwrap();

        let summary = download_range(
            &provider,
            &writer,
            "ABC",
            &f,
            d(2024, 1, 20),
            d(2024, 3, 5),
            &SilentProgress,
            &AtomicBool::new(false),
        );
        assert_eq!(summary.total, 3);
        assert_eq!(summary.written, 3);
        assert!(summary.all_succeeded());
        assert_eq!(
            provider.calls.lock().unwrap().clone(),
            vec![
                (d(2024, 1, 20), d(2024, 1, 31)),
                (d(2024, 2, 1), d(2024, 2, 29)),
                (d(2024, 3, 1), d(2024, 3, 5)),
            ]
        );
        let job_dir = writer.layout().job_dir("ABC", &f);
        assert!(job_dir.join("ABC_day_2024-01-20_to_2024-01-31.csv").exists());
        assert!(job_dir.join("ABC_day_2024-03-01_to_2024-03-05.csv").exists());
    }

    #[test]
    fn failed_chunk_does_not_stop_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PartitionWriter::new(DataLayout::new(dir.path()));
        let provider = FakeProvider { calls: Mutex::new(vec![]), fail_month: Some(2) };
        let f = Fidelity::parse("day").unwrap();

        let summary = download_range(
            &provider,
            &writer,
            "ABC",
            &f,
            d(2024, 1, 1),
            d(2024, 3, 31),
            &SilentProgress,
            &AtomicBool::new(false),
        );
        assert_eq!(summary.written, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.failures[0].start, d(2024, 2, 1));
        assert!(matches!(summary.failures[0].error, ChunkError::Fetch(DataError::ServerError { .. })));
    }

    #[test]
    fn cancelled_download_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PartitionWriter::new(DataLayout::new(dir.path()));
        let provider = FakeProvider { calls: Mutex::new(vec![]), fail_month: None };

        let summary = download_range(
            &provider,
            &writer,
            "ABC",
            &Fidelity::parse("day").unwrap(),
            d(2024, 1, 1),
            d(2024, 2, 10),
            &SilentProgress,
            &AtomicBool::new(true),
        );
        assert_eq!(summary.skipped, 2);
        assert!(provider.calls.lock().unwrap().is_empty());
    }
}
