//! Partition writer.
//!
//! Daily bars go to CSV, everything else to Parquet. Writes always overwrite
//! and are atomic: the data lands in a `.tmp` sibling first and is renamed
//! into place. For Parquet jobs the first chunk written also leaves a
//! human-readable `<TICKER>_<fidelity>_DEBUG.csv` sample next to it.

use super::records::{AggregateBar, MarketRecords, Trade};
use crate::domain::{FileFormat, PartitionKey};
use crate::layout::DataLayout;
use polars::prelude::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const DEBUG_SAMPLE_ROWS: usize = 1000;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("parquet error: {0}")]
    Parquet(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> WriteError + '_ {
    move |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written { path: PathBuf, rows: usize },
    /// Nothing fetched, nothing written.
    Empty,
}

/// Writes fetched chunks into the trading-history tree.
#[derive(Debug, Clone)]
pub struct PartitionWriter {
    layout: DataLayout,
}

impl PartitionWriter {
    pub fn new(layout: DataLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Write `records` as the partition for `key`, replacing any existing file.
    pub fn write(&self, key: &PartitionKey, records: &MarketRecords) -> Result<WriteOutcome, WriteError> {
        if records.is_empty() {
            info!(partition = %key, "no data returned; nothing written");
            return Ok(WriteOutcome::Empty);
        }

        let path = self.layout.partition_path(key);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }

        match key.file_format() {
            FileFormat::Csv => write_atomic(&path, |tmp| write_csv(records, tmp))?,
            FileFormat::Parquet => {
                write_atomic(&path, |tmp| write_parquet(records, tmp))?;
                self.write_debug_sample_if_absent(key, records)?;
            }
        }

        debug!(path = %path.display(), rows = records.len(), "partition written");
        Ok(WriteOutcome::Written {
            path,
            rows: records.len(),
        })
    }

    fn write_debug_sample_if_absent(&self, key: &PartitionKey, records: &MarketRecords) -> Result<(), WriteError> {
        let path = self.layout.debug_sample_path(key.ticker(), key.fidelity());
        if path.exists() {
            return Ok(());
        }
        let sample = records.head(DEBUG_SAMPLE_ROWS);
        write_atomic(&path, |tmp| write_csv(&sample, tmp))?;
        debug!(path = %path.display(), rows = sample.len(), "debug sample written");
        Ok(())
    }
}

/// Run `write` against a temp sibling of `path`, then rename into place.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> Result<(), WriteError>
where
    F: FnOnce(&Path) -> Result<(), WriteError>,
{
    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    if let Err(e) = write(&tmp_path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }

    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        WriteError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

// ── CSV ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TradeCsvRow<'a> {
    sip_timestamp: i64,
    participant_timestamp: Option<i64>,
    price: f64,
    size: f64,
    exchange: Option<i64>,
    id: Option<&'a str>,
    sequence_number: Option<i64>,
    tape: Option<i64>,
    conditions: String,
}

impl<'a> From<&'a Trade> for TradeCsvRow<'a> {
    fn from(t: &'a Trade) -> Self {
        Self {
            sip_timestamp: t.sip_timestamp,
            participant_timestamp: t.participant_timestamp,
            price: t.price,
            size: t.size,
            exchange: t.exchange,
            id: t.id.as_deref(),
            sequence_number: t.sequence_number,
            tape: t.tape,
            conditions: t.conditions_text(),
        }
    }
}

fn write_csv(records: &MarketRecords, path: &Path) -> Result<(), WriteError> {
    let mut writer = csv::Writer::from_path(path)?;
    match records {
        MarketRecords::Bars(bars) => {
            for bar in bars {
                writer.serialize(bar)?;
            }
        }
        MarketRecords::Trades(trades) => {
            for trade in trades {
                writer.serialize(TradeCsvRow::from(trade))?;
            }
        }
    }
    writer.flush().map_err(io_err(path))?;
    Ok(())
}

// ── Parquet ─────────────────────────────────────────────────────────

fn write_parquet(records: &MarketRecords, path: &Path) -> Result<(), WriteError> {
    let mut df = match records {
        MarketRecords::Bars(bars) => bars_to_dataframe(bars)?,
        MarketRecords::Trades(trades) => trades_to_dataframe(trades)?,
    };
    let file = fs::File::create(path).map_err(io_err(path))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(|e| WriteError::Parquet(format!("write parquet: {e}")))?;
    Ok(())
}

/// Bars with `t` stored as a millisecond `timestamp` column.
pub fn bars_to_dataframe(bars: &[AggregateBar]) -> Result<DataFrame, WriteError> {
    let v: Vec<f64> = bars.iter().map(|b| b.v).collect();
    let vw: Vec<Option<f64>> = bars.iter().map(|b| b.vw).collect();
    let o: Vec<f64> = bars.iter().map(|b| b.o).collect();
    let c: Vec<f64> = bars.iter().map(|b| b.c).collect();
    let h: Vec<f64> = bars.iter().map(|b| b.h).collect();
    let l: Vec<f64> = bars.iter().map(|b| b.l).collect();
    let t: Vec<i64> = bars.iter().map(|b| b.t).collect();
    let n: Vec<Option<i64>> = bars.iter().map(|b| b.n).collect();

    DataFrame::new(vec![
        Column::new("v".into(), v),
        Column::new("vw".into(), vw),
        Column::new("o".into(), o),
        Column::new("c".into(), c),
        Column::new("h".into(), h),
        Column::new("l".into(), l),
        Column::new("timestamp".into(), t)
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, Some("UTC".into())))
            .map_err(|e| WriteError::Parquet(format!("timestamp cast: {e}")))?,
        Column::new("n".into(), n),
    ])
    .map_err(|e| WriteError::Parquet(format!("dataframe creation: {e}")))
}

/// Trades in the provider's raw schema; `sip_timestamp` stays integer
/// nanoseconds and conditions are stored as text.
pub fn trades_to_dataframe(trades: &[Trade]) -> Result<DataFrame, WriteError> {
    let sip: Vec<i64> = trades.iter().map(|t| t.sip_timestamp).collect();
    let participant: Vec<Option<i64>> = trades.iter().map(|t| t.participant_timestamp).collect();
    let price: Vec<f64> = trades.iter().map(|t| t.price).collect();
    let size: Vec<f64> = trades.iter().map(|t| t.size).collect();
    let exchange: Vec<Option<i64>> = trades.iter().map(|t| t.exchange).collect();
    let id: Vec<Option<String>> = trades.iter().map(|t| t.id.clone()).collect();
    let seq: Vec<Option<i64>> = trades.iter().map(|t| t.sequence_number).collect();
    let tape: Vec<Option<i64>> = trades.iter().map(|t| t.tape).collect();
    let conditions: Vec<String> = trades.iter().map(|t| t.conditions_text()).collect();

    DataFrame::new(vec![
        Column::new("sip_timestamp".into(), sip),
        Column::new("participant_timestamp".into(), participant),
        Column::new("price".into(), price),
        Column::new("size".into(), size),
        Column::new("exchange".into(), exchange),
        Column::new("id".into(), id),
        Column::new("sequence_number".into(), seq),
        Column::new("tape".into(), tape),
        Column::new("conditions".into(), conditions),
    ])
    .map_err(|e| WriteError::Parquet(format!("dataframe creation: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Fidelity;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn bars(n: usize) -> Vec<AggregateBar> {
        (0..n)
            .map(|i| AggregateBar {
                v: 100.0 + i as f64,
                vw: Some(10.5),
                o: 10.0,
                c: 11.0,
                h: 12.0,
                l: 9.0,
                t: 1_704_067_200_000 + i as i64 * 60_000,
                n: Some(5),
            })
            .collect()
    }

    fn trades(n: usize) -> Vec<Trade> {
        (0..n)
            .map(|i| Trade {
                sip_timestamp: 1_704_117_600_000_000_000 + i as i64 * 1_000_000_000,
                participant_timestamp: None,
                price: 10.0,
                size: 100.0,
                exchange: Some(4),
                id: Some(i.to_string()),
                sequence_number: Some(i as i64),
                tape: Some(3),
                conditions: vec![12, 37],
            })
            .collect()
    }

    #[test]
    fn daily_bars_go_to_csv_without_debug_sample() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PartitionWriter::new(DataLayout::new(dir.path()));
        let f = Fidelity::parse("day").unwrap();
        let key = PartitionKey::new("ABC", f.clone(), d(2024, 1, 1), d(2024, 1, 31)).unwrap();

        let out = writer.write(&key, &MarketRecords::Bars(bars(3))).unwrap();
        let WriteOutcome::Written { path, rows } = out else {
            panic!("expected a write");
        };
        assert_eq!(rows, 3);
        assert!(path.ends_with("ABC/day/ABC_day_2024-01-01_to_2024-01-31.csv"));

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().next().unwrap(), "v,vw,o,c,h,l,t,n");
        assert_eq!(content.lines().count(), 4);
        assert!(!writer.layout().debug_sample_path("ABC", &f).exists());
    }

    #[test]
    fn intraday_goes_to_parquet_with_debug_sample_once() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PartitionWriter::new(DataLayout::new(dir.path()));
        let f = Fidelity::parse("tick").unwrap();

        let jan = PartitionKey::new("ABC", f.clone(), d(2024, 1, 1), d(2024, 1, 31)).unwrap();
        writer.write(&jan, &MarketRecords::Trades(trades(1500))).unwrap();

        let debug = writer.layout().debug_sample_path("ABC", &f);
        let sample = fs::read_to_string(&debug).unwrap();
        assert_eq!(sample.lines().count(), DEBUG_SAMPLE_ROWS + 1);
        assert!(sample.lines().nth(1).unwrap().ends_with("\"[12, 37]\""));

        let feb = PartitionKey::new("ABC", f.clone(), d(2024, 2, 1), d(2024, 2, 29)).unwrap();
        writer.write(&feb, &MarketRecords::Trades(trades(2))).unwrap();
        assert_eq!(fs::read_to_string(&debug).unwrap(), sample);

        let file = fs::File::open(writer.layout().partition_path(&jan)).unwrap();
        let df = ParquetReader::new(file).finish().unwrap();
        assert_eq!(df.height(), 1500);
        assert!(df.column("sip_timestamp").is_ok());
    }

    #[test]
    fn parquet_bars_store_timestamp_column() {
        let df = bars_to_dataframe(&bars(2)).unwrap();
        assert_eq!(
            df.column("timestamp").unwrap().dtype(),
            &DataType::Datetime(TimeUnit::Milliseconds, Some("UTC".into()))
        );
        assert!(df.column("t").is_err());
    }

    #[test]
    fn empty_fetch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PartitionWriter::new(DataLayout::new(dir.path()));
        let key = PartitionKey::new("ABC", Fidelity::parse("1 minute").unwrap(), d(2024, 1, 1), d(2024, 1, 31)).unwrap();
        assert_eq!(writer.write(&key, &MarketRecords::Bars(vec![])).unwrap(), WriteOutcome::Empty);
        assert!(!writer.layout().partition_path(&key).exists());
    }

    #[test]
    fn rewrite_overwrites_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let writer = PartitionWriter::new(DataLayout::new(dir.path()));
        let key = PartitionKey::new("ABC", Fidelity::parse("day").unwrap(), d(2024, 1, 1), d(2024, 1, 31)).unwrap();
        writer.write(&key, &MarketRecords::Bars(bars(5))).unwrap();
        writer.write(&key, &MarketRecords::Bars(bars(2))).unwrap();

        let path = writer.layout().partition_path(&key);
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 3);
        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
