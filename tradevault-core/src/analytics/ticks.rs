//! Tick file discovery and the shared lazy scan over a ticker's files.

use super::AnalyticsError;
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const TIMESTAMP_COL: &str = "sip_timestamp";
pub const PRICE_COL: &str = "price";
pub const SIZE_COL: &str = "size";

/// `<root>/<TICKER>/tick/*.parquet`, grouped by ticker folder.
///
/// A missing root yields nothing; unreadable tick folders are skipped with a
/// warning.
pub fn discover_tick_files(root: &Path) -> Result<BTreeMap<String, Vec<PathBuf>>, AnalyticsError> {
    let mut found: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    if !root.is_dir() {
        return Ok(found);
    }

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.path().is_dir() {
            continue;
        }
        let ticker = entry.file_name().to_string_lossy().into_owned();
        let tick_dir = entry.path().join("tick");
        if !tick_dir.is_dir() {
            continue;
        }

        let listing = match fs::read_dir(&tick_dir) {
            Ok(l) => l,
            Err(e) => {
                warn!(dir = %tick_dir.display(), error = %e, "could not scan tick directory");
                continue;
            }
        };
        let mut files: Vec<PathBuf> = listing
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("parquet"))
            .collect();
        if files.is_empty() {
            continue;
        }
        files.sort();
        found.insert(ticker, files);
    }

    Ok(found)
}

/// One lazy scan over every file of a ticker with the trade columns cast to
/// the types the analytics expect. Nothing is read until the plan is
/// collected.
pub fn scan_ticks(files: &[PathBuf]) -> Result<LazyFrame, AnalyticsError> {
    if files.is_empty() {
        return Err(AnalyticsError::NoData);
    }
    let lf = LazyFrame::scan_parquet_files(files.to_vec().into(), ScanArgsParquet::default())?;
    Ok(lf.select([
        col(TIMESTAMP_COL).cast(DataType::Int64),
        col(PRICE_COL).cast(DataType::Float64),
        col(SIZE_COL).cast(DataType::Float64),
    ]))
}

/// Seconds between consecutive trades of a group, in time order. The first
/// trade of each group yields null.
pub(crate) fn inter_trade_secs() -> Expr {
    let sorted = col(TIMESTAMP_COL).sort(SortOptions::default());
    (sorted.clone() - sorted.shift(lit(1))).cast(DataType::Float64) / lit(1e9)
}

/// `sip_timestamp` as a zone-aware datetime in `tz`.
pub(crate) fn sip_datetime(tz: &str) -> Expr {
    col(TIMESTAMP_COL)
        .cast(DataType::Datetime(TimeUnit::Nanoseconds, Some("UTC".into())))
        .dt()
        .convert_time_zone(tz.into())
}

/// Days since 1970-01-01 back to a calendar date.
pub(crate) fn epoch_days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::records::Trade;
    use crate::data::writer::trades_to_dataframe;

    fn write_trades(path: &Path, stamps: &[i64]) {
        let trades: Vec<Trade> = stamps
            .iter()
            .map(|&sip_timestamp| Trade {
                sip_timestamp,
                participant_timestamp: None,
                price: 2.0,
                size: 50.0,
                exchange: None,
                id: None,
                sequence_number: None,
                tape: None,
                conditions: vec![],
            })
            .collect();
        let mut df = trades_to_dataframe(&trades).unwrap();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = fs::File::create(path).unwrap();
        ParquetWriter::new(file).finish(&mut df).unwrap();
    }

    #[test]
    fn discovers_only_tick_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_trades(&root.join("ABC/tick/ABC_tick_2024-01-01_to_2024-01-31.parquet"), &[1]);
        fs::write(root.join("ABC/tick/ABC_tick_DEBUG.csv"), "x").unwrap();
        fs::create_dir_all(root.join("XYZ/1-minute")).unwrap();
        fs::write(root.join("XYZ/1-minute/x.parquet"), "x").unwrap();

        let found = discover_tick_files(root).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["ABC"].len(), 1);
    }

    #[test]
    fn one_plan_spans_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.parquet");
        let b = dir.path().join("b.parquet");
        write_trades(&a, &[10, 20]);
        write_trades(&b, &[30]);

        let df = scan_ticks(&[a, b])
            .unwrap()
            .filter(col(TIMESTAMP_COL).gt_eq(lit(20i64)))
            .sort([TIMESTAMP_COL], Default::default())
            .collect()
            .unwrap();
        let stamps: Vec<i64> = df.column(TIMESTAMP_COL).unwrap().i64().unwrap().into_no_null_iter().collect();
        assert_eq!(stamps, vec![20, 30]);
        assert_eq!(df.column(PRICE_COL).unwrap().dtype(), &DataType::Float64);
    }

    #[test]
    fn empty_file_list_is_no_data() {
        assert!(matches!(scan_ticks(&[]), Err(AnalyticsError::NoData)));
    }

    #[test]
    fn epoch_days() {
        assert_eq!(epoch_days_to_date(0), NaiveDate::from_ymd_opt(1970, 1, 1));
        assert_eq!(epoch_days_to_date(19_786), NaiveDate::from_ymd_opt(2024, 3, 4));
    }
}
