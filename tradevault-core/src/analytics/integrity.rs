//! Tick-data integrity check.
//!
//! Trades are viewed in exchange local time (America/New_York). Within
//! regular trading hours, 09:30:00 to 16:00:00 inclusive, any pause between
//! consecutive trades longer than [`SIGNIFICANT_GAP_SECS`] counts as a
//! significant gap for that day.

use super::ticks::{epoch_days_to_date, inter_trade_secs, scan_ticks, sip_datetime, TIMESTAMP_COL};
use super::{relabel_resource_error, round2, AnalyticsError};
use chrono::NaiveDate;
use chrono_tz::America::New_York;
use polars::prelude::*;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

pub const SIGNIFICANT_GAP_SECS: f64 = 900.0;

const NS_PER_SEC: i64 = 1_000_000_000;
/// 09:30:00 as nanoseconds after local midnight.
const RTH_OPEN_NS: i64 = (9 * 3600 + 30 * 60) * NS_PER_SEC;
/// 16:00:00 as nanoseconds after local midnight.
const RTH_CLOSE_NS: i64 = 16 * 3600 * NS_PER_SEC;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IntegrityStatus {
    #[serde(rename = "Error")]
    Error,
    #[serde(rename = "Anomalies Detected")]
    AnomaliesDetected,
    #[serde(rename = "No RTH Data Found")]
    NoRthDataFound,
    #[serde(rename = "Healthy")]
    Healthy,
}

impl IntegrityStatus {
    /// Report ordering: worst first.
    pub fn rank(self) -> u8 {
        match self {
            IntegrityStatus::Error => 1,
            IntegrityStatus::AnomaliesDetected => 2,
            IntegrityStatus::NoRthDataFound => 3,
            IntegrityStatus::Healthy => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            IntegrityStatus::Error => "Error",
            IntegrityStatus::AnomaliesDetected => "Anomalies Detected",
            IntegrityStatus::NoRthDataFound => "No RTH Data Found",
            IntegrityStatus::Healthy => "Healthy",
        }
    }
}

impl fmt::Display for IntegrityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One row of the integrity report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegritySummary {
    pub ticker: String,
    pub status: IntegrityStatus,
    pub start_date_et: Option<NaiveDate>,
    pub end_date_et: Option<NaiveDate>,
    pub total_trading_days_rth: usize,
    pub days_zero_rth_volume: usize,
    pub days_with_significant_gaps: usize,
    pub max_intraday_gap_sec: f64,
    pub error: Option<String>,
}

impl IntegritySummary {
    fn empty(ticker: &str, status: IntegrityStatus) -> Self {
        Self {
            ticker: ticker.to_string(),
            status,
            start_date_et: None,
            end_date_et: None,
            total_trading_days_rth: 0,
            days_zero_rth_volume: 0,
            days_with_significant_gaps: 0,
            max_intraday_gap_sec: 0.0,
            error: None,
        }
    }

    pub fn failed(ticker: &str, message: &str) -> Self {
        Self {
            error: Some(relabel_resource_error(message)),
            ..Self::empty(ticker, IntegrityStatus::Error)
        }
    }
}

/// Exchange-local view of the trades: ET calendar day (days since epoch)
/// and nanoseconds since local midnight.
fn with_local_clock(lf: LazyFrame) -> LazyFrame {
    let local = sip_datetime(New_York.name());
    let time_of_day = local.clone().dt().hour().cast(DataType::Int64) * lit(3600 * NS_PER_SEC)
        + local.clone().dt().minute().cast(DataType::Int64) * lit(60 * NS_PER_SEC)
        + local.clone().dt().second().cast(DataType::Int64) * lit(NS_PER_SEC)
        + local.clone().dt().nanosecond().cast(DataType::Int64);
    lf.with_columns([
        local.dt().date().cast(DataType::Int32).alias("date_et"),
        time_of_day.alias("time_ns_et"),
    ])
}

/// Integrity summary for one ticker's trades. `lf` needs a `sip_timestamp`
/// column of Unix nanoseconds in any order.
pub fn integrity_from_frame(ticker: &str, lf: LazyFrame) -> Result<IntegritySummary, AnalyticsError> {
    let lf = with_local_clock(lf);

    let coverage = lf
        .clone()
        .select([
            col("date_et").min().alias("first"),
            col("date_et").max().alias("last"),
        ])
        .collect()?;
    let first = coverage.column("first")?.i32()?.get(0);
    let last = coverage.column("last")?.i32()?.get(0);

    let days = lf
        .filter(
            col("time_ns_et")
                .gt_eq(lit(RTH_OPEN_NS))
                .and(col("time_ns_et").lt_eq(lit(RTH_CLOSE_NS))),
        )
        .group_by([col("date_et")])
        .agg([
            len().alias("trades"),
            inter_trade_secs().max().alias("max_gap"),
            inter_trade_secs()
                .gt(lit(SIGNIFICANT_GAP_SECS))
                .cast(DataType::UInt32)
                .sum()
                .alias("gaps"),
        ])
        .collect()?;

    let mut summary = IntegritySummary::empty(ticker, IntegrityStatus::NoRthDataFound);
    summary.start_date_et = first.and_then(epoch_days_to_date);
    summary.end_date_et = last.and_then(epoch_days_to_date);
    if days.height() == 0 {
        return Ok(summary);
    }

    let trades = days.column("trades")?.cast(&DataType::UInt64)?;
    let max_gap = days.column("max_gap")?.cast(&DataType::Float64)?;
    let gaps = days.column("gaps")?.cast(&DataType::UInt64)?;

    let mut worst_gap: Option<f64> = None;
    for ((count, gap), flagged) in trades
        .u64()?
        .into_iter()
        .zip(max_gap.f64()?.into_iter())
        .zip(gaps.u64()?.into_iter())
    {
        if count.unwrap_or(0) == 0 {
            summary.days_zero_rth_volume += 1;
        }
        if flagged.unwrap_or(0) > 0 {
            summary.days_with_significant_gaps += 1;
            if let Some(g) = gap {
                worst_gap = Some(worst_gap.map_or(g, |w| w.max(g)));
            }
        }
    }

    summary.total_trading_days_rth = days.height();
    summary.max_intraday_gap_sec = worst_gap.map(round2).unwrap_or(0.0);
    summary.status = if summary.days_zero_rth_volume > 0 || summary.days_with_significant_gaps > 0 {
        IntegrityStatus::AnomaliesDetected
    } else {
        IntegrityStatus::Healthy
    };
    Ok(summary)
}

/// [`integrity_from_frame`] over in-memory SIP timestamps.
pub fn analyze_timestamps(ticker: &str, sip_timestamps_ns: &[i64]) -> Result<IntegritySummary, AnalyticsError> {
    let df = DataFrame::new(vec![Column::new(TIMESTAMP_COL.into(), sip_timestamps_ns)])?;
    integrity_from_frame(ticker, df.lazy())
}

/// Scan and analyse every tick file of one ticker. Failures become an
/// `Error` row instead of propagating.
pub fn analyze_ticker_integrity(ticker: &str, files: &[PathBuf]) -> IntegritySummary {
    match scan_ticks(files).and_then(|lf| integrity_from_frame(ticker, lf)) {
        Ok(summary) => summary,
        Err(e) => IntegritySummary::failed(ticker, &e.to_string()),
    }
}

/// Worst status first, then most gap days, then most zero-volume days.
pub fn sort_integrity_report(rows: &mut [IntegritySummary]) {
    rows.sort_by(|a, b| {
        a.status
            .rank()
            .cmp(&b.status.rank())
            .then(b.days_with_significant_gaps.cmp(&a.days_with_significant_gaps))
            .then(b.days_zero_rth_volume.cmp(&a.days_zero_rth_volume))
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// Unix ns for a New York wall-clock time.
    fn et(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> i64 {
        New_York
            .with_ymd_and_hms(y, m, d, h, min, s)
            .single()
            .unwrap()
            .timestamp_nanos_opt()
            .unwrap()
    }

    #[test]
    fn healthy_day() {
        let stamps: Vec<i64> = (0..=26).map(|i| et(2024, 3, 4, 9, 30, 0) + i * 900 * 1_000_000_000).collect();
        let s = analyze_timestamps("ABC", &stamps).unwrap();
        assert_eq!(s.status, IntegrityStatus::Healthy);
        assert_eq!(s.total_trading_days_rth, 1);
        assert_eq!(s.days_with_significant_gaps, 0);
        assert_eq!(s.max_intraday_gap_sec, 0.0);
        assert_eq!(s.start_date_et, NaiveDate::from_ymd_opt(2024, 3, 4));
    }

    #[test]
    fn gap_over_threshold_is_flagged() {
        let stamps = vec![
            et(2024, 3, 4, 10, 0, 0),
            et(2024, 3, 4, 10, 20, 0),
            et(2024, 3, 4, 10, 21, 0),
            et(2024, 3, 5, 10, 0, 0),
        ];
        let s = analyze_timestamps("ABC", &stamps).unwrap();
        assert_eq!(s.status, IntegrityStatus::AnomaliesDetected);
        assert_eq!(s.days_with_significant_gaps, 1);
        assert_eq!(s.max_intraday_gap_sec, 1200.0);
        assert_eq!(s.total_trading_days_rth, 2);
    }

    #[test]
    fn rth_bounds_are_inclusive() {
        // 09:30:00 and 16:00:00 are inside; 16:00:01 and 09:29:59 are not.
        let stamps = vec![
            et(2024, 3, 4, 9, 29, 59),
            et(2024, 3, 4, 9, 30, 0),
            et(2024, 3, 4, 16, 0, 0),
            et(2024, 3, 4, 16, 0, 1),
        ];
        let s = analyze_timestamps("ABC", &stamps).unwrap();
        assert_eq!(s.total_trading_days_rth, 1);
        assert_eq!(s.days_with_significant_gaps, 1);
        assert_eq!(s.max_intraday_gap_sec, 23400.0);
    }

    #[test]
    fn extended_hours_only_day_is_not_an_anomaly() {
        let stamps = vec![
            et(2024, 3, 4, 10, 0, 0),
            et(2024, 3, 5, 8, 0, 0),
            et(2024, 3, 5, 18, 0, 0),
        ];
        let s = analyze_timestamps("ABC", &stamps).unwrap();
        assert_eq!(s.status, IntegrityStatus::Healthy);
        assert_eq!(s.days_zero_rth_volume, 0);
        assert_eq!(s.total_trading_days_rth, 1);
        // Coverage still spans every traded day.
        assert_eq!(s.end_date_et, NaiveDate::from_ymd_opt(2024, 3, 5));
    }

    #[test]
    fn unsorted_input_is_ordered_per_day() {
        let stamps = vec![
            et(2024, 3, 4, 10, 21, 0),
            et(2024, 3, 4, 10, 0, 0),
            et(2024, 3, 4, 10, 20, 0),
        ];
        let s = analyze_timestamps("ABC", &stamps).unwrap();
        assert_eq!(s.days_with_significant_gaps, 1);
        assert_eq!(s.max_intraday_gap_sec, 1200.0);
    }

    #[test]
    fn fractional_second_after_close_is_outside_rth() {
        let stamps = vec![
            et(2024, 3, 4, 15, 50, 0),
            et(2024, 3, 4, 16, 0, 0) + 500_000_000,
        ];
        let s = analyze_timestamps("ABC", &stamps).unwrap();
        assert_eq!(s.total_trading_days_rth, 1);
        assert_eq!(s.days_with_significant_gaps, 0);
    }

    #[test]
    fn no_rth_data() {
        let s = analyze_timestamps("ABC", &[et(2024, 3, 4, 7, 0, 0)]).unwrap();
        assert_eq!(s.status, IntegrityStatus::NoRthDataFound);
        assert_eq!(analyze_timestamps("ABC", &[]).unwrap().status, IntegrityStatus::NoRthDataFound);
    }

    #[test]
    fn dates_follow_new_york_not_utc() {
        // 2024-03-05 02:00 UTC is still 2024-03-04 in New York.
        let ns = chrono::Utc
            .with_ymd_and_hms(2024, 3, 5, 2, 0, 0)
            .unwrap()
            .timestamp_nanos_opt()
            .unwrap();
        let s = analyze_timestamps("ABC", &[ns]).unwrap();
        assert_eq!(s.start_date_et, NaiveDate::from_ymd_opt(2024, 3, 4));
    }

    #[test]
    fn unreadable_files_become_error_rows() {
        let s = analyze_ticker_integrity("ABC", &[PathBuf::from("/no/such/file.parquet")]);
        assert_eq!(s.status, IntegrityStatus::Error);
        assert!(s.error.is_some());
    }

    #[test]
    fn report_ordering() {
        let mk = |t: &str, status, gaps, zero| IntegritySummary {
            days_with_significant_gaps: gaps,
            days_zero_rth_volume: zero,
            ..IntegritySummary::empty(t, status)
        };
        let mut rows = vec![
            mk("H", IntegrityStatus::Healthy, 0, 0),
            mk("A1", IntegrityStatus::AnomaliesDetected, 1, 5),
            mk("N", IntegrityStatus::NoRthDataFound, 0, 0),
            mk("A2", IntegrityStatus::AnomaliesDetected, 3, 0),
            mk("E", IntegrityStatus::Error, 0, 0),
            mk("A3", IntegrityStatus::AnomaliesDetected, 1, 7),
        ];
        sort_integrity_report(&mut rows);
        let order: Vec<_> = rows.iter().map(|r| r.ticker.as_str()).collect();
        assert_eq!(order, vec!["E", "A2", "A3", "A1", "N", "H"]);
    }
}
