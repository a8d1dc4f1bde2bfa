//! Liquidity screen over stored tick data.
//!
//! Three per-ticker metrics over the lookback window. A polars plan groups
//! the window's trades by UTC date; the metrics reduce the per-day frame:
//! - ADDV: mean daily dollar volume, Σ price·size per day
//! - ADNT: mean daily trade count
//! - MTBT: median over days of each day's median seconds between trades

use super::ticks::{
    epoch_days_to_date, inter_trade_secs, scan_ticks, sip_datetime, PRICE_COL, SIZE_COL, TIMESTAMP_COL,
};
use super::{relabel_resource_error, AnalyticsError};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use std::path::PathBuf;

pub const LOOKBACK_DAYS: i64 = 730;

pub const TIER1_MIN_ADDV: f64 = 25_000_000.0;
pub const TIER1_MIN_ADNT: f64 = 5_000.0;
pub const TIER1_MAX_MTBT: f64 = 30.0;
pub const TIER2_MIN_ADDV: f64 = 5_000_000.0;
pub const TIER2_MIN_ADNT: f64 = 1_000.0;
pub const TIER2_MAX_MTBT: f64 = 300.0;

pub const ERROR_TIER: u8 = 99;
pub const ERROR_RECOMMENDATION: &str = "Error/Insufficient Data";

#[derive(Debug, Clone, PartialEq)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub trades: usize,
    pub dollar_volume: f64,
    /// `None` when the day had a single trade.
    pub median_gap_secs: Option<f64>,
}

/// One row of the liquidity report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiquidityMetrics {
    pub ticker: String,
    #[serde(rename = "ADDV")]
    pub addv: Option<f64>,
    #[serde(rename = "ADNT")]
    pub adnt: Option<f64>,
    #[serde(rename = "Median_Time_Between_Trades_Sec")]
    pub mtbt_sec: Option<f64>,
    #[serde(rename = "Liquidity_Tier")]
    pub tier: u8,
    #[serde(rename = "Recommendation")]
    pub recommendation: String,
    pub error: Option<String>,
}

impl LiquidityMetrics {
    pub fn failed(ticker: &str, message: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            addv: None,
            adnt: None,
            mtbt_sec: None,
            tier: ERROR_TIER,
            recommendation: ERROR_RECOMMENDATION.to_string(),
            error: Some(relabel_resource_error(message)),
        }
    }
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Per-day aggregates of trades at or after `min_sip_ns`, oldest day first.
/// `lf` needs `sip_timestamp`, `price` and `size` columns.
pub fn daily_stats(lf: LazyFrame, min_sip_ns: i64) -> Result<Vec<DailyStats>, AnalyticsError> {
    let days = lf
        .filter(col(TIMESTAMP_COL).gt_eq(lit(min_sip_ns)))
        .with_column(sip_datetime("UTC").dt().date().cast(DataType::Int32).alias("date_utc"))
        .group_by([col("date_utc")])
        .agg([
            len().alias("trades"),
            (col(PRICE_COL) * col(SIZE_COL)).sum().alias("dollar_volume"),
            inter_trade_secs().median().alias("median_gap"),
        ])
        .sort(["date_utc"], Default::default())
        .collect()?;

    let date = days.column("date_utc")?.i32()?.clone();
    let trades = days.column("trades")?.cast(&DataType::UInt64)?;
    let volume = days.column("dollar_volume")?.cast(&DataType::Float64)?;
    let gaps = days.column("median_gap")?.cast(&DataType::Float64)?;

    let mut out = Vec::with_capacity(days.height());
    for (((d, n), v), g) in date
        .into_iter()
        .zip(trades.u64()?.into_iter())
        .zip(volume.f64()?.into_iter())
        .zip(gaps.f64()?.into_iter())
    {
        let Some(date) = d.and_then(epoch_days_to_date) else { continue };
        out.push(DailyStats {
            date,
            trades: n.unwrap_or(0) as usize,
            dollar_volume: v.unwrap_or(0.0),
            median_gap_secs: g,
        });
    }
    Ok(out)
}

/// Tier and recommendation for a metric triple.
pub fn classify(addv: Option<f64>, adnt: Option<f64>, mtbt: Option<f64>) -> (u8, &'static str) {
    let (Some(addv), Some(adnt), Some(mtbt)) = (addv, adnt, mtbt) else {
        return (ERROR_TIER, ERROR_RECOMMENDATION);
    };
    if addv == 0.0 || adnt == 0.0 {
        return (ERROR_TIER, ERROR_RECOMMENDATION);
    }
    if addv >= TIER1_MIN_ADDV && adnt >= TIER1_MIN_ADNT && mtbt <= TIER1_MAX_MTBT {
        (1, "Keep (High)")
    } else if addv >= TIER2_MIN_ADDV && adnt >= TIER2_MIN_ADNT && mtbt <= TIER2_MAX_MTBT {
        (2, "Keep (Moderate)")
    } else {
        (3, "Remove (Illiquid)")
    }
}

/// Metrics from a ticker's per-day aggregates.
pub fn metrics_from_days(ticker: &str, days: &[DailyStats]) -> Result<LiquidityMetrics, AnalyticsError> {
    if days.is_empty() {
        return Err(AnalyticsError::NoData);
    }

    let n = days.len() as f64;
    let addv = days.iter().map(|d| d.dollar_volume).sum::<f64>() / n;
    let adnt = days.iter().map(|d| d.trades as f64).sum::<f64>() / n;
    let mut day_medians: Vec<f64> = days.iter().filter_map(|d| d.median_gap_secs).collect();
    let mtbt = median(&mut day_medians);

    let (tier, recommendation) = classify(Some(addv), Some(adnt), mtbt);
    Ok(LiquidityMetrics {
        ticker: ticker.to_string(),
        addv: Some(addv),
        adnt: Some(adnt),
        mtbt_sec: mtbt,
        tier,
        recommendation: recommendation.to_string(),
        error: None,
    })
}

/// Start of the lookback window: midnight of `today - LOOKBACK_DAYS`, as
/// Unix ns.
pub fn lookback_cutoff_ns(today: NaiveDate) -> i64 {
    let cutoff = today - chrono::Duration::days(LOOKBACK_DAYS);
    cutoff
        .and_hms_opt(0, 0, 0)
        .and_then(|dt| dt.and_utc().timestamp_nanos_opt())
        .unwrap_or(i64::MIN)
}

/// Aggregate one ticker's ticks inside the lookback window and score them.
/// Failures become an error row.
pub fn calculate_liquidity_metrics(ticker: &str, files: &[PathBuf], today: NaiveDate) -> LiquidityMetrics {
    let result = scan_ticks(files)
        .and_then(|lf| daily_stats(lf, lookback_cutoff_ns(today)))
        .and_then(|days| metrics_from_days(ticker, &days));
    match result {
        Ok(m) => m,
        Err(AnalyticsError::NoData) => LiquidityMetrics::failed(ticker, "No data in lookback period"),
        Err(e) => LiquidityMetrics::failed(ticker, &e.to_string()),
    }
}

/// Best tier first, then highest ADDV.
pub fn sort_liquidity_report(rows: &mut [LiquidityMetrics]) {
    rows.sort_by(|a, b| {
        a.tier
            .cmp(&b.tier)
            .then_with(|| {
                let (x, y) = (a.addv.unwrap_or(f64::NEG_INFINITY), b.addv.unwrap_or(f64::NEG_INFINITY));
                y.total_cmp(&x)
            })
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
}
