//! Batch analytics over stored tick data: integrity check and liquidity screen.
//!
//! Each report is one lazy polars plan per ticker: scan every tick file,
//! derive a calendar day, group by it and aggregate. Only the small per-day
//! frame is pulled back into Rust.

pub mod integrity;
pub mod liquidity;
pub mod ticks;

use thiserror::Error;

pub use integrity::{analyze_ticker_integrity, IntegrityStatus, IntegritySummary};
pub use liquidity::{calculate_liquidity_metrics, LiquidityMetrics};
pub use ticks::{discover_tick_files, scan_ticks};

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Polars(String),

    #[error("no data in lookback period")]
    NoData,
}

impl From<polars::prelude::PolarsError> for AnalyticsError {
    fn from(e: polars::prelude::PolarsError) -> Self {
        AnalyticsError::Polars(e.to_string())
    }
}

const RESOURCE_MARKERS: &[&str] = &[
    "panic",
    "out of memory",
    "could not spawn threads",
    "paging file",
];

/// Messages that point at memory or thread exhaustion (or a panic inside
/// the engine) are relabelled so they stand out in the report.
pub fn relabel_resource_error(message: &str) -> String {
    let lower = message.to_lowercase();
    if RESOURCE_MARKERS.iter().any(|m| lower.contains(m)) {
        let head: String = message.chars().take(150).collect();
        format!("System Resource Error (OOM/Panic): {head}...")
    } else {
        message.to_string()
    }
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relabels_resource_errors() {
        assert_eq!(
            relabel_resource_error("PanicException: thread panicked"),
            "System Resource Error (OOM/Panic): PanicException: thread panicked..."
        );
        assert!(relabel_resource_error("memory allocation failed: Out of memory")
            .starts_with("System Resource Error (OOM/Panic): "));
        assert!(relabel_resource_error("The paging file is too small")
            .starts_with("System Resource Error"));
        assert_eq!(relabel_resource_error("column not found"), "column not found");
    }

    #[test]
    fn relabel_truncates_long_messages() {
        let long = format!("out of memory {}", "x".repeat(500));
        let out = relabel_resource_error(&long);
        assert!(out.len() < 200);
        assert!(out.ends_with("..."));
    }
}
