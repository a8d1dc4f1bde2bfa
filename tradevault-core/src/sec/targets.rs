//! Filings targets CSV: `ticker,CIK`.

use crate::data::TargetsError;
use serde::Deserialize;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilingTarget {
    pub ticker: String,
    /// Leading zeros stripped, used in search queries.
    pub cik_unpadded: String,
    /// Ten digits, zero padded, written to output records.
    pub cik_padded: String,
}

/// `(unpadded, padded)` forms of a CIK cell, or `None` if it is not numeric.
///
/// Spreadsheet exports sometimes write `320193.0`; the trailing `.0` is
/// dropped before validation.
pub fn normalize_cik(raw: &str) -> Option<(String, String)> {
    let clean = raw.trim();
    let clean = clean.strip_suffix(".0").unwrap_or(clean);
    if clean.is_empty() || !clean.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let unpadded = clean.trim_start_matches('0');
    if unpadded.is_empty() {
        return None;
    }
    Some((unpadded.to_string(), format!("{clean:0>10}")))
}

#[derive(Debug, Deserialize)]
struct RawFilingTarget {
    #[serde(default)]
    ticker: Option<String>,
    #[serde(default, rename = "CIK")]
    cik: Option<String>,
}

/// Load filings targets. Rows without a ticker or with a non-numeric CIK are
/// skipped with a warning.
pub fn load_filing_targets(path: &Path) -> Result<Vec<FilingTarget>, TargetsError> {
    if !path.exists() {
        return Err(TargetsError::NotFound(path.to_path_buf()));
    }
    let csv_err = |source| TargetsError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let mut out = Vec::new();
    for row in reader.deserialize::<RawFilingTarget>() {
        let row = row.map_err(csv_err)?;
        let Some(ticker) = row.ticker.filter(|t| !t.is_empty()) else {
            warn!("skipping filings target without ticker");
            continue;
        };
        let raw_cik = row.cik.unwrap_or_default();
        match normalize_cik(&raw_cik) {
            Some((cik_unpadded, cik_padded)) => out.push(FilingTarget {
                ticker,
                cik_unpadded,
                cik_padded,
            }),
            None => warn!(%ticker, cik = %raw_cik, "skipping filings target with invalid CIK"),
        }
    }
    Ok(out)
}
