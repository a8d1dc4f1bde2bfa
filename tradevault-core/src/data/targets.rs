//! Download targets CSV.
//!
//! ```csv
//! ticker,ticker_fidelity,ticker_duration_months
//! AAPL,1 minute,24
//! MSFT,day,120
//! ```
//!
//! Rows are validated once at load; invalid rows are skipped with a warning.

use crate::domain::{Fidelity, JobKey};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum TargetsError {
    #[error("targets file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read targets file {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// A validated row of the targets file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetJob {
    pub ticker: String,
    pub fidelity: Fidelity,
    pub duration_months: u32,
}

impl TargetJob {
    pub fn job_key(&self) -> JobKey {
        JobKey::new(self.ticker.clone(), self.fidelity.clone())
    }
}

#[derive(Debug, Deserialize)]
struct RawTarget {
    #[serde(default)]
    ticker: Option<String>,
    #[serde(default)]
    ticker_fidelity: Option<String>,
    #[serde(default)]
    ticker_duration_months: Option<String>,
}

fn parse_months(raw: &str) -> Option<u32> {
    let value: f64 = raw.trim().parse().ok()?;
    if value.fract() != 0.0 || value < 1.0 || value > u32::MAX as f64 {
        return None;
    }
    Some(value as u32)
}

fn validate(raw: RawTarget) -> Result<TargetJob, String> {
    let ticker = raw
        .ticker
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or("missing ticker")?;
    let fidelity_text = raw
        .ticker_fidelity
        .filter(|f| !f.trim().is_empty())
        .ok_or("missing ticker_fidelity")?;
    let fidelity = Fidelity::parse(&fidelity_text).map_err(|e| e.to_string())?;
    let months_text = raw
        .ticker_duration_months
        .ok_or("missing ticker_duration_months")?;
    let duration_months = parse_months(&months_text)
        .ok_or_else(|| format!("invalid ticker_duration_months '{months_text}'"))?;

    Ok(TargetJob {
        ticker,
        fidelity,
        duration_months,
    })
}

/// Load and validate the targets file.
pub fn load_targets(path: &Path) -> Result<Vec<TargetJob>, TargetsError> {
    if !path.exists() {
        return Err(TargetsError::NotFound(path.to_path_buf()));
    }
    let csv_err = |source| TargetsError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let mut jobs = Vec::new();
    for (i, row) in reader.deserialize::<RawTarget>().enumerate() {
        let row = row.map_err(csv_err)?;
        match validate(row) {
            Ok(job) => jobs.push(job),
            Err(reason) => warn!(row = i + 2, %reason, "skipping invalid target row"),
        }
    }
    Ok(jobs)
}
