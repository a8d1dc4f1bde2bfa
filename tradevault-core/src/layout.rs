//! Directory layout under the configured base output path.
//!
//! ```text
//! <base>/stocks/trading_history/<TICKER>/<fidelity-folder>/<partition files>
//! <base>/stocks/stock_ticker_review.csv
//! <base>/stocks/stocks_trading_history_error_log.csv
//! <base>/stocks/maintenance/data_integrity_report.csv
//! <base>/stocks/maintenance/liquidity_screening_report.csv
//! <base>/stocks/filings/<TICKER>/sec_filings_<YYYY>_<TICKER>.jsonl
//! <base>/stocks/corporate_actions/<action>/<TICKER>/<TICKER>_<action>_<start>_to_<end>.csv
//! ```

use crate::domain::{debug_sample_file_name, Fidelity, PartitionKey};
use chrono::NaiveDate;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const ANOMALY_REPORT_NAME: &str = "stock_ticker_review.csv";
pub const ERROR_LOG_NAME: &str = "stocks_trading_history_error_log.csv";
pub const INTEGRITY_REPORT_NAME: &str = "data_integrity_report.csv";
pub const LIQUIDITY_REPORT_NAME: &str = "liquidity_screening_report.csv";

/// Paths derived from the base output directory.
#[derive(Debug, Clone)]
pub struct DataLayout {
    base: PathBuf,
}

impl DataLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn stocks_dir(&self) -> PathBuf {
        self.base.join("stocks")
    }

    pub fn trading_history_root(&self) -> PathBuf {
        self.stocks_dir().join("trading_history")
    }

    pub fn maintenance_dir(&self) -> PathBuf {
        self.stocks_dir().join("maintenance")
    }

    pub fn filings_dir(&self) -> PathBuf {
        self.stocks_dir().join("filings")
    }

    pub fn corporate_actions_dir(&self) -> PathBuf {
        self.stocks_dir().join("corporate_actions")
    }

    /// One ticker's records of one corporate-action kind over `[start, end]`.
    pub fn corporate_action_path(&self, action: &str, ticker: &str, start: NaiveDate, end: NaiveDate) -> PathBuf {
        self.corporate_actions_dir()
            .join(action)
            .join(ticker)
            .join(format!("{ticker}_{action}_{start}_to_{end}.csv"))
    }

    pub fn job_dir(&self, ticker: &str, fidelity: &Fidelity) -> PathBuf {
        self.trading_history_root()
            .join(ticker)
            .join(fidelity.folder_name())
    }

    pub fn partition_path(&self, key: &PartitionKey) -> PathBuf {
        self.trading_history_root().join(key.relative_path())
    }

    pub fn debug_sample_path(&self, ticker: &str, fidelity: &Fidelity) -> PathBuf {
        self.job_dir(ticker, fidelity)
            .join(debug_sample_file_name(ticker, fidelity))
    }

    pub fn anomaly_report_path(&self) -> PathBuf {
        self.stocks_dir().join(ANOMALY_REPORT_NAME)
    }

    pub fn error_log_path(&self) -> PathBuf {
        self.stocks_dir().join(ERROR_LOG_NAME)
    }

    pub fn integrity_report_path(&self) -> PathBuf {
        self.maintenance_dir().join(INTEGRITY_REPORT_NAME)
    }

    pub fn liquidity_report_path(&self) -> PathBuf {
        self.maintenance_dir().join(LIQUIDITY_REPORT_NAME)
    }
}

/// `path` if it does not exist yet, otherwise the first free
/// `name(001).ext`, `name(002).ext`, ...
pub fn unique_filepath(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut counter: u32 = 1;
    loop {
        let candidate = dir.join(format!("{stem}({counter:03}){ext}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Most recently created file in `dir` whose name starts with `prefix` and
/// ends with `suffix`. Falls back to the modification time on file systems
/// without creation times.
pub fn find_latest_file(dir: &Path, prefix: &str, suffix: &str) -> io::Result<Option<PathBuf>> {
    if !dir.is_dir() {
        return Ok(None);
    }

    let mut best: Option<(SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(prefix) || !name.ends_with(suffix) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let stamp = meta.created().or_else(|_| meta.modified())?;
        let newer = match &best {
            Some((t, p)) => stamp > *t || (stamp == *t && entry.path() > *p),
            None => true,
        };
        if newer {
            best = Some((stamp, entry.path()));
        }
    }

    Ok(best.map(|(_, p)| p))
}
