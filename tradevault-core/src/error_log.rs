//! Process-wide log of failed download chunks.
//!
//! Failures are collected in memory while a workflow runs and flushed to
//! `stocks_trading_history_error_log.csv` exactly once, when the flush guard
//! is dropped at the end of the process. The file is appended to; the header
//! is written only when the file is created.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum ErrorLogError {
    #[error("error log I/O at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error log CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// One failed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub log_timestamp_utc: String,
    pub script_name: String,
    pub ticker: String,
    pub fidelity: String,
    pub failed_chunk_start: Option<NaiveDate>,
    pub failed_chunk_end: Option<NaiveDate>,
    pub reason: String,
}

/// In-memory collector, shared across worker threads.
#[derive(Debug)]
pub struct ErrorLog {
    script_name: String,
    records: Mutex<Vec<ErrorRecord>>,
    registered: AtomicBool,
    flushed: AtomicBool,
}

impl ErrorLog {
    pub fn new(script_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            script_name: script_name.into(),
            records: Mutex::new(Vec::new()),
            registered: AtomicBool::new(false),
            flushed: AtomicBool::new(false),
        })
    }

    pub fn script_name(&self) -> &str {
        &self.script_name
    }

    /// Record a failure. Start/end are `None` when the failure is not tied to
    /// a date range.
    pub fn record(
        &self,
        ticker: &str,
        fidelity: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        reason: impl std::fmt::Display,
    ) {
        let rec = ErrorRecord {
            log_timestamp_utc: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            script_name: self.script_name.clone(),
            ticker: ticker.to_string(),
            fidelity: fidelity.to_string(),
            failed_chunk_start: start,
            failed_chunk_end: end,
            reason: reason.to_string(),
        };
        error!(
            ticker = %rec.ticker,
            fidelity = %rec.fidelity,
            start = ?start,
            end = ?end,
            reason = %rec.reason,
            "error logged"
        );
        self.lock().push(rec);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn records(&self) -> Vec<ErrorRecord> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<ErrorRecord>> {
        // A poisoned lock still holds valid records.
        self.records.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Register the end-of-process flush to `path`. Only the first call
    /// returns a guard; later calls return `None`.
    pub fn register_flush(self: &Arc<Self>, path: impl Into<PathBuf>) -> Option<FlushGuard> {
        if self.registered.swap(true, Ordering::SeqCst) {
            return None;
        }
        Some(FlushGuard {
            log: Arc::clone(self),
            path: path.into(),
        })
    }

    /// Append collected records to `path`. Runs at most once; returns the
    /// number of rows written.
    pub fn flush_to(&self, path: &Path) -> Result<usize, ErrorLogError> {
        if self.flushed.swap(true, Ordering::SeqCst) {
            return Ok(0);
        }

        let records = self.records();
        if records.is_empty() {
            info!("no errors were logged during this session");
            return Ok(0);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ErrorLogError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let existed = path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| ErrorLogError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(!existed)
            .from_writer(file);
        for rec in &records {
            writer.serialize(rec)?;
        }
        writer.flush().map_err(|source| ErrorLogError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        info!(count = records.len(), path = %path.display(), "saved error log");
        Ok(records.len())
    }
}

/// Flushes the error log when dropped.
#[must_use = "the error log is flushed when this guard is dropped"]
pub struct FlushGuard {
    log: Arc<ErrorLog>,
    path: PathBuf,
}

impl FlushGuard {
    pub fn log(&self) -> &Arc<ErrorLog> {
        &self.log
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if let Err(e) = self.log.flush_to(&self.path) {
            error!(path = %self.path.display(), error = %e, "failed to save error log");
        }
    }
}
