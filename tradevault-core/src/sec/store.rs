//! Filing section records and their JSONL files.
//!
//! Records are grouped by filing year and appended to
//! `<filings_dir>/<TICKER>/sec_filings_<YYYY>_<TICKER>.jsonl`. Appends from
//! all workers in the process go through one lock.

use super::client::FilingMeta;
use chrono::{DateTime, SecondsFormat, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::warn;

pub const EXTRACTION_METHOD: &str = "sec-api.io_extractor_v1";

lazy_static! {
    static ref APPEND_LOCK: Mutex<()> = Mutex::new(());
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode record: {0}")]
    Json(#[from] serde_json::Error),
}

/// One extracted section of one filing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilingRecord {
    pub accession_number: Option<String>,
    pub filing_timestamp_utc: Option<String>,
    pub period_end_date: Option<String>,
    pub cik: String,
    pub ticker: String,
    pub company_name: Option<String>,
    pub form_type: String,
    pub is_amendment: bool,
    pub sic_code: Option<String>,
    pub items_reported: Vec<String>,
    pub source_url: String,
    pub extraction_method: String,
    pub processing_timestamp_utc: String,
    pub section_id: String,
    pub text: String,
}

fn utc_seconds(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// `filedAt` (RFC 3339 with any offset) as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn filing_timestamp_utc(filed_at: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(filed_at)
        .ok()
        .map(|dt| utc_seconds(dt.with_timezone(&Utc)))
}

/// Shared fields of every section record for one filing. `section_id` and
/// `text` are left empty.
pub fn base_record(meta: &FilingMeta, ticker: &str, cik_padded: &str, source_url: &str) -> FilingRecord {
    let form_type = meta.form_type.clone().unwrap_or_default().to_uppercase();
    let filing_timestamp = meta.filed_at.as_deref().and_then(|raw| {
        let parsed = filing_timestamp_utc(raw);
        if parsed.is_none() {
            warn!(accession = ?meta.accession_no, filed_at = raw, "invalid filing timestamp");
        }
        parsed
    });
    let sic_code = meta
        .entities
        .iter()
        .find(|e| {
            e.cik
                .as_deref()
                .is_some_and(|c| format!("{:0>10}", c.trim()) == cik_padded)
        })
        .and_then(|e| e.sic.clone());

    FilingRecord {
        accession_number: meta.accession_no.clone(),
        filing_timestamp_utc: filing_timestamp,
        period_end_date: meta.period_of_report.clone(),
        cik: cik_padded.to_string(),
        ticker: ticker.to_string(),
        company_name: meta.company_name.clone(),
        is_amendment: form_type.contains("/A"),
        form_type,
        sic_code,
        items_reported: meta.items.clone(),
        source_url: source_url.to_string(),
        extraction_method: EXTRACTION_METHOD.to_string(),
        processing_timestamp_utc: utc_seconds(Utc::now()),
        section_id: String::new(),
        text: String::new(),
    }
}

pub fn filings_file_name(year: &str, ticker: &str) -> String {
    format!("sec_filings_{year}_{ticker}.jsonl")
}

/// Group by the year prefix of `filing_timestamp_utc`. Records without a
/// usable timestamp are dropped with a warning.
pub fn group_by_year(records: Vec<FilingRecord>) -> BTreeMap<String, Vec<FilingRecord>> {
    let mut grouped: BTreeMap<String, Vec<FilingRecord>> = BTreeMap::new();
    for record in records {
        let year = record
            .filing_timestamp_utc
            .as_deref()
            .and_then(|ts| ts.get(..4))
            .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
            .map(str::to_string);
        match year {
            Some(year) => grouped.entry(year).or_default().push(record),
            None => warn!(accession = ?record.accession_number, "skipping record without filing timestamp"),
        }
    }
    grouped
}

/// Append one ticker's records to its per-year JSONL files. Returns the
/// number of records written.
pub fn append_records(filings_dir: &Path, ticker: &str, records: Vec<FilingRecord>) -> Result<usize, StoreError> {
    if records.is_empty() {
        return Ok(0);
    }
    let grouped = group_by_year(records);
    let ticker_dir = filings_dir.join(ticker);
    fs::create_dir_all(&ticker_dir).map_err(|source| StoreError::Io {
        path: ticker_dir.clone(),
        source,
    })?;

    let _guard = APPEND_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let mut written = 0;
    for (year, year_records) in grouped {
        let path = ticker_dir.join(filings_file_name(&year, ticker));
        let io_err = |source| StoreError::Io {
            path: path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        let mut out = BufWriter::new(file);
        for record in &year_records {
            serde_json::to_writer(&mut out, record)?;
            out.write_all(b"\n").map_err(io_err)?;
            written += 1;
        }
        out.flush().map_err(io_err)?;
    }
    Ok(written)
}
