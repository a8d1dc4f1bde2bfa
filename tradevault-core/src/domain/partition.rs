//! Partition keys and the on-disk file naming scheme.
//!
//! `TICKER_FIDELITY-WITH-HYPHENS_YYYY-MM-DD_to_YYYY-MM-DD.{csv|parquet}`

use super::fidelity::{Fidelity, FidelityError, FileFormat};
use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

lazy_static! {
    static ref PARTITION_FILE_RE: Regex =
        Regex::new(r"^(.+?)_(.+?)_(\d{4}-\d{2}-\d{2})_to_(\d{4}-\d{2}-\d{2})\.(parquet|csv)$")
            .unwrap();
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PartitionError {
    #[error("range start {start} is after range end {end}")]
    InvertedRange { start: NaiveDate, end: NaiveDate },

    #[error("invalid ticker '{0}' (must be non-empty and contain no '_' or path separators)")]
    InvalidTicker(String),

    #[error("'{0}' is not a partition file name")]
    NotAPartition(String),

    #[error("invalid date '{date}' in partition file name '{file_name}'")]
    InvalidDate { file_name: String, date: String },

    #[error(transparent)]
    Fidelity(#[from] FidelityError),
}

/// Closed calendar range `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, PartitionError> {
        if start > end {
            return Err(PartitionError::InvertedRange { start, end });
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// One stored chunk of a job: ticker, fidelity and the date range it covers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    ticker: String,
    fidelity: Fidelity,
    range: DateRange,
}

impl PartitionKey {
    pub fn new(
        ticker: &str,
        fidelity: Fidelity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Self, PartitionError> {
        validate_ticker(ticker)?;
        Ok(Self {
            ticker: ticker.to_string(),
            fidelity,
            range: DateRange::new(start, end)?,
        })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn fidelity(&self) -> &Fidelity {
        &self.fidelity
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn start(&self) -> NaiveDate {
        self.range.start
    }

    pub fn end(&self) -> NaiveDate {
        self.range.end
    }

    pub fn file_format(&self) -> FileFormat {
        self.fidelity.file_format()
    }

    /// File name with the extension implied by the fidelity.
    pub fn file_name(&self) -> String {
        format_partition_name(
            &self.ticker,
            &self.fidelity.folder_name(),
            self.range.start,
            self.range.end,
            self.file_format(),
        )
    }

    /// `TICKER/fidelity-folder/<file name>`, relative to the trading history root.
    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(&self.ticker)
            .join(self.fidelity.folder_name())
            .join(self.file_name())
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} @ {} [{}]", self.ticker, self.fidelity, self.range)
    }
}

fn validate_ticker(ticker: &str) -> Result<(), PartitionError> {
    if ticker.is_empty()
        || ticker.contains('_')
        || ticker.contains('/')
        || ticker.contains('\\')
        || ticker.trim() != ticker
    {
        return Err(PartitionError::InvalidTicker(ticker.to_string()));
    }
    Ok(())
}

/// A partition file name split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionName {
    pub ticker: String,
    /// Hyphenated folder form of the fidelity.
    pub fidelity_folder: String,
    pub range_start: NaiveDate,
    pub range_end: NaiveDate,
    pub format: FileFormat,
}

impl PartitionName {
    pub fn fidelity(&self) -> Result<Fidelity, FidelityError> {
        Fidelity::from_folder_name(&self.fidelity_folder)
    }

    pub fn to_file_name(&self) -> String {
        format_partition_name(
            &self.ticker,
            &self.fidelity_folder,
            self.range_start,
            self.range_end,
            self.format,
        )
    }
}

/// Build a partition file name from its parts.
pub fn format_partition_name(
    ticker: &str,
    fidelity_folder: &str,
    start: NaiveDate,
    end: NaiveDate,
    format: FileFormat,
) -> String {
    format!(
        "{ticker}_{fidelity_folder}_{}_to_{}.{}",
        start.format(DATE_FORMAT),
        end.format(DATE_FORMAT),
        format.extension()
    )
}

/// Whether `file_name` has the shape of a partition file.
///
/// Only the shape is checked; the dates are not validated here.
pub fn is_partition_file_name(file_name: &str) -> bool {
    PARTITION_FILE_RE.is_match(file_name)
}

/// Parse a partition file name.
///
/// A name with the right shape but an impossible date (`2024-13-45`) is an
/// error rather than a non-match.
pub fn parse_partition_name(file_name: &str) -> Result<PartitionName, PartitionError> {
    let caps = PARTITION_FILE_RE
        .captures(file_name)
        .ok_or_else(|| PartitionError::NotAPartition(file_name.to_string()))?;

    let parse_date = |text: &str| {
        NaiveDate::parse_from_str(text, DATE_FORMAT).map_err(|_| PartitionError::InvalidDate {
            file_name: file_name.to_string(),
            date: text.to_string(),
        })
    };

    let format = FileFormat::from_extension(&caps[5])
        .ok_or_else(|| PartitionError::NotAPartition(file_name.to_string()))?;

    Ok(PartitionName {
        ticker: caps[1].to_string(),
        fidelity_folder: caps[2].to_string(),
        range_start: parse_date(&caps[3])?,
        range_end: parse_date(&caps[4])?,
        format,
    })
}

/// `TICKER_FIDELITY-FOLDER_DEBUG.csv`, the human-readable sample kept next to
/// a job's Parquet partitions.
pub fn debug_sample_file_name(ticker: &str, fidelity: &Fidelity) -> String {
    format!("{ticker}_{}_DEBUG.csv", fidelity.folder_name())
}
