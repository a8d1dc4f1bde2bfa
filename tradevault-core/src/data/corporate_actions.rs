//! Corporate actions: IPOs, splits, dividends and ticker events.
//!
//! Records are kept as the provider sends them. Each kind is written to one
//! CSV per ticker and date window; the columns are the union of the record
//! keys in first-seen order, nested values are stored as JSON text.

use super::provider::DataError;
use super::writer::{write_atomic, WriteError};
use crate::layout::DataLayout;
use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One reference record, field order preserved.
pub type ActionRecord = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CorporateAction {
    Ipo,
    Splits,
    Dividends,
    TickerEvents,
}

impl CorporateAction {
    /// Fetch order.
    pub const ALL: [CorporateAction; 4] = [
        CorporateAction::Ipo,
        CorporateAction::Splits,
        CorporateAction::Dividends,
        CorporateAction::TickerEvents,
    ];

    pub const PAGE_LIMIT: usize = 1000;

    /// Folder and file-name form.
    pub fn name(self) -> &'static str {
        match self {
            CorporateAction::Ipo => "ipo",
            CorporateAction::Splits => "splits",
            CorporateAction::Dividends => "dividends",
            CorporateAction::TickerEvents => "ticker_events",
        }
    }

    pub fn endpoint(self) -> &'static str {
        match self {
            CorporateAction::Ipo => "/v3/reference/ipo",
            CorporateAction::Splits => "/v3/reference/splits",
            CorporateAction::Dividends => "/v3/reference/dividends",
            CorporateAction::TickerEvents => "/v3/reference/ticker-events",
        }
    }

    /// Query field the date window applies to.
    pub fn date_field(self) -> &'static str {
        match self {
            CorporateAction::Ipo | CorporateAction::TickerEvents => "date",
            CorporateAction::Splits => "execution_date",
            CorporateAction::Dividends => "ex_dividend_date",
        }
    }
}

impl fmt::Display for CorporateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A source of corporate-action records.
pub trait CorporateActionsSource: Send + Sync {
    fn fetch_actions(
        &self,
        action: CorporateAction,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ActionRecord>, DataError>;
}

/// Union of the record keys, in the order they are first seen.
pub fn action_columns(records: &[ActionRecord]) -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for record in records {
        for key in record.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

/// CSV cell text for a JSON value. Missing and null are empty.
fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn write_action_csv(records: &[ActionRecord], path: &Path) -> Result<(), WriteError> {
    let columns = action_columns(records);
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&columns)?;
    for record in records {
        writer.write_record(columns.iter().map(|c| cell(record.get(c))))?;
    }
    writer.flush().map_err(|source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Write one ticker's records of `action` over `[start, end]`, replacing
/// any earlier file for the same window. Nothing is written for an empty
/// fetch.
pub fn save_corporate_actions(
    layout: &DataLayout,
    action: CorporateAction,
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
    records: &[ActionRecord],
) -> Result<Option<PathBuf>, WriteError> {
    if records.is_empty() {
        return Ok(None);
    }
    let path = layout.corporate_action_path(action.name(), ticker, start, end);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(|source| WriteError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    write_atomic(&path, |tmp| write_action_csv(records, tmp))?;
    debug!(path = %path.display(), rows = records.len(), "corporate actions written");
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(v: Value) -> ActionRecord {
        match v {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn names_and_fields() {
        let names: Vec<_> = CorporateAction::ALL.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["ipo", "splits", "dividends", "ticker_events"]);
        assert_eq!(CorporateAction::Splits.date_field(), "execution_date");
        assert_eq!(CorporateAction::Dividends.date_field(), "ex_dividend_date");
        assert_eq!(CorporateAction::TickerEvents.to_string(), "ticker_events");
    }

    #[test]
    fn columns_union_in_first_seen_order() {
        let records = vec![
            record(json!({"ticker": "ABC", "cash_amount": 0.24})),
            record(json!({"ticker": "ABC", "pay_date": "2024-02-15", "cash_amount": 0.25})),
        ];
        assert_eq!(action_columns(&records), vec!["ticker", "cash_amount", "pay_date"]);
    }

    #[test]
    fn writes_csv_with_json_text_for_nested_values() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let records = vec![
            record(json!({"ticker": "ABC", "split_from": 1, "split_to": 4, "execution_date": "2024-03-01"})),
            record(json!({"ticker": "ABC", "split_from": 1, "split_to": 2, "notes": null, "tags": ["a", "b"]})),
        ];

        let path = save_corporate_actions(&layout, CorporateAction::Splits, "ABC", d(2023, 6, 1), d(2024, 6, 1), &records)
            .unwrap()
            .unwrap();

        assert_eq!(
            path,
            dir.path().join("stocks/corporate_actions/splits/ABC/ABC_splits_2023-06-01_to_2024-06-01.csv")
        );
        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "ticker,split_from,split_to,execution_date,notes,tags");
        assert_eq!(lines[1], "ABC,1,4,2024-03-01,,");
        assert_eq!(lines[2], r#"ABC,1,2,,,"[""a"",""b""]""#);
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn empty_fetch_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let out = save_corporate_actions(&layout, CorporateAction::Ipo, "ABC", d(2024, 1, 1), d(2024, 2, 1), &[]).unwrap();
        assert!(out.is_none());
        assert!(!layout.corporate_actions_dir().exists());
    }
}
