//! Turning discovered filings into section records.

use super::client::{FilingMeta, SecApiClient, SECTION_PACING, TICKER_PACING};
use super::sections::{clean_section, sections_for_filing};
use super::store::{base_record, FilingRecord};
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{debug, warn};

/// A discovered filing tagged with the target it was found for.
#[derive(Debug, Clone)]
pub struct DiscoveredFiling {
    pub ticker: String,
    pub cik_padded: String,
    pub meta: FilingMeta,
}

/// Drop repeats of the same `(accession number, ticker)` and filings without
/// an accession number, keeping the first occurrence.
pub fn dedupe_filings(filings: Vec<DiscoveredFiling>) -> Vec<DiscoveredFiling> {
    let mut seen = HashSet::new();
    filings
        .into_iter()
        .filter(|f| match f.meta.accession_no.as_deref() {
            Some(acc) if !acc.is_empty() => seen.insert((acc.to_string(), f.ticker.clone())),
            _ => false,
        })
        .collect()
}

/// Filing discovery; the live client or a fake in tests.
pub trait FilingSearch: Send + Sync {
    fn discover(&self, ticker: &str, cik_unpadded: &str, today: NaiveDate) -> Vec<FilingMeta>;

    /// Called between targets during sequential discovery.
    fn pause_between_targets(&self) {}
}

impl FilingSearch for SecApiClient {
    fn discover(&self, ticker: &str, cik_unpadded: &str, today: NaiveDate) -> Vec<FilingMeta> {
        self.discover_filings(ticker, cik_unpadded, today)
    }

    fn pause_between_targets(&self) {
        self.sleeper().sleep(TICKER_PACING);
    }
}

/// Source of section text; the live client or a fake in tests.
pub trait SectionSource: Send + Sync {
    fn section_text(&self, filing_url: &str, api_code: &str) -> Option<String>;
}

impl SectionSource for SecApiClient {
    fn section_text(&self, filing_url: &str, api_code: &str) -> Option<String> {
        self.sleeper().sleep(SECTION_PACING);
        match self.extract_section(filing_url, api_code) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(url = filing_url, item = api_code, error = %e, "section extraction failed");
                None
            }
        }
    }
}

/// Extract every relevant section of one filing. Sections that fail or are
/// too short are left out.
pub fn extract_filing(source: &dyn SectionSource, filing: &DiscoveredFiling) -> Vec<FilingRecord> {
    let meta = &filing.meta;
    let Some(url) = meta.source_url() else {
        warn!(accession = ?meta.accession_no, "filing has no document URL, skipping");
        return Vec::new();
    };

    let sections = sections_for_filing(meta.form_type.as_deref().unwrap_or_default(), &meta.items);
    if sections.is_empty() {
        return Vec::new();
    }

    let base = base_record(meta, &filing.ticker, &filing.cik_padded, url);
    let mut records = Vec::new();
    for section in sections {
        let Some(raw) = source.section_text(url, &section.api_code) else {
            continue;
        };
        match clean_section(&raw) {
            Some(text) => records.push(FilingRecord {
                section_id: section.section_id.to_string(),
                text,
                ..base.clone()
            }),
            None => debug!(section = section.section_id, "section too short, dropped"),
        }
    }
    records
}
