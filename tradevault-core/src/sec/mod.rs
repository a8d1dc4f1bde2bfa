//! SEC filings: discovery, section extraction and JSONL storage.

pub mod client;
pub mod extract;
pub mod sections;
pub mod store;
pub mod targets;

pub use client::{FilingMeta, SecApiClient};
pub use extract::{dedupe_filings, extract_filing, DiscoveredFiling, FilingSearch, SectionSource};
pub use store::{append_records, FilingRecord, StoreError};
pub use targets::{load_filing_targets, FilingTarget};
