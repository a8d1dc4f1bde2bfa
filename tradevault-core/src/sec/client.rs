//! Filings search and section extraction client (sec-api.io).
//!
//! Search is a `POST` of an Elasticsearch-style query string; extraction is a
//! `GET` per (filing URL, item). Both go through the same retry policy as the
//! market-data client.

use crate::data::{DataError, RetryPolicy, Sleeper, ThreadSleeper};
use chrono::{Months, NaiveDate};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.sec-api.io";
pub const PAGE_SIZE: usize = 100;
pub const YEARS_TO_FETCH: u32 = 10;
pub const FORM_TYPES: &[&str] = &["10-K", "10-Q", "8-K", "10-K/A", "10-Q/A", "8-K/A"];

/// Between result pages of one search.
pub const PAGE_PACING: Duration = Duration::from_millis(500);
/// Before each section extraction request.
pub const SECTION_PACING: Duration = Duration::from_millis(200);
/// Between tickers during discovery.
pub const TICKER_PACING: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct FilingEntity {
    #[serde(default)]
    pub cik: Option<String>,
    #[serde(default)]
    pub sic: Option<String>,
}

/// Filing metadata as returned by the search API.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FilingMeta {
    #[serde(default)]
    pub accession_no: Option<String>,
    #[serde(default)]
    pub filed_at: Option<String>,
    #[serde(default)]
    pub period_of_report: Option<String>,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub form_type: Option<String>,
    #[serde(default)]
    pub link_to_filing_details: Option<String>,
    #[serde(default)]
    pub link_to_html: Option<String>,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub entities: Vec<FilingEntity>,
}

impl FilingMeta {
    /// Document the extractor should read.
    pub fn source_url(&self) -> Option<&str> {
        self.link_to_filing_details
            .as_deref()
            .or(self.link_to_html.as_deref())
            .filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    filings: Option<Vec<FilingMeta>>,
}

/// Query string for one company's filings filed within `[start, end]`.
pub fn filings_query(cik_unpadded: &str, start: NaiveDate, end: NaiveDate) -> String {
    let forms = FORM_TYPES
        .iter()
        .map(|f| format!("\"{f}\""))
        .collect::<Vec<_>>()
        .join(" OR ");
    format!(
        "cik:{cik_unpadded} AND formType:({forms}) AND filedAt:[{} TO {}]",
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    )
}

/// Search window ending `today`.
pub fn search_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = today
        .checked_sub_months(Months::new(12 * YEARS_TO_FETCH))
        .unwrap_or(NaiveDate::MIN);
    (start, today)
}

pub fn search_payload(query: &str, from: usize) -> serde_json::Value {
    json!({
        "query": { "query_string": { "query": query } },
        "from": from.to_string(),
        "size": PAGE_SIZE.to_string(),
        "sort": [ { "filedAt": { "order": "desc" } } ],
    })
}

pub struct SecApiClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl SecApiClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, DataError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
            sleeper: Arc::new(ThreadSleeper),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn sleeper(&self) -> &dyn Sleeper {
        self.sleeper.as_ref()
    }

    fn check_status(resp: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, DataError> {
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(DataError::RateLimited);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(DataError::AuthenticationRequired(format!("HTTP {status}")));
        }
        if status.is_server_error() {
            return Err(DataError::ServerError {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body: String = resp.text().unwrap_or_default().chars().take(200).collect();
            return Err(DataError::ClientError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    /// One page of search results.
    pub fn search_page(&self, query: &str, from: usize) -> Result<Vec<FilingMeta>, DataError> {
        let url = format!("{}?token={}", self.base_url, self.api_key);
        let payload = search_payload(query, from);
        self.retry.run(self.sleeper.as_ref(), || {
            let resp = Self::check_status(self.http.post(&url).json(&payload).send()?)?;
            let parsed: SearchResponse = resp
                .json()
                .map_err(|e| DataError::ResponseFormatChanged(e.to_string()))?;
            parsed
                .filings
                .ok_or_else(|| DataError::ResponseFormatChanged("missing 'filings' field".into()))
        })
    }

    /// All filings for one company in the search window, newest first.
    ///
    /// A page that fails after retries ends pagination; what was collected so
    /// far is returned.
    pub fn discover_filings(&self, ticker: &str, cik_unpadded: &str, today: NaiveDate) -> Vec<FilingMeta> {
        let (start, end) = search_window(today);
        let query = filings_query(cik_unpadded, start, end);
        let mut all = Vec::new();
        let mut from = 0;

        loop {
            match self.search_page(&query, from) {
                Ok(page) => {
                    let full = page.len() >= PAGE_SIZE;
                    all.extend(page);
                    if !full {
                        break;
                    }
                    from += PAGE_SIZE;
                    self.sleeper.sleep(PAGE_PACING);
                }
                Err(e) => {
                    warn!(%ticker, from, error = %e, "filings search page failed");
                    break;
                }
            }
        }

        info!(%ticker, filings = all.len(), "discovered filings");
        all
    }

    /// Plain-text body of one section.
    pub fn extract_section(&self, filing_url: &str, item: &str) -> Result<String, DataError> {
        let url = reqwest::Url::parse_with_params(
            &format!("{}/extractor", self.base_url),
            &[
                ("url", filing_url),
                ("item", item),
                ("type", "text"),
                ("token", self.api_key.as_str()),
            ],
        )
        .map_err(|e| DataError::Other(format!("invalid extractor URL: {e}")))?;

        self.retry.run(self.sleeper.as_ref(), || {
            let resp = Self::check_status(self.http.get(url.clone()).send()?)?;
            resp.text()
                .map_err(|e| DataError::ResponseFormatChanged(e.to_string()))
        })
    }
}
