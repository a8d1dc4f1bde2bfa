//! Market-data REST client (Polygon-style API).
//!
//! - Aggregates: `GET /v2/aggs/ticker/{T}/range/{mult}/{timespan}/{from_ms}/{to_ms}`
//!   with `adjusted=true&sort=asc&limit=50000`. A full page means there may
//!   be more; the next request starts at the last bar's `t + 1`.
//! - Trades: `GET /v3/trades/{T}` bounded by `timestamp.gte` / `timestamp.lte`,
//!   paginated by following `next_url` with the API key re-appended.
//! - Corporate actions: `GET /v3/reference/{ipo,splits,dividends,ticker-events}`
//!   filtered by ticker and a per-kind date field, paged the same way.
//!
//! Every request is paced by a fixed sleep and wrapped in the retry policy.

use super::corporate_actions::{ActionRecord, CorporateAction, CorporateActionsSource};
use super::provider::{DataError, MarketDataProvider};
use super::records::{AggregateBar, MarketRecords, Trade};
use super::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::domain::{Fidelity, Resolution, Timespan};
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.polygon.io";
pub const PAGE_LIMIT: usize = 50_000;
pub const DEFAULT_REQUEST_PACING: Duration = Duration::from_millis(100);

#[derive(Debug, Deserialize)]
struct AggregatesResponse {
    #[serde(default)]
    results: Option<Vec<AggregateBar>>,
}

#[derive(Debug, Deserialize)]
struct ReferenceResponse {
    #[serde(default)]
    results: Option<serde_json::Value>,
    #[serde(default)]
    next_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TradesResponse {
    #[serde(default)]
    results: Option<Vec<Trade>>,
    #[serde(default)]
    next_url: Option<String>,
}

/// Blocking REST client for aggregates and trades.
pub struct PolygonClient {
    http: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
    pacing: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl PolygonClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self, DataError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            retry: RetryPolicy::default(),
            pacing: DEFAULT_REQUEST_PACING,
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

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// One GET, status classified into a [`DataError`].
    fn get_json_once<T: DeserializeOwned>(&self, url: &str) -> Result<T, DataError> {
        let resp = self.http.get(url).send()?;
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

        resp.json::<T>()
            .map_err(|e| DataError::ResponseFormatChanged(e.to_string()))
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, DataError> {
        self.sleeper.sleep(self.pacing);
        self.retry
            .run(self.sleeper.as_ref(), || self.get_json_once::<T>(url))
    }

    /// All aggregate bars for `[start, end]`.
    pub fn fetch_aggregates(
        &self,
        ticker: &str,
        multiplier: u32,
        timespan: Timespan,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<AggregateBar>, DataError> {
        let (mut current_from, to_ms) = aggregate_window_ms(start, end);
        let mut bars = Vec::new();
        let mut page = 1;

        while current_from <= to_ms {
            let url = aggregates_url(
                &self.base_url,
                ticker,
                multiplier,
                timespan,
                current_from,
                to_ms,
                &self.api_key,
            );
            let resp: AggregatesResponse = self.get_json(&url)?;
            let results = resp.results.unwrap_or_default();
            if results.is_empty() {
                break;
            }

            let full_page = results.len() >= PAGE_LIMIT;
            let last_t = results.last().map(|b| b.t).unwrap_or(to_ms);
            bars.extend(results);
            debug!(ticker, page, total = bars.len(), "aggregates page");

            if !full_page {
                break;
            }
            current_from = last_t + 1;
            page += 1;
        }

        Ok(bars)
    }

    /// All trades for `[start, end]`.
    pub fn fetch_trades(
        &self,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Trade>, DataError> {
        let mut url = Some(trades_url(&self.base_url, ticker, start, end, &self.api_key));
        let mut trades = Vec::new();
        let mut page = 1;

        while let Some(current) = url.take() {
            let resp: TradesResponse = self.get_json(&current)?;
            trades.extend(resp.results.unwrap_or_default());
            debug!(ticker, page, total = trades.len(), "trades page");

            url = resp
                .next_url
                .filter(|u| !u.is_empty())
                .map(|u| with_api_key(&u, &self.api_key));
            page += 1;
        }

        Ok(trades)
    }

    /// Every record of one corporate-action kind for `ticker` dated in
    /// `[start, end]`.
    pub fn fetch_corporate_actions(
        &self,
        action: CorporateAction,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ActionRecord>, DataError> {
        let mut url = Some(corporate_actions_url(&self.base_url, action, ticker, start, end, &self.api_key));
        let mut records = Vec::new();
        let mut page = 1;

        while let Some(current) = url.take() {
            let resp: ReferenceResponse = self.get_json(&current)?;
            records.extend(reference_records(resp.results));
            debug!(ticker, action = action.name(), page, total = records.len(), "reference page");

            url = resp
                .next_url
                .filter(|u| !u.is_empty())
                .map(|u| with_api_key(&u, &self.api_key));
            page += 1;
        }

        Ok(records)
    }
}

/// Reference endpoints answer with a list of objects, or a single object
/// for some kinds. Anything else carries no records.
fn reference_records(results: Option<serde_json::Value>) -> Vec<ActionRecord> {
    match results {
        Some(serde_json::Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match item {
                serde_json::Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        Some(serde_json::Value::Object(map)) => vec![map],
        _ => Vec::new(),
    }
}

impl CorporateActionsSource for PolygonClient {
    fn fetch_actions(
        &self,
        action: CorporateAction,
        ticker: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<ActionRecord>, DataError> {
        self.fetch_corporate_actions(action, ticker, start, end)
    }
}

impl MarketDataProvider for PolygonClient {
    fn name(&self) -> &str {
        "polygon"
    }

    fn fetch(
        &self,
        ticker: &str,
        fidelity: &Fidelity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MarketRecords, DataError> {
        match fidelity.resolution() {
            Resolution::Tick => self.fetch_trades(ticker, start, end).map(MarketRecords::Trades),
            Resolution::Aggregate {
                multiplier,
                timespan,
            } => self
                .fetch_aggregates(ticker, multiplier, timespan, start, end)
                .map(MarketRecords::Bars),
        }
    }
}

// ── URL helpers ─────────────────────────────────────────────────────

/// Midnight UTC at the start of `date`, in Unix milliseconds.
pub fn day_start_ms(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

/// Last millisecond of `date` (UTC).
pub fn day_end_ms(date: NaiveDate) -> i64 {
    date.and_hms_milli_opt(23, 59, 59, 999)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

/// `from`/`to` bounds for an aggregates request over `[start, end]`: whole
/// UTC days, `to` being the last millisecond of `end`. Windows of adjacent
/// chunks meet without overlap, and the final day's regular session is
/// inside the window.
pub fn aggregate_window_ms(start: NaiveDate, end: NaiveDate) -> (i64, i64) {
    (day_start_ms(start), day_end_ms(end))
}

pub fn aggregates_url(
    base_url: &str,
    ticker: &str,
    multiplier: u32,
    timespan: Timespan,
    from_ms: i64,
    to_ms: i64,
    api_key: &str,
) -> String {
    format!(
        "{base_url}/v2/aggs/ticker/{ticker}/range/{multiplier}/{}/{from_ms}/{to_ms}\
         ?adjusted=true&sort=asc&limit={PAGE_LIMIT}&apiKey={api_key}",
        timespan.as_api_str()
    )
}

pub fn trades_url(
    base_url: &str,
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
    api_key: &str,
) -> String {
    format!(
        "{base_url}/v3/trades/{ticker}\
         ?timestamp.gte={start}T00:00:00Z&timestamp.lte={end}T23:59:59Z\
         &limit={PAGE_LIMIT}&apiKey={api_key}"
    )
}

pub fn corporate_actions_url(
    base_url: &str,
    action: CorporateAction,
    ticker: &str,
    start: NaiveDate,
    end: NaiveDate,
    api_key: &str,
) -> String {
    let field = action.date_field();
    format!(
        "{base_url}{}?ticker={ticker}&{field}.gte={start}&{field}.lte={end}\
         &limit={}&apiKey={api_key}",
        action.endpoint(),
        CorporateAction::PAGE_LIMIT
    )
}

/// Append the API key to a `next_url` returned by the provider.
pub fn with_api_key(next_url: &str, api_key: &str) -> String {
    let sep = if next_url.contains('?') { '&' } else { '?' };
    format!("{next_url}{sep}apiKey={api_key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn day_bounds_in_ms() {
        assert_eq!(day_start_ms(d(2024, 1, 1)), 1_704_067_200_000);
        assert_eq!(day_end_ms(d(2024, 1, 1)), 1_704_067_200_000 + 86_400_000 - 1);
    }

    #[test]
    fn aggregate_windows_tile_utc_days() {
        let (from, to) = aggregate_window_ms(d(2024, 1, 2), d(2024, 1, 31));
        assert_eq!(from, day_start_ms(d(2024, 1, 2)));
        // 2024-01-31T20:59:00Z, the 15:59 New York minute bar.
        assert!(1_706_734_740_000 <= to);

        let (next_from, _) = aggregate_window_ms(d(2024, 2, 1), d(2024, 2, 29));
        assert_eq!(to + 1, next_from);
    }

    #[test]
    fn builds_aggregates_url() {
        let url = aggregates_url(
            DEFAULT_BASE_URL,
            "ABC",
            5,
            Timespan::Minute,
            1,
            2,
            "KEY",
        );
        assert_eq!(
            url,
            "https://api.polygon.io/v2/aggs/ticker/ABC/range/5/minute/1/2\
             ?adjusted=true&sort=asc&limit=50000&apiKey=KEY"
        );
    }

    #[test]
    fn builds_trades_url() {
        let url = trades_url("http://x", "ABC", d(2024, 1, 1), d(2024, 1, 31), "KEY");
        assert_eq!(
            url,
            "http://x/v3/trades/ABC?timestamp.gte=2024-01-01T00:00:00Z\
             &timestamp.lte=2024-01-31T23:59:59Z&limit=50000&apiKey=KEY"
        );
    }

    #[test]
    fn builds_corporate_action_urls() {
        let url = corporate_actions_url("http://x", CorporateAction::Dividends, "ABC", d(2023, 6, 1), d(2024, 6, 1), "K");
        assert_eq!(
            url,
            "http://x/v3/reference/dividends?ticker=ABC&ex_dividend_date.gte=2023-06-01\
             &ex_dividend_date.lte=2024-06-01&limit=1000&apiKey=K"
        );
        let url = corporate_actions_url("http://x", CorporateAction::TickerEvents, "ABC", d(2024, 1, 1), d(2024, 2, 1), "K");
        assert!(url.starts_with("http://x/v3/reference/ticker-events?ticker=ABC&date.gte=2024-01-01&date.lte=2024-02-01"));
    }

    #[test]
    fn reference_results_as_list_or_object() {
        let page: ReferenceResponse = serde_json::from_str(
            r#"{"results":[{"ticker":"ABC","split_from":1,"split_to":4},7],"next_url":"http://x?cursor=2"}"#,
        )
        .unwrap();
        assert_eq!(page.next_url.as_deref(), Some("http://x?cursor=2"));
        let records = reference_records(page.results);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["split_to"], 4);

        let single: ReferenceResponse =
            serde_json::from_str(r#"{"results":{"name":"ABC Corp","events":[]}}"#).unwrap();
        assert_eq!(reference_records(single.results).len(), 1);

        let none: ReferenceResponse = serde_json::from_str(r#"{"status":"OK"}"#).unwrap();
        assert!(reference_records(none.results).is_empty());
    }

    #[test]
    fn next_url_gets_key() {
        assert_eq!(
            with_api_key("https://api.polygon.io/v3/trades/ABC?cursor=abc", "K"),
            "https://api.polygon.io/v3/trades/ABC?cursor=abc&apiKey=K"
        );
        assert_eq!(with_api_key("http://x/next", "K"), "http://x/next?apiKey=K");
    }

    #[test]
    fn parses_pages() {
        let aggs: AggregatesResponse = serde_json::from_str(
            r#"{"ticker":"ABC","status":"OK","results":[{"v":1,"vw":1.5,"o":1,"c":2,"h":2,"l":1,"t":10,"n":3}]}"#,
        )
        .unwrap();
        assert_eq!(aggs.results.unwrap()[0].t, 10);

        let empty: AggregatesResponse = serde_json::from_str(r#"{"status":"OK","resultsCount":0}"#).unwrap();
        assert!(empty.results.is_none());

        let trades: TradesResponse = serde_json::from_str(
            r#"{"results":[{"sip_timestamp":5,"price":1.0,"size":2}],"next_url":"http://x?cursor=1"}"#,
        )
        .unwrap();
        assert_eq!(trades.results.unwrap().len(), 1);
        assert_eq!(trades.next_url.as_deref(), Some("http://x?cursor=1"));
    }
}
