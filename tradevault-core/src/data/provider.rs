//! Market-data provider trait and structured error types.
//!
//! The provider trait abstracts over the REST client so download and repair
//! workflows can be driven by a fake in tests.

use super::records::MarketRecords;
use crate::domain::{Fidelity, PartitionKey};
use chrono::NaiveDate;
use thiserror::Error;

/// Structured error types for remote fetches.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider (HTTP 429)")]
    RateLimited,

    #[error("server error: HTTP {status}")]
    ServerError { status: u16 },

    #[error("request rejected: HTTP {status}: {body}")]
    ClientError { status: u16, body: String },

    #[error("authentication failed: {0}")]
    AuthenticationRequired(String),

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<DataError> },

    #[error("cancelled")]
    Cancelled,

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Transient failures worth backing off and retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::NetworkUnreachable(_) | DataError::Timeout(_) | DataError::ServerError { .. }
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, DataError::RateLimited)
    }
}

impl From<reqwest::Error> for DataError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DataError::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            DataError::NetworkUnreachable(e.to_string())
        } else if e.is_decode() {
            DataError::ResponseFormatChanged(e.to_string())
        } else {
            DataError::Other(e.to_string())
        }
    }
}

/// A source of market data.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Fetch everything for `ticker` at `fidelity` over `[start, end]`.
    ///
    /// Tick fidelity yields [`MarketRecords::Trades`], every other fidelity
    /// [`MarketRecords::Bars`].
    fn fetch(
        &self,
        ticker: &str,
        fidelity: &Fidelity,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MarketRecords, DataError>;
}

/// Progress callback for chunked downloads.
pub trait DownloadProgress: Send + Sync {
    /// Called when a chunk fetch starts.
    fn on_start(&self, key: &PartitionKey);

    /// Called when a chunk completes, successfully or not.
    fn on_complete(&self, key: &PartitionKey, result: &Result<usize, String>);

    /// Called once after the last chunk.
    fn on_batch_complete(&self, succeeded: usize, failed: usize, total: usize);
}

/// Progress reporter that says nothing.
pub struct SilentProgress;

impl DownloadProgress for SilentProgress {
    fn on_start(&self, _key: &PartitionKey) {}
    fn on_complete(&self, _key: &PartitionKey, _result: &Result<usize, String>) {}
    fn on_batch_complete(&self, _succeeded: usize, _failed: usize, _total: usize) {}
}
