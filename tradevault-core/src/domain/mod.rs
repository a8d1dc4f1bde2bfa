//! Domain types for the partitioned trading-history store

pub mod fidelity;
pub mod partition;

pub use fidelity::{Fidelity, FidelityError, FileFormat, Resolution, Timespan};
pub use partition::{
    debug_sample_file_name, format_partition_name, is_partition_file_name, parse_partition_name,
    DateRange, PartitionError, PartitionKey, PartitionName,
};

/// Ticker symbol alias
pub type Ticker = String;

/// A download job: one ticker at one fidelity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobKey {
    pub ticker: Ticker,
    pub fidelity: Fidelity,
}

impl JobKey {
    pub fn new(ticker: impl Into<Ticker>, fidelity: Fidelity) -> Self {
        Self {
            ticker: ticker.into(),
            fidelity,
        }
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {}", self.ticker, self.fidelity)
    }
}
