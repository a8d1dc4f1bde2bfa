//! Remote fetch, partition writing, download orchestration and corporate
//! actions

pub mod corporate_actions;
pub mod download;
pub mod polygon;
pub mod provider;
pub mod records;
pub mod retry;
pub mod targets;
pub mod writer;

pub use corporate_actions::{
    save_corporate_actions, ActionRecord, CorporateAction, CorporateActionsSource,
};
pub use download::{download_chunk, download_range, ChunkError, ChunkFailure, DownloadSummary};
pub use polygon::PolygonClient;
pub use provider::{DataError, DownloadProgress, MarketDataProvider, SilentProgress};
pub use records::{AggregateBar, MarketRecords, Trade};
pub use retry::{RecordingSleeper, RetryPolicy, Sleeper, ThreadSleeper};
pub use targets::{load_targets, TargetJob, TargetsError};
pub use writer::{PartitionWriter, WriteError, WriteOutcome, DEBUG_SAMPLE_ROWS};
