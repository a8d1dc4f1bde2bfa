//! TradeVault Runner — the maintenance workflows.
//!
//! This crate builds on `tradevault-core` to provide:
//! - Bounded worker pools with batch-level panic containment
//! - Trading-history download and major/minor repair
//! - File-size anomaly report and review-driven repair
//! - Tick integrity check and liquidity screen
//! - SEC filings fetch and corporate-actions fetch
//! - Terminal progress bars and CSV report output

pub mod progress;
pub mod reports;
pub mod scheduler;
pub mod workflows;

pub use progress::{task_bar, BarProgress};
pub use reports::write_csv_report;
pub use scheduler::{run_in_batches, BatchLimits, BatchReport, SchedulerError, TaskOutcome};
pub use workflows::anomalies::{run_anomaly_report, AnomalyReport};
pub use workflows::corporate_actions::{run_corporate_actions, CorporateActionsReport};
pub use workflows::download::run_download;
pub use workflows::filings::{run_filings_fetch, FilingsReport};
pub use workflows::integrity::{run_integrity_check, IntegrityRun};
pub use workflows::liquidity::{run_liquidity_screen, LiquidityRun};
pub use workflows::repair::{run_repair, RepairReport};
pub use workflows::review_repair::{run_review_repair, ReviewRepairReport};
pub use workflows::{execute_requests, execute_requests_with, RunContext};
