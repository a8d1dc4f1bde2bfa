//! TradeVault Core — partitioned market-data store and its maintenance logic.
//!
//! This crate contains everything that does not orchestrate threads:
//! - Domain types (fidelity, partition keys, job keys) and the file naming scheme
//! - Catalog scan of the on-disk dataset and coverage inference
//! - Gap detection with major/minor repair planning
//! - File-size anomaly heuristic
//! - Market-data and filings REST clients with an explicit retry policy
//! - Partition writer (CSV / Parquet, atomic) and corporate-action CSVs
//! - Tick analytics: integrity check and liquidity screen

pub mod analytics;
pub mod anomaly;
pub mod calendar;
pub mod catalog;
pub mod config;
pub mod coverage;
pub mod data;
pub mod domain;
pub mod error_log;
pub mod gaps;
pub mod layout;
pub mod sec;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: everything the runner hands to worker threads is
    /// Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Domain
        require_send::<domain::Fidelity>();
        require_sync::<domain::Fidelity>();
        require_send::<domain::PartitionKey>();
        require_sync::<domain::PartitionKey>();
        require_send::<domain::JobKey>();
        require_sync::<domain::JobKey>();

        // Catalog and planning
        require_send::<catalog::CatalogSnapshot>();
        require_sync::<catalog::CatalogSnapshot>();
        require_send::<gaps::RepairPlan>();
        require_sync::<gaps::RepairPlan>();
        require_send::<anomaly::AnomalyRecord>();
        require_sync::<anomaly::AnomalyRecord>();

        // Fetch and write
        require_send::<data::PolygonClient>();
        require_sync::<data::PolygonClient>();
        require_send::<data::PartitionWriter>();
        require_sync::<data::PartitionWriter>();
        require_send::<data::DownloadSummary>();
        require_send::<sec::SecApiClient>();
        require_sync::<sec::SecApiClient>();
        require_send::<error_log::ErrorLog>();
        require_sync::<error_log::ErrorLog>();

        // Analytics rows
        require_send::<analytics::IntegritySummary>();
        require_sync::<analytics::IntegritySummary>();
        require_send::<analytics::LiquidityMetrics>();
        require_sync::<analytics::LiquidityMetrics>();
    }

    /// The provider trait stays object safe; workflows hold `&dyn`.
    #[test]
    fn provider_trait_is_object_safe() {
        fn _takes_provider(_p: &dyn data::MarketDataProvider) {}
        fn _takes_progress(_p: &dyn data::DownloadProgress) {}
        fn _takes_sections(_s: &dyn sec::SectionSource) {}
    }
}
