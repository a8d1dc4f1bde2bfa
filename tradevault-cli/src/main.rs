//! TradeVault CLI — maintenance commands for the market-data store.
//!
//! Commands:
//! - `download` — fetch every target job's history in monthly partitions
//! - `repair-major` / `repair-minor` — validate the tree and fix gaps
//! - `detect-anomalies` — write a review report of suspiciously small files
//! - `review-repair` — re-fetch the rows of the latest review report
//! - `integrity-check` — tick-data coverage and gap report
//! - `liquidity-screen` — tick-data liquidity tiers
//! - `fetch-filings` — SEC filing sections as yearly JSONL
//! - `fetch-corporate-actions` — IPOs, splits, dividends and ticker events

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use tradevault_core::config::{credential, AppConfig, FILINGS_KEY_VAR, MARKET_DATA_KEY_VAR};
use tradevault_core::data::{load_targets, PolygonClient};
use tradevault_core::error_log::{ErrorLog, FlushGuard};
use tradevault_core::gaps::RepairMode;
use tradevault_core::sec::{load_filing_targets, SecApiClient};
use tradevault_runner::scheduler::POLARS_MAX_THREADS;
use tradevault_runner::workflows::{corporate_actions, download, repair, review_repair};
use tradevault_runner::{
    run_anomaly_report, run_corporate_actions, run_download, run_filings_fetch,
    run_integrity_check, run_liquidity_screen, run_repair, run_review_repair, RunContext,
};

#[derive(Parser)]
#[command(
    name = "tradevault",
    about = "TradeVault CLI — partitioned market-data store maintenance"
)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(long, global = true, default_value = "config.toml")]
    config: PathBuf,

    /// Treat this date (YYYY-MM-DD) as today. Defaults to the local date.
    #[arg(long, global = true)]
    today: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download every job in the stock targets file.
    Download,
    /// Rebuild any job with a missing month from scratch.
    RepairMajor,
    /// Fetch only the missing months of each job.
    RepairMinor,
    /// Report partitions much smaller than their neighbors.
    DetectAnomalies,
    /// Delete and re-fetch the rows of the latest review report.
    ReviewRepair,
    /// Coverage and gap report over tick data.
    IntegrityCheck,
    /// Liquidity tiers over the last two years of tick data.
    LiquidityScreen,
    /// Fetch SEC filing sections for the filings targets file.
    FetchFilings,
    /// Fetch IPOs, splits, dividends and ticker events for the stock targets.
    FetchCorporateActions,
}

fn main() -> ExitCode {
    // Engine threads per analytics worker; must be set before the engine starts.
    std::env::set_var("POLARS_MAX_THREADS", POLARS_MAX_THREADS.to_string());
    let _ = dotenv::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("command failed: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::from_file(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let cancel = install_interrupt_handler();
    let mut ctx = RunContext::new(&config, cancel);
    if let Some(raw) = cli.today.as_deref() {
        let today = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .with_context(|| format!("invalid --today '{raw}'"))?;
        ctx = ctx.with_today(today);
    }
    info!(
        base = %ctx.layout.base().display(),
        today = %ctx.today,
        workers = ctx.max_concurrent_requests,
        "tradevault starting"
    );

    match cli.command {
        Commands::Download => cmd_download(&ctx, &config),
        Commands::RepairMajor => cmd_repair(&ctx, RepairMode::Major),
        Commands::RepairMinor => cmd_repair(&ctx, RepairMode::Minor),
        Commands::DetectAnomalies => cmd_detect_anomalies(&ctx),
        Commands::ReviewRepair => cmd_review_repair(&ctx),
        Commands::IntegrityCheck => cmd_integrity_check(&ctx),
        Commands::LiquidityScreen => cmd_liquidity_screen(&ctx),
        Commands::FetchFilings => cmd_fetch_filings(&ctx, &config),
        Commands::FetchCorporateActions => cmd_fetch_corporate_actions(&ctx, &config),
    }
}

/// Ctrl-C sets the returned flag. Workers stop picking up new chunks; the
/// error log is still flushed on the way out.
fn install_interrupt_handler() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    let spawned = std::thread::Builder::new()
        .name("tradevault-signal".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => {
                    warn!(error = %e, "interrupt handler unavailable");
                    return;
                }
            };
            runtime.block_on(async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, finishing in-flight work");
                    flag.store(true, Ordering::SeqCst);
                }
            });
        });
    if let Err(e) = spawned {
        warn!(error = %e, "could not start interrupt handler thread");
    }
    cancel
}

fn market_data_client() -> Result<PolygonClient> {
    let key = credential(MARKET_DATA_KEY_VAR)?;
    Ok(PolygonClient::new(key)?)
}

/// Error log for `script_name`, flushed to the shared CSV when the guard drops.
fn error_log(ctx: &RunContext, script_name: &str) -> (Arc<ErrorLog>, Option<FlushGuard>) {
    let log = ErrorLog::new(script_name);
    let guard = log.register_flush(ctx.layout.error_log_path());
    (log, guard)
}

fn warn_if_interrupted(ctx: &RunContext) {
    if ctx.cancel.load(Ordering::SeqCst) {
        warn!("run was interrupted; results are partial");
    }
}

fn cmd_download(ctx: &RunContext, config: &AppConfig) -> Result<()> {
    let targets_path: &Path = config.stock_targets_csv()?;
    let targets = load_targets(targets_path)?;
    if targets.is_empty() {
        warn!(path = %targets_path.display(), "no valid targets, nothing to download");
        return Ok(());
    }
    let provider = market_data_client()?;
    let (log, _flush) = error_log(ctx, download::SCRIPT_NAME);

    let summary = run_download(ctx, &provider, &targets, &log)?;
    info!(
        written = summary.written,
        empty = summary.empty,
        failed = summary.failed,
        errors = log.len(),
        "download finished"
    );
    warn_if_interrupted(ctx);
    Ok(())
}

fn cmd_repair(ctx: &RunContext, mode: RepairMode) -> Result<()> {
    let provider = market_data_client()?;
    let (log, _flush) = error_log(ctx, repair::script_name(mode));

    let report = run_repair(ctx, &provider, mode, &log)?;
    info!(
        checked = report.jobs_checked,
        repaired = report.incomplete,
        deleted = report.files_deleted,
        written = report.downloads.written,
        failed = report.downloads.failed,
        "repair finished"
    );
    warn_if_interrupted(ctx);
    Ok(())
}

fn cmd_detect_anomalies(ctx: &RunContext) -> Result<()> {
    let report = run_anomaly_report(ctx)?;
    match report.path {
        Some(path) => info!(
            flagged = report.records.len(),
            path = %path.display(),
            "review the report; put any value in an 'ignore' column to keep a file"
        ),
        None => info!("no file-size anomalies found"),
    }
    Ok(())
}

fn cmd_review_repair(ctx: &RunContext) -> Result<()> {
    let provider = market_data_client()?;
    let (log, _flush) = error_log(ctx, review_repair::SCRIPT_NAME);

    let report = run_review_repair(ctx, &provider, &log)?;
    info!(
        rows = report.rows,
        ignored = report.ignored,
        deleted = report.deleted,
        written = report.downloads.written,
        "review repair finished"
    );
    warn_if_interrupted(ctx);
    Ok(())
}

fn cmd_integrity_check(ctx: &RunContext) -> Result<()> {
    let run = run_integrity_check(ctx)?;
    if run.aborted {
        warn!("integrity check stopped early after a worker failure");
    }
    info!(tickers = run.rows.len(), "integrity check finished");
    Ok(())
}

fn cmd_liquidity_screen(ctx: &RunContext) -> Result<()> {
    let run = run_liquidity_screen(ctx)?;
    if run.aborted {
        warn!("liquidity screen stopped early after a worker failure");
    }
    info!(tickers = run.rows.len(), "liquidity screen finished");
    Ok(())
}

fn cmd_fetch_filings(ctx: &RunContext, config: &AppConfig) -> Result<()> {
    let targets_path = config.filings_targets_csv()?;
    let targets = load_filing_targets(targets_path)?;
    if targets.is_empty() {
        warn!(path = %targets_path.display(), "no valid filings targets");
        return Ok(());
    }
    let client = SecApiClient::new(credential(FILINGS_KEY_VAR)?)?;

    let report = run_filings_fetch(ctx, &client, &client, &targets)?;
    info!(
        targets = report.targets,
        filings = report.unique,
        records = report.records_written,
        failed = report.failed_filings,
        "filings fetch finished"
    );
    warn_if_interrupted(ctx);
    Ok(())
}

fn cmd_fetch_corporate_actions(ctx: &RunContext, config: &AppConfig) -> Result<()> {
    let targets_path = config.stock_targets_csv()?;
    let targets = load_targets(targets_path)?;
    if targets.is_empty() {
        warn!(path = %targets_path.display(), "no valid targets, nothing to fetch");
        return Ok(());
    }
    let client = market_data_client()?;
    let (log, _flush) = error_log(ctx, corporate_actions::SCRIPT_NAME);

    let report = run_corporate_actions(ctx, &client, &targets, &log)?;
    info!(
        tickers = report.tickers,
        files = report.files_written,
        records = report.records_written,
        failed = report.failed,
        "corporate actions fetch finished"
    );
    warn_if_interrupted(ctx);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn subcommands_use_kebab_case() {
        let cli = Cli::try_parse_from(["tradevault", "repair-major"]).unwrap();
        assert!(matches!(cli.command, Commands::RepairMajor));
        assert_eq!(cli.config, PathBuf::from("config.toml"));

        let cli = Cli::try_parse_from([
            "tradevault",
            "liquidity-screen",
            "--config",
            "/etc/tv.toml",
            "--today",
            "2024-06-30",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::LiquidityScreen));
        assert_eq!(cli.config, PathBuf::from("/etc/tv.toml"));
        assert_eq!(cli.today.as_deref(), Some("2024-06-30"));
    }

    #[test]
    fn corporate_actions_subcommand() {
        let cli = Cli::try_parse_from(["tradevault", "fetch-corporate-actions"]).unwrap();
        assert!(matches!(cli.command, Commands::FetchCorporateActions));
    }

    #[test]
    fn unknown_command_rejected() {
        assert!(Cli::try_parse_from(["tradevault", "compact"]).is_err());
    }
}
