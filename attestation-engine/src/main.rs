//! Attestation processor entry point

use anyhow::Context;
use attestation_engine::scheduler::AttestationScheduler;
use attestation_engine::service::{check_database, AttestationService};
use attestation_engine::{telemetry, BatchStatus, Config};
use chrono::NaiveDate;
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Run one batch and exit
    Manual,
    /// Run one reconciliation + health sweep and exit
    Monitor,
    /// Run forever on the configured cadences
    Scheduler,
}

#[derive(Debug, Parser)]
#[command(name = "attestation-processor")]
#[command(about = "Attests daily device alarm summaries on an EVM ledger")]
#[command(version)]
struct Cli {
    /// Execution mode
    #[arg(long, value_enum, default_value_t = Mode::Scheduler)]
    mode: Mode,

    /// Day to attest (YYYY-MM-DD), manual mode only; defaults to yesterday
    #[arg(long)]
    date: Option<String>,

    /// Only check database connectivity
    #[arg(long)]
    check_db: bool,

    /// TOML configuration file; environment variables are used when omitted
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::FAILURE,
            };
        }
    };

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = telemetry::init(&config.logging) {
        eprintln!("Logging setup failed: {}", e);
        return ExitCode::FAILURE;
    }

    match run(cli, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Attestation processor failed");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("reading {}", path.display())),
        None => Config::from_env().context("reading environment"),
    }
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<bool> {
    if cli.check_db {
        let reachable = check_database(&config.database)
            .await
            .context("connecting to database")?;
        if reachable {
            info!("Database connection OK");
        } else {
            error!("Database connection failed");
        }
        return Ok(reachable);
    }

    let date = match cli.date.as_deref().map(parse_date).transpose() {
        Ok(date) => date,
        Err(e) => {
            error!(error = %e, "Invalid date format");
            return Ok(false);
        }
    };

    info!(mode = ?cli.mode, network = %config.ledger.network, "Starting attestation processor");

    let service = AttestationService::connect(&config)
        .await
        .context("initializing service")?;

    match cli.mode {
        Mode::Manual => {
            let result = service.run_batch(date).await;
            info!(
                batch_id = %result.batch_id,
                status = %result.status,
                total = result.total,
                succeeded = result.succeeded,
                failed = result.failed,
                success_rate = result.success_rate(),
                "Manual run finished"
            );
            Ok(result.status == BatchStatus::Completed)
        }
        Mode::Monitor => {
            let report = service.run_monitoring().await;
            info!(
                checked = report.reconciliation.checked,
                confirmed = report.reconciliation.confirmed,
                failed = report.reconciliation.failed,
                timed_out = report.reconciliation.timed_out,
                still_pending = report.reconciliation.still_pending,
                network_status = report.health.status.as_str(),
                "Monitoring sweep finished"
            );
            Ok(true)
        }
        Mode::Scheduler => {
            let scheduler = AttestationScheduler::new(Arc::new(service), config.schedule.clone());
            scheduler
                .run_until_shutdown()
                .await
                .context("running scheduler")?;
            Ok(true)
        }
    }
}

/// Parse a `YYYY-MM-DD` day
fn parse_date(value: &str) -> anyhow::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD, got {:?}", value))
}
