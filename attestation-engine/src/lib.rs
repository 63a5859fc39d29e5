//! Attestation Engine
//!
//! Attests daily device-alarm summaries on an EVM ledger for tamper-evident
//! audit.
//!
//! # Architecture
//!
//! A daily run flows through four stages:
//!
//! 1. **Fetch**: read per-device alarm aggregates for the day
//! 2. **Hash**: stamp each aggregate with a SHA-256 integrity digest
//! 3. **Submit**: encode a `registrarAlarmaDiaria` call and broadcast it,
//!    one record per transaction, sequentially per signer
//! 4. **Persist**: store the attestation record and its PENDING transaction
//!
//! Confirmation is decoupled from submission: a periodic reconciler polls
//! each pending transaction and moves it to CONFIRMED, FAILED or TIMEOUT.
//! A network monitor records endpoint health alongside.
//!
//! # Example
//!
//! ```no_run
//! use attestation_engine::{AttestationService, Config};
//!
//! #[tokio::main]
//! async fn main() -> attestation_engine::Result<()> {
//!     let config = Config::from_env()?;
//!     let service = AttestationService::connect(&config).await?;
//!
//!     let result = service.run_batch(None).await;
//!     println!("{}: {}/{} attested", result.status, result.succeeded, result.total);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod contract;
pub mod error;
pub mod hasher;
pub mod monitor;
pub mod orchestrator;
pub mod reconciler;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod source;
pub mod telemetry;
pub mod types;

// Re-exports
pub use config::Config;
pub use contract::{AlarmRegistry, DailyAlarmCall};
pub use error::{Error, Result};
pub use monitor::NetworkMonitor;
pub use orchestrator::{partition, BatchOrchestrator, BatchPhase, RecordOutcome};
pub use reconciler::Reconciler;
pub use repository::{AttestationRepository, PgRepository};
pub use scheduler::AttestationScheduler;
pub use service::{AttestationService, MonitoringReport};
pub use source::{PgSummarySource, SummarySource};
pub use types::*;
