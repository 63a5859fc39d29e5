//! Service wiring
//!
//! The process entry point owns every collaborator: the ledger client, the
//! aggregation source and the repository are constructed once and shared by
//! handle with the orchestrator, reconciler and monitor.

use crate::config::{Config, DatabaseConfig};
use crate::contract::AlarmRegistry;
use crate::error::Result;
use crate::monitor::NetworkMonitor;
use crate::orchestrator::BatchOrchestrator;
use crate::reconciler::Reconciler;
use crate::repository::{AttestationRepository, PgRepository};
use crate::source::{PgSummarySource, SummarySource};
use crate::types::{BatchResult, HealthSnapshot, ReconciliationSummary};
use chrono::NaiveDate;
use ledger_client::{EthereumClient, LedgerClient};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// Outcome of one monitoring sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitoringReport {
    /// Reconciliation counts
    pub reconciliation: ReconciliationSummary,

    /// Network health at the end of the sweep
    pub health: HealthSnapshot,
}

/// Attestation service: batch runs, reconciliation and health checks
pub struct AttestationService {
    orchestrator: BatchOrchestrator,
    reconciler: Reconciler,
    monitor: NetworkMonitor,
    repository: Arc<dyn AttestationRepository>,
}

impl fmt::Debug for AttestationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttestationService")
            .field("orchestrator", &self.orchestrator)
            .field("reconciler", &self.reconciler)
            .field("monitor", &self.monitor)
            .finish()
    }
}

impl AttestationService {
    /// Validate configuration and connect to the database and ledger
    pub async fn connect(config: &Config) -> Result<Self> {
        config.validate()?;

        let repository = PgRepository::connect(&config.database).await?;
        let source = PgSummarySource::new(repository.pool().clone());
        let ledger = EthereumClient::new(config.client_config())?;

        Self::from_parts(
            config,
            Arc::new(ledger),
            Arc::new(source),
            Arc::new(repository),
        )
    }

    /// Assemble the service from already constructed collaborators
    pub fn from_parts(
        config: &Config,
        ledger: Arc<dyn LedgerClient>,
        source: Arc<dyn SummarySource>,
        repository: Arc<dyn AttestationRepository>,
    ) -> Result<Self> {
        let registry = AlarmRegistry::new(ledger.clone(), config.contract_address()?)
            .with_gas_limit(config.ledger.gas_limit);

        let orchestrator = BatchOrchestrator::new(
            source,
            ledger.clone(),
            repository.clone(),
            registry,
            config.processing.batch_size,
        );
        let reconciler = Reconciler::new(ledger.clone(), repository.clone(), config.pending_timeout());
        let monitor = NetworkMonitor::new(ledger.clone(), repository.clone(), &config.ledger.network);

        info!(
            network = %config.ledger.network,
            signer = %ledger.signer_address(),
            batch_size = config.processing.batch_size,
            "Attestation service ready"
        );

        Ok(Self {
            orchestrator,
            reconciler,
            monitor,
            repository,
        })
    }

    /// Run one batch for `date` (yesterday when `None`)
    pub async fn run_batch(&self, date: Option<NaiveDate>) -> BatchResult {
        self.orchestrator.run(date).await
    }

    /// Reconcile pending transactions, then record network health
    pub async fn run_monitoring(&self) -> MonitoringReport {
        let reconciliation = self.reconciler.reconcile_pending().await;
        let health = self.monitor.check_health().await;

        MonitoringReport {
            reconciliation,
            health,
        }
    }

    /// Record network health
    pub async fn check_health(&self) -> HealthSnapshot {
        self.monitor.check_health().await
    }
}

/// Connect to the database and check it answers
pub async fn check_database(config: &DatabaseConfig) -> Result<bool> {
    let repository = PgRepository::connect(config).await?;
    Ok(repository.ping().await)
}
