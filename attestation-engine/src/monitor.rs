//! Network health monitoring

use crate::repository::AttestationRepository;
use crate::types::{EndpointStatus, HealthSnapshot};
use chrono::Utc;
use ledger_client::{units, LedgerClient};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Samples ledger endpoint health and records it
pub struct NetworkMonitor {
    ledger: Arc<dyn LedgerClient>,
    repository: Arc<dyn AttestationRepository>,
    network: String,
}

impl fmt::Debug for NetworkMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkMonitor")
            .field("network", &self.network)
            .finish()
    }
}

impl NetworkMonitor {
    /// Create a monitor for the named network
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        repository: Arc<dyn AttestationRepository>,
        network: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            repository,
            network: network.into(),
        }
    }

    /// Sample the endpoint without persisting
    pub async fn sample(&self) -> HealthSnapshot {
        match self.ledger.network_info().await {
            Ok(info) => {
                let gas_price = self.ledger.recommended_gas_price().await;
                let balance = self.ledger.balance().await;

                let status = if info.is_synced {
                    EndpointStatus::Healthy
                } else {
                    EndpointStatus::Degraded
                };

                HealthSnapshot {
                    network: self.network.clone(),
                    chain_id: Some(info.chain_id),
                    block_number: Some(info.block_number),
                    block_interval_secs: Some(info.block_interval_secs),
                    gas_price_gwei: Some(units::wei_to_gwei(gas_price)),
                    is_synced: info.is_synced,
                    balance_eth: Some(units::wei_to_eth(balance)),
                    status,
                    checked_at: Utc::now(),
                }
            }
            Err(e) => {
                error!(network = %self.network, error = %e, "Ledger endpoint unreachable");
                HealthSnapshot {
                    network: self.network.clone(),
                    chain_id: None,
                    block_number: None,
                    block_interval_secs: None,
                    gas_price_gwei: None,
                    is_synced: false,
                    balance_eth: None,
                    status: EndpointStatus::Down,
                    checked_at: Utc::now(),
                }
            }
        }
    }

    /// Sample and persist a health snapshot
    pub async fn check_health(&self) -> HealthSnapshot {
        let snapshot = self.sample().await;

        if !self.repository.insert_health_snapshot(&snapshot).await {
            warn!(network = %self.network, "Health snapshot not stored");
        }

        match snapshot.status {
            EndpointStatus::Down => {}
            status => info!(
                network = %self.network,
                status = status.as_str(),
                block_number = snapshot.block_number,
                block_interval_secs = snapshot.block_interval_secs,
                gas_price_gwei = snapshot.gas_price_gwei,
                balance_eth = snapshot.balance_eth,
                "Network health checked"
            ),
        }

        snapshot
    }
}
