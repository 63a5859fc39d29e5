//! Confirmation reconciliation
//!
//! Brings locally recorded transaction state in line with the ledger. Each
//! pass loads the PENDING transactions and asks the ledger for their
//! point-in-time status. Terminal states are never revisited.

use crate::error::Error;
use crate::repository::AttestationRepository;
use crate::types::*;
use chrono::{DateTime, Utc};
use ledger_client::{units, LedgerClient, TransactionReceipt, TxStatus};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Reconciles pending transactions against chain state
pub struct Reconciler {
    ledger: Arc<dyn LedgerClient>,
    repository: Arc<dyn AttestationRepository>,
    pending_timeout: Duration,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("pending_timeout", &self.pending_timeout)
            .finish()
    }
}

impl Reconciler {
    /// Create a reconciler; transactions pending longer than `pending_timeout` time out
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        repository: Arc<dyn AttestationRepository>,
        pending_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            repository,
            pending_timeout,
        }
    }

    /// Reconcile every pending transaction
    pub async fn reconcile_pending(&self) -> ReconciliationSummary {
        self.reconcile_pending_at(Utc::now()).await
    }

    /// Reconcile with an explicit notion of "now"
    pub async fn reconcile_pending_at(&self, now: DateTime<Utc>) -> ReconciliationSummary {
        let pending = self.repository.list_pending_transactions().await;
        let mut summary = ReconciliationSummary::default();

        info!(count = pending.len(), "Reconciling pending transactions");

        for tx in pending {
            // Only PENDING rows are listed; guard anyway so terminal rows stay put
            if tx.status.is_terminal() {
                continue;
            }
            summary.checked += 1;

            match self.ledger.transaction_status(&tx.tx_id).await {
                TxStatus::Confirmed(receipt) => {
                    if self.confirm(&tx, &receipt).await {
                        summary.confirmed += 1;
                    } else {
                        summary.still_pending += 1;
                    }
                }
                TxStatus::Failed(receipt) => {
                    if self.fail(&tx, &receipt).await {
                        summary.failed += 1;
                    } else {
                        summary.still_pending += 1;
                    }
                }
                TxStatus::Pending => {
                    if self.expired(&tx, now) && self.time_out(&tx).await {
                        summary.timed_out += 1;
                    } else {
                        debug!(tx_hash = %tx.tx_id, "Transaction still pending");
                        summary.still_pending += 1;
                    }
                }
                TxStatus::Error(message) => {
                    warn!(
                        tx_hash = %tx.tx_id,
                        error = %message,
                        "Status lookup failed, leaving transaction pending"
                    );
                    summary.still_pending += 1;
                }
            }
        }

        info!(
            checked = summary.checked,
            confirmed = summary.confirmed,
            failed = summary.failed,
            timed_out = summary.timed_out,
            still_pending = summary.still_pending,
            "Reconciliation finished"
        );

        summary
    }

    fn expired(&self, tx: &LedgerTransaction, now: DateTime<Utc>) -> bool {
        (now - tx.created_at)
            .to_std()
            .map(|age| age >= self.pending_timeout)
            .unwrap_or(false)
    }

    /// Seconds from submission to the mined block's timestamp
    async fn confirmation_latency(&self, tx: &LedgerTransaction, block_number: u64) -> f64 {
        let submitted = tx.created_at.timestamp_millis() as f64 / 1000.0;

        let mined = match self.ledger.block_timestamp(block_number).await {
            Ok(timestamp) => timestamp as f64,
            Err(e) => {
                debug!(block_number, error = %e, "Block timestamp unavailable, using observation time");
                Utc::now().timestamp_millis() as f64 / 1000.0
            }
        };

        (mined - submitted).max(0.0)
    }

    fn fee_eth(tx: &LedgerTransaction, receipt: &TransactionReceipt) -> f64 {
        let fee = receipt
            .fee_wei()
            .unwrap_or_else(|| u128::from(receipt.gas_used).saturating_mul(tx.gas_price));
        units::wei_to_eth(fee)
    }

    async fn confirm(&self, tx: &LedgerTransaction, receipt: &TransactionReceipt) -> bool {
        let latency = self.confirmation_latency(tx, receipt.block_number).await;

        let update = TransactionUpdate {
            block_number: Some(receipt.block_number),
            gas_used: Some(receipt.gas_used),
            gas_cost_native: Some(Self::fee_eth(tx, receipt)),
            confirmation_seconds: Some(latency),
            ..TransactionUpdate::status(TransactionStatus::Confirmed)
        };

        if !self.repository.update_transaction_status(&tx.tx_id, &update).await {
            return false;
        }

        if !self.repository.mark_attestation_verified(&tx.tx_id).await {
            warn!(tx_hash = %tx.tx_id, "No attestation record to verify");
        }

        info!(
            tx_hash = %tx.tx_id,
            block_number = receipt.block_number,
            gas_used = receipt.gas_used,
            confirmation_secs = latency,
            "Transaction confirmed"
        );
        true
    }

    async fn fail(&self, tx: &LedgerTransaction, receipt: &TransactionReceipt) -> bool {
        let message = format!("Transaction reverted in block {}", receipt.block_number);

        let update = TransactionUpdate {
            block_number: Some(receipt.block_number),
            gas_used: Some(receipt.gas_used),
            gas_cost_native: Some(Self::fee_eth(tx, receipt)),
            error_message: Some(message.clone()),
            ..TransactionUpdate::status(TransactionStatus::Failed)
        };

        if !self.repository.update_transaction_status(&tx.tx_id, &update).await {
            return false;
        }

        error!(tx_hash = %tx.tx_id, block_number = receipt.block_number, "Transaction failed on-chain");

        let err = Error::Ledger(ledger_client::Error::ContractRejection(message));
        let entry = ErrorEntry::from_error(
            &err,
            serde_json::json!({
                "block_number": receipt.block_number,
                "gas_used": receipt.gas_used,
            }),
        )
        .with_tx_id(tx.tx_id.clone());
        self.repository.insert_error_entry(&entry).await;

        true
    }

    async fn time_out(&self, tx: &LedgerTransaction) -> bool {
        let hours = self.pending_timeout.as_secs() / 3600;
        let update = TransactionUpdate {
            error_message: Some(format!("Not mined within {}h", hours)),
            ..TransactionUpdate::status(TransactionStatus::Timeout)
        };

        let updated = self.repository.update_transaction_status(&tx.tx_id, &update).await;
        if updated {
            warn!(tx_hash = %tx.tx_id, created_at = %tx.created_at, "Transaction timed out");
        }
        updated
    }
}
