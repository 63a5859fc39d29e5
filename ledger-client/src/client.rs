//! Ledger client abstraction
//!
//! Callers (the batch orchestrator, the reconciler, the network monitor) hold
//! an `Arc<dyn LedgerClient>` so the process entry point owns the concrete
//! client and tests can substitute a double.

use crate::error::Result;
use crate::types::{NetworkInfo, ReceiptOutcome, SubmittedTransaction, TransactionRequest, TxStatus};
use alloy::primitives::Address;
use async_trait::async_trait;
use std::time::Duration;

/// Low-level ledger operations
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Address of the signing key
    fn signer_address(&self) -> Address;

    /// Latest block number; cached or zero on transport error
    async fn current_block_height(&self) -> u64;

    /// Current gas price (wei); cached or configured default on transport error
    async fn current_gas_price(&self) -> u128;

    /// Current gas price plus a premium; configured default on error
    async fn recommended_gas_price(&self) -> u128;

    /// Average seconds between recent blocks; 12.0 when unknown
    async fn estimate_block_interval(&self) -> f64;

    /// Whether the node is synced; false on error
    async fn is_synced(&self) -> bool;

    /// Signer balance (wei); zero on error
    async fn balance(&self) -> u128;

    /// Unix timestamp of a block
    async fn block_timestamp(&self, block_number: u64) -> Result<u64>;

    /// Network snapshot; errors when the endpoint cannot be reached
    async fn network_info(&self) -> Result<NetworkInfo>;

    /// Sign and broadcast a transaction
    async fn submit(&self, request: TransactionRequest) -> Result<SubmittedTransaction>;

    /// Block until the transaction is mined or `timeout` elapses
    async fn wait_for_receipt(&self, tx_hash: &str, timeout: Duration) -> ReceiptOutcome;

    /// Non-blocking status check
    async fn transaction_status(&self, tx_hash: &str) -> TxStatus;
}
