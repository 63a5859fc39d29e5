//! Core types for ledger interaction

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Block interval assumed when it cannot be derived from chain history
pub const DEFAULT_BLOCK_INTERVAL_SECS: f64 = 12.0;

/// Unsigned transaction as requested by a caller
///
/// Gas limit, gas price and nonce are filled in by the client when left unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Destination (contract) address
    pub to: Address,

    /// ABI-encoded call data
    pub data: Bytes,

    /// Native value transferred with the call
    pub value: U256,

    /// Gas limit; estimated with a safety margin when `None`
    pub gas_limit: Option<u64>,

    /// Gas price in wei; recommended price when `None`
    pub gas_price: Option<u128>,

    /// Nonce; pending transaction count of the signer when `None`
    pub nonce: Option<u64>,
}

impl TransactionRequest {
    /// Contract call with no value attached
    pub fn call(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            data: data.into(),
            value: U256::ZERO,
            gas_limit: None,
            gas_price: None,
            nonce: None,
        }
    }

    /// Set an explicit gas limit
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    /// Set an explicit gas price (wei)
    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    /// Set an explicit nonce
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }
}

/// A transaction accepted by the node (broadcast, not necessarily mined)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTransaction {
    /// Ledger-assigned transaction hash (0x-prefixed)
    pub tx_hash: String,

    /// Nonce used for signing
    pub nonce: u64,

    /// Gas limit the transaction was signed with
    pub gas_limit: u64,

    /// Gas price (wei) the transaction was signed with
    pub gas_price: u128,

    /// Destination address
    pub to: Address,

    /// Native value transferred
    pub value: U256,
}

impl SubmittedTransaction {
    /// Upper bound on the fee: gas limit × gas price (wei)
    pub fn max_fee_wei(&self) -> u128 {
        u128::from(self.gas_limit).saturating_mul(self.gas_price)
    }
}

/// Receipt of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// Transaction hash
    pub tx_hash: String,

    /// Block the transaction was included in
    pub block_number: u64,

    /// Gas actually consumed
    pub gas_used: u64,

    /// Price actually paid per gas unit (wei), when reported by the node
    pub effective_gas_price: Option<u128>,

    /// Execution status (false = reverted)
    pub success: bool,
}

impl TransactionReceipt {
    /// Fee paid in wei, when the effective gas price is known
    pub fn fee_wei(&self) -> Option<u128> {
        self.effective_gas_price
            .map(|price| u128::from(self.gas_used).saturating_mul(price))
    }
}

/// Point-in-time status of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Not yet mined (or unknown to the node)
    Pending,

    /// Mined and executed successfully
    Confirmed(TransactionReceipt),

    /// Mined but reverted
    Failed(TransactionReceipt),

    /// Status could not be determined
    Error(String),
}

/// Result of a blocking receipt wait
#[derive(Debug, Clone, PartialEq)]
pub enum ReceiptOutcome {
    /// The transaction was mined within the deadline
    Mined {
        /// Receipt returned by the node
        receipt: TransactionReceipt,
        /// Time spent waiting
        waited: Duration,
    },

    /// Deadline elapsed before the transaction was mined
    Timeout {
        /// Time spent waiting
        waited: Duration,
    },

    /// The wait was aborted by a non-retryable error
    Error(String),
}

/// Snapshot of the remote node and network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Chain identifier
    pub chain_id: u64,

    /// Latest block number
    pub block_number: u64,

    /// Current gas price (wei)
    pub gas_price: u128,

    /// Estimated seconds between blocks
    pub block_interval_secs: f64,

    /// Whether the node reports itself as synced
    pub is_synced: bool,
}
