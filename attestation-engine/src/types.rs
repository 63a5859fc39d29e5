//! Core types for daily alarm attestation

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One device's alarm aggregate for a calendar day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmSummary {
    /// Device identifier
    pub device_id: String,

    /// Owning client identifier
    pub client_id: String,

    /// Number of alarms raised during the day
    pub alarm_count: u64,

    /// Highest concentration observed (ppm)
    pub max_concentration: f64,

    /// Calendar day the aggregate covers
    pub date: NaiveDate,
}

/// 32-byte integrity digest, rendered as `0x`-prefixed lowercase hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct IntegrityHash([u8; 32]);

impl IntegrityHash {
    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `0x`-prefixed lowercase hex
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for IntegrityHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for IntegrityHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(digits)
            .map_err(|e| Error::Encoding(format!("Invalid integrity hash '{}': {}", s, e)))?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| {
            Error::Encoding(format!(
                "Integrity hash must be 32 bytes, got {} ('{}')",
                v.len(),
                s
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl From<IntegrityHash> for String {
    fn from(hash: IntegrityHash) -> Self {
        hash.to_hex()
    }
}

impl TryFrom<String> for IntegrityHash {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Lifecycle of a ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Broadcast, not yet observed in a block
    Pending,

    /// Mined and executed successfully
    Confirmed,

    /// Mined but reverted
    Failed,

    /// Not mined within the pending timeout
    Timeout,
}

impl TransactionStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Confirmed => "CONFIRMED",
            TransactionStatus::Failed => "FAILED",
            TransactionStatus::Timeout => "TIMEOUT",
        }
    }

    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Only PENDING moves, and only forward
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(self, TransactionStatus::Pending) && next.is_terminal()
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "CONFIRMED" => Ok(TransactionStatus::Confirmed),
            "FAILED" => Ok(TransactionStatus::Failed),
            "TIMEOUT" => Ok(TransactionStatus::Timeout),
            other => Err(Error::Persistence(format!(
                "Unknown transaction status '{}'",
                other
            ))),
        }
    }
}

/// A transaction accepted by the ledger node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Ledger-assigned transaction hash
    pub tx_id: String,

    /// Gas limit the transaction was signed with
    pub gas_limit: u64,

    /// Gas price (wei) the transaction was signed with
    pub gas_price: u128,

    /// Fee in ether: upper bound while pending, actual once mined
    pub gas_cost_native: f64,

    /// Block the transaction was mined in
    pub block_number: Option<u64>,

    /// Gas consumed once mined
    pub gas_used: Option<u64>,

    /// Seconds between submission and inclusion
    pub confirmation_time_seconds: Option<f64>,

    /// Current lifecycle state
    pub status: TransactionStatus,

    /// Submission attempts beyond the first
    pub retry_count: u32,

    /// Failure detail, if any
    pub error_message: Option<String>,

    /// Submission time
    pub created_at: DateTime<Utc>,
}

/// Durable record of one summary submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationRecord {
    /// Attested summary
    pub summary: AlarmSummary,

    /// Transaction carrying the attestation
    pub tx_id: Option<String>,

    /// Digest submitted on-chain
    pub integrity_hash: IntegrityHash,

    /// Set once the transaction is confirmed
    pub verified: bool,

    /// Run that produced the record
    pub batch_id: String,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

/// Field changes applied by the reconciler
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionUpdate {
    /// New status
    pub status: TransactionStatus,

    /// Block the transaction was mined in
    pub block_number: Option<u64>,

    /// Gas consumed
    pub gas_used: Option<u64>,

    /// Actual fee in ether
    pub gas_cost_native: Option<f64>,

    /// Seconds between submission and inclusion
    pub confirmation_seconds: Option<f64>,

    /// Failure detail
    pub error_message: Option<String>,
}

impl TransactionUpdate {
    /// Bare status change
    pub fn status(status: TransactionStatus) -> Self {
        Self {
            status,
            block_number: None,
            gas_used: None,
            gas_cost_native: None,
            confirmation_seconds: None,
            error_message: None,
        }
    }
}

/// Outcome of one orchestration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Every record was submitted
    Completed,

    /// At least one record failed
    PartialFailure,

    /// The run itself failed
    Failed,
}

impl BatchStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::PartialFailure => "PARTIAL_FAILURE",
            BatchStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one orchestration run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Unique run identifier
    pub batch_id: String,

    /// Day whose summaries were attested
    pub data_date: NaiveDate,

    /// Records fetched
    pub total: usize,

    /// Records broadcast successfully
    pub succeeded: usize,

    /// Records that could not be broadcast
    pub failed: usize,

    /// Broadcast records whose persistence failed
    pub unreconciled: usize,

    /// Gas consumed by transactions confirmed at summary time
    pub gas_used: u64,

    /// Fee (ether) of transactions confirmed at summary time
    pub gas_cost_native: f64,

    /// Wall-clock duration in seconds
    pub duration_seconds: f64,

    /// Overall outcome
    pub status: BatchStatus,

    /// Completion time
    pub processed_at: DateTime<Utc>,
}

impl BatchResult {
    /// Fraction of records submitted (1.0 for an empty run)
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.succeeded as f64 / self.total as f64
        }
    }
}

/// Append-only failure audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Type tag (see [`Error::kind`])
    pub kind: String,

    /// Human-readable message
    pub message: String,

    /// Related transaction, if one exists
    pub tx_id: Option<String>,

    /// Retry attempt the failure belongs to
    pub retry_attempt: u32,

    /// Free-form context
    pub context: serde_json::Value,

    /// Time of failure
    pub created_at: DateTime<Utc>,
}

impl ErrorEntry {
    /// Entry for an engine error
    pub fn from_error(err: &Error, context: serde_json::Value) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            tx_id: None,
            retry_attempt: 0,
            context,
            created_at: Utc::now(),
        }
    }

    /// Attach a transaction id
    pub fn with_tx_id(mut self, tx_id: impl Into<String>) -> Self {
        self.tx_id = Some(tx_id.into());
        self
    }
}

/// Reachability of the ledger endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    /// Reachable and synced
    Healthy,

    /// Reachable but still syncing
    Degraded,

    /// Unreachable or erroring
    Down,
}

impl EndpointStatus {
    /// Storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Healthy => "healthy",
            EndpointStatus::Degraded => "degraded",
            EndpointStatus::Down => "down",
        }
    }
}

/// Point-in-time network health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    /// Network name from configuration
    pub network: String,

    /// Chain id reported by the node
    pub chain_id: Option<u64>,

    /// Latest block
    pub block_number: Option<u64>,

    /// Average seconds between blocks
    pub block_interval_secs: Option<f64>,

    /// Recommended gas price (gwei)
    pub gas_price_gwei: Option<f64>,

    /// Node sync flag
    pub is_synced: bool,

    /// Signer balance (ether)
    pub balance_eth: Option<f64>,

    /// Derived status
    pub status: EndpointStatus,

    /// Observation time
    pub checked_at: DateTime<Utc>,
}

/// Counts from one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationSummary {
    /// Pending transactions examined
    pub checked: usize,

    /// Moved to CONFIRMED
    pub confirmed: usize,

    /// Moved to FAILED
    pub failed: usize,

    /// Moved to TIMEOUT
    pub timed_out: usize,

    /// Left PENDING
    pub still_pending: usize,
}
