//! In-process doubles for the engine's collaborators

#![allow(dead_code)]

use alloy::primitives::Address;
use async_trait::async_trait;
use attestation_engine::config::Config;
use attestation_engine::{
    AlarmSummary, AttestationRecord, AttestationRepository, BatchResult, Error, ErrorEntry,
    HealthSnapshot, LedgerTransaction, Result, SummarySource, TransactionStatus,
    TransactionUpdate,
};
use chrono::NaiveDate;
use ledger_client::{
    NetworkInfo, ReceiptOutcome, SubmittedTransaction, TransactionReceipt, TransactionRequest,
    TxStatus,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
pub const KEY: &str = "0x0101010101010101010101010101010101010101010101010101010101010101";

pub fn test_config(batch_size: usize) -> Config {
    let mut config = Config::default();
    config.ledger.rpc_url = "http://localhost:8545".to_string();
    config.ledger.private_key = KEY.to_string();
    config.ledger.contract_address = CONTRACT.to_string();
    config.processing.batch_size = batch_size;
    config
}

pub fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
}

pub fn summaries(count: usize) -> Vec<AlarmSummary> {
    (0..count)
        .map(|i| AlarmSummary {
            device_id: format!("GAS-{:03}", i),
            client_id: format!("client-{}", i % 3),
            alarm_count: i as u64 + 1,
            max_concentration: 40.0 + i as f64 * 1.5,
            date: date(),
        })
        .collect()
}

pub fn tx_hash(index: usize) -> String {
    format!("0x{:064x}", index + 1)
}

pub fn receipt(tx_id: &str, block_number: u64, success: bool) -> TransactionReceipt {
    TransactionReceipt {
        tx_hash: tx_id.to_string(),
        block_number,
        gas_used: 50_000,
        effective_gas_price: Some(1_000_000_000),
        success,
    }
}

type SubmitPlan = Box<dyn Fn(usize) -> std::result::Result<(), ledger_client::Error> + Send + Sync>;

/// Ledger double: submission outcome chosen by call index
pub struct FakeLedger {
    plan: SubmitPlan,
    calls: AtomicUsize,
    pub requests: Mutex<Vec<TransactionRequest>>,
    pub statuses: Mutex<HashMap<String, TxStatus>>,
    pub block_timestamps: Mutex<HashMap<u64, u64>>,
    pub network_up: bool,
    pub synced: bool,
}

impl FakeLedger {
    pub fn accepting() -> Self {
        Self::with_plan(|_| Ok(()))
    }

    pub fn with_plan(
        plan: impl Fn(usize) -> std::result::Result<(), ledger_client::Error> + Send + Sync + 'static,
    ) -> Self {
        Self {
            plan: Box::new(plan),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            statuses: Mutex::new(HashMap::new()),
            block_timestamps: Mutex::new(HashMap::new()),
            network_up: true,
            synced: true,
        }
    }

    pub fn set_status(&self, tx_id: &str, status: TxStatus) {
        self.statuses.lock().insert(tx_id.to_string(), status);
    }

    pub fn submit_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ledger_client::LedgerClient for FakeLedger {
    fn signer_address(&self) -> Address {
        Address::repeat_byte(0x42)
    }

    async fn current_block_height(&self) -> u64 {
        1_000
    }

    async fn current_gas_price(&self) -> u128 {
        20_000_000_000
    }

    async fn recommended_gas_price(&self) -> u128 {
        22_000_000_000
    }

    async fn estimate_block_interval(&self) -> f64 {
        12.0
    }

    async fn is_synced(&self) -> bool {
        self.synced
    }

    async fn balance(&self) -> u128 {
        500_000_000_000_000_000
    }

    async fn block_timestamp(&self, block_number: u64) -> ledger_client::Result<u64> {
        self.block_timestamps
            .lock()
            .get(&block_number)
            .copied()
            .ok_or_else(|| ledger_client::Error::InvalidResponse("unknown block".into()))
    }

    async fn network_info(&self) -> ledger_client::Result<NetworkInfo> {
        if !self.network_up {
            return Err(ledger_client::Error::Transport("connection refused".into()));
        }
        Ok(NetworkInfo {
            chain_id: 11_155_111,
            block_number: 1_000,
            gas_price: 20_000_000_000,
            block_interval_secs: 12.0,
            is_synced: self.synced,
        })
    }

    async fn submit(&self, request: TransactionRequest) -> ledger_client::Result<SubmittedTransaction> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        (self.plan)(index)?;

        Ok(SubmittedTransaction {
            tx_hash: tx_hash(index),
            nonce: index as u64,
            gas_limit: request.gas_limit.unwrap_or(120_000),
            gas_price: request.gas_price.unwrap_or(22_000_000_000),
            to: request.to,
            value: request.value,
        })
    }

    async fn wait_for_receipt(&self, tx_hash: &str, _timeout: Duration) -> ReceiptOutcome {
        match self.statuses.lock().get(tx_hash) {
            Some(TxStatus::Confirmed(receipt)) | Some(TxStatus::Failed(receipt)) => {
                ReceiptOutcome::Mined {
                    receipt: receipt.clone(),
                    waited: Duration::ZERO,
                }
            }
            _ => ReceiptOutcome::Timeout {
                waited: Duration::ZERO,
            },
        }
    }

    async fn transaction_status(&self, tx_hash: &str) -> TxStatus {
        self.statuses
            .lock()
            .get(tx_hash)
            .cloned()
            .unwrap_or(TxStatus::Pending)
    }
}

/// Aggregation double
pub struct FakeSource {
    pub summaries: Option<Vec<AlarmSummary>>,
}

impl FakeSource {
    pub fn with(summaries: Vec<AlarmSummary>) -> Self {
        Self {
            summaries: Some(summaries),
        }
    }

    pub fn failing() -> Self {
        Self { summaries: None }
    }
}

#[async_trait]
impl SummarySource for FakeSource {
    async fn fetch_daily_summaries(&self, _date: NaiveDate) -> Result<Vec<AlarmSummary>> {
        self.summaries
            .clone()
            .ok_or_else(|| Error::Source("aggregation backend unavailable".into()))
    }
}

/// Repository double with the same guarantees as the Postgres one
#[derive(Default)]
pub struct MemoryRepository {
    pub records: Mutex<Vec<AttestationRecord>>,
    pub transactions: Mutex<Vec<LedgerTransaction>>,
    pub errors: Mutex<Vec<ErrorEntry>>,
    pub health: Mutex<Vec<HealthSnapshot>>,
    pub batches: Mutex<Vec<BatchResult>>,
    pub fail_transaction_inserts: bool,
}

impl MemoryRepository {
    pub fn transaction(&self, tx_id: &str) -> Option<LedgerTransaction> {
        self.transactions
            .lock()
            .iter()
            .find(|tx| tx.tx_id == tx_id)
            .cloned()
    }

    pub fn error_kinds(&self) -> Vec<String> {
        self.errors.lock().iter().map(|e| e.kind.clone()).collect()
    }
}

#[async_trait]
impl AttestationRepository for MemoryRepository {
    async fn insert_attestation_record(&self, record: &AttestationRecord) -> bool {
        self.records.lock().push(record.clone());
        true
    }

    async fn insert_ledger_transaction(&self, tx: &LedgerTransaction) -> bool {
        if self.fail_transaction_inserts {
            return false;
        }
        self.transactions.lock().push(tx.clone());
        true
    }

    async fn update_transaction_status(&self, tx_id: &str, update: &TransactionUpdate) -> bool {
        let mut transactions = self.transactions.lock();
        let Some(tx) = transactions.iter_mut().find(|tx| tx.tx_id == tx_id) else {
            return false;
        };
        if !tx.status.can_transition_to(update.status) {
            return false;
        }

        tx.status = update.status;
        tx.block_number = update.block_number.or(tx.block_number);
        tx.gas_used = update.gas_used.or(tx.gas_used);
        if let Some(cost) = update.gas_cost_native {
            tx.gas_cost_native = cost;
        }
        tx.confirmation_time_seconds = update.confirmation_seconds.or(tx.confirmation_time_seconds);
        tx.error_message = update.error_message.clone().or(tx.error_message.take());
        true
    }

    async fn mark_attestation_verified(&self, tx_id: &str) -> bool {
        let mut records = self.records.lock();
        let mut found = false;
        for record in records.iter_mut().filter(|r| r.tx_id.as_deref() == Some(tx_id)) {
            record.verified = true;
            found = true;
        }
        found
    }

    async fn insert_error_entry(&self, entry: &ErrorEntry) -> bool {
        self.errors.lock().push(entry.clone());
        true
    }

    async fn insert_health_snapshot(&self, snapshot: &HealthSnapshot) -> bool {
        self.health.lock().push(snapshot.clone());
        true
    }

    async fn insert_batch_result(&self, result: &BatchResult) -> bool {
        self.batches.lock().push(result.clone());
        true
    }

    async fn list_pending_transactions(&self) -> Vec<LedgerTransaction> {
        self.transactions
            .lock()
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Pending)
            .cloned()
            .collect()
    }

    async fn ping(&self) -> bool {
        true
    }
}
