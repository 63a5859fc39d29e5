//! Batch orchestration
//!
//! One run attests every alarm summary of a day:
//!
//! 1. **Fetching**: pull the day's summaries from the aggregation source
//! 2. **Partitioning**: split them into ordered, fixed-size chunks
//! 3. **Submitting**: hash, encode and broadcast each record sequentially
//! 4. **Summarizing**: collect gas metrics and build the [`BatchResult`]
//!
//! A per-record failure becomes an [`ErrorEntry`] and never aborts the
//! batch. Submission does not wait for confirmations; the reconciler picks
//! up the PENDING transactions later.

use crate::contract::{AlarmRegistry, DailyAlarmCall};
use crate::error::Error;
use crate::hasher;
use crate::repository::AttestationRepository;
use crate::source::SummarySource;
use crate::types::*;
use chrono::{DateTime, Local, NaiveDate, Utc};
use ledger_client::{units, LedgerClient, TxStatus};
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Stage of a batch run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    /// Reading summaries
    Fetching,
    /// Splitting into chunks
    Partitioning,
    /// Broadcasting records
    Submitting,
    /// Building the result
    Summarizing,
    /// Finished with a status
    Finished(BatchStatus),
}

impl fmt::Display for BatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchPhase::Fetching => f.write_str("FETCHING"),
            BatchPhase::Partitioning => f.write_str("PARTITIONING"),
            BatchPhase::Submitting => f.write_str("SUBMITTING"),
            BatchPhase::Summarizing => f.write_str("SUMMARIZING"),
            BatchPhase::Finished(status) => write!(f, "{}", status),
        }
    }
}

/// Split `items` into chunks of at most `chunk_size`, preserving order.
///
/// A chunk size of zero is treated as one.
pub fn partition<T>(items: &[T], chunk_size: usize) -> Vec<&[T]> {
    items.chunks(chunk_size.max(1)).collect()
}

/// Unique run identifier: `batch_<local timestamp>_<8 hex chars>`
pub fn generate_batch_id(now: DateTime<Local>) -> String {
    let suffix: u32 = rand::thread_rng().gen();
    format!("batch_{}_{:08x}", now.format("%Y%m%d_%H%M%S"), suffix)
}

/// Day attested when no date is given
pub fn default_data_date(today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(today)
}

/// Result of submitting one record
#[derive(Debug)]
pub enum RecordOutcome {
    /// Broadcast accepted by the node
    Submitted {
        /// Transaction hash
        tx_id: String,
        /// Gas price the transaction was signed with
        gas_price: u128,
        /// Whether both transaction and attestation rows were stored
        persisted: bool,
    },

    /// Submission failed before or during broadcast
    Failed(Error),
}

#[derive(Debug, Default)]
struct Tally {
    succeeded: usize,
    failed: usize,
    unreconciled: usize,
    submitted: Vec<(String, u128)>,
}

/// Drives one daily attestation run
#[derive(Clone)]
pub struct BatchOrchestrator {
    source: Arc<dyn SummarySource>,
    ledger: Arc<dyn LedgerClient>,
    repository: Arc<dyn AttestationRepository>,
    registry: Arc<AlarmRegistry>,
    chunk_size: usize,
}

impl fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("registry", &self.registry)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl BatchOrchestrator {
    /// Create an orchestrator
    pub fn new(
        source: Arc<dyn SummarySource>,
        ledger: Arc<dyn LedgerClient>,
        repository: Arc<dyn AttestationRepository>,
        registry: AlarmRegistry,
        chunk_size: usize,
    ) -> Self {
        Self {
            source,
            ledger,
            repository,
            registry: Arc::new(registry),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Run a batch for `date`, or for yesterday (local time) when `None`.
    ///
    /// Always returns a result; failures are reflected in its status.
    pub async fn run(&self, date: Option<NaiveDate>) -> BatchResult {
        let data_date = date.unwrap_or_else(|| default_data_date(Local::now().date_naive()));
        let batch_id = generate_batch_id(Local::now());
        let started = Instant::now();

        info!(batch_id = %batch_id, %data_date, "Starting batch run");
        self.enter(&batch_id, BatchPhase::Fetching);

        let summaries = match self.source.fetch_daily_summaries(data_date).await {
            Ok(summaries) => summaries,
            Err(e) => {
                error!(batch_id = %batch_id, error = %e, "Failed to fetch daily summaries");
                self.record_error(&e, None, serde_json::json!({
                    "batch_id": batch_id,
                    "data_date": data_date,
                    "phase": BatchPhase::Fetching.to_string(),
                }))
                .await;
                return self
                    .finish(batch_id, data_date, 0, Tally::default(), BatchStatus::Failed, started)
                    .await;
            }
        };

        let total = summaries.len();
        if total == 0 {
            info!(batch_id = %batch_id, %data_date, "No summaries to attest");
            return self
                .finish(batch_id, data_date, 0, Tally::default(), BatchStatus::Completed, started)
                .await;
        }

        // Panics inside the submission loop surface as a join error
        let worker = self.clone();
        let id = batch_id.clone();
        let handle = tokio::spawn(async move { worker.submit_all(&id, summaries).await });

        match handle.await {
            Ok(tally) => {
                self.enter(&batch_id, BatchPhase::Summarizing);
                let tally = self.summarize(tally).await;
                let status = if tally.failed == 0 {
                    BatchStatus::Completed
                } else {
                    BatchStatus::PartialFailure
                };
                self.finish(batch_id, data_date, total, tally, status, started)
                    .await
            }
            Err(e) => {
                let err = Error::Other(format!("Batch run aborted: {}", e));
                error!(batch_id = %batch_id, error = %err, "Batch run failed");
                self.record_error(&err, None, serde_json::json!({
                    "batch_id": batch_id,
                    "data_date": data_date,
                    "phase": BatchPhase::Submitting.to_string(),
                }))
                .await;

                let tally = Tally {
                    failed: total,
                    ..Tally::default()
                };
                self.finish(batch_id, data_date, total, tally, BatchStatus::Failed, started)
                    .await
            }
        }
    }

    fn enter(&self, batch_id: &str, phase: BatchPhase) {
        info!(batch_id, phase = %phase, "Batch phase");
    }

    async fn submit_all(&self, batch_id: &str, summaries: Vec<AlarmSummary>) -> Tally {
        self.enter(batch_id, BatchPhase::Partitioning);
        let chunks = partition(&summaries, self.chunk_size);
        let chunk_count = chunks.len();

        self.enter(batch_id, BatchPhase::Submitting);
        let mut tally = Tally::default();

        for (index, chunk) in chunks.into_iter().enumerate() {
            info!(
                batch_id,
                chunk = index + 1,
                chunks = chunk_count,
                records = chunk.len(),
                "Processing chunk"
            );

            for summary in chunk {
                match self.process_record(batch_id, summary).await {
                    RecordOutcome::Submitted {
                        tx_id,
                        gas_price,
                        persisted,
                    } => {
                        tally.succeeded += 1;
                        if !persisted {
                            tally.unreconciled += 1;
                        }
                        tally.submitted.push((tx_id, gas_price));
                    }
                    RecordOutcome::Failed(_) => tally.failed += 1,
                }
            }
        }

        tally
    }

    /// Hash, encode, broadcast and persist one summary
    pub async fn process_record(&self, batch_id: &str, summary: &AlarmSummary) -> RecordOutcome {
        let generated_at = Utc::now();
        let integrity_hash = hasher::hash(summary, generated_at);

        let call = DailyAlarmCall {
            date: summary.date,
            device_id: summary.device_id.clone(),
            client_id: summary.client_id.clone(),
            alarm_count: summary.alarm_count,
            max_concentration: summary.max_concentration,
            integrity_hash: integrity_hash.to_hex(),
        };

        let submitted = match self.registry.register_daily_alarm(&call).await {
            Ok(submitted) => submitted,
            Err(e) => {
                warn!(
                    batch_id,
                    device_id = %summary.device_id,
                    error_kind = e.kind(),
                    error = %e,
                    "Record submission failed"
                );
                self.record_error(&e, None, serde_json::json!({
                    "batch_id": batch_id,
                    "device_id": summary.device_id,
                    "client_id": summary.client_id,
                    "data_date": summary.date,
                    "integrity_hash": integrity_hash.to_hex(),
                }))
                .await;
                return RecordOutcome::Failed(e);
            }
        };

        let transaction = LedgerTransaction {
            tx_id: submitted.tx_hash.clone(),
            gas_limit: submitted.gas_limit,
            gas_price: submitted.gas_price,
            gas_cost_native: units::wei_to_eth(submitted.max_fee_wei()),
            block_number: None,
            gas_used: None,
            confirmation_time_seconds: None,
            status: TransactionStatus::Pending,
            retry_count: 0,
            error_message: None,
            created_at: Utc::now(),
        };

        let record = AttestationRecord {
            summary: summary.clone(),
            tx_id: Some(submitted.tx_hash.clone()),
            integrity_hash,
            verified: false,
            batch_id: batch_id.to_string(),
            created_at: generated_at,
        };

        // The record references the transaction, so it is only stored after it
        let persisted = self.repository.insert_ledger_transaction(&transaction).await
            && self.repository.insert_attestation_record(&record).await;

        if !persisted {
            let err = Error::Persistence(format!(
                "Transaction {} broadcast but not stored",
                submitted.tx_hash
            ));
            warn!(
                batch_id,
                tx_hash = %submitted.tx_hash,
                device_id = %summary.device_id,
                "Record flagged unreconciled"
            );
            self.record_error(&err, Some(&submitted.tx_hash), serde_json::json!({
                "batch_id": batch_id,
                "device_id": summary.device_id,
                "integrity_hash": integrity_hash.to_hex(),
            }))
            .await;
        }

        RecordOutcome::Submitted {
            tx_id: submitted.tx_hash,
            gas_price: submitted.gas_price,
            persisted,
        }
    }

    /// Best-effort gas totals: only transactions already confirmed count
    async fn summarize(&self, tally: Tally) -> SummarizedTally {
        let mut gas_used = 0u64;
        let mut cost_wei = 0u128;
        let mut confirmed = 0usize;

        let prices: HashMap<&str, u128> = tally
            .submitted
            .iter()
            .map(|(tx_id, price)| (tx_id.as_str(), *price))
            .collect();

        for (tx_id, price) in &prices {
            if let TxStatus::Confirmed(receipt) = self.ledger.transaction_status(tx_id).await {
                confirmed += 1;
                gas_used = gas_used.saturating_add(receipt.gas_used);
                let fee = receipt
                    .fee_wei()
                    .unwrap_or_else(|| u128::from(receipt.gas_used).saturating_mul(*price));
                cost_wei = cost_wei.saturating_add(fee);
            }
        }

        info!(
            submitted = tally.submitted.len(),
            confirmed,
            gas_used,
            "Gas metrics collected"
        );

        SummarizedTally {
            succeeded: tally.succeeded,
            failed: tally.failed,
            unreconciled: tally.unreconciled,
            gas_used,
            gas_cost_native: units::wei_to_eth(cost_wei),
        }
    }

    async fn record_error(&self, err: &Error, tx_id: Option<&str>, context: serde_json::Value) {
        let mut entry = ErrorEntry::from_error(err, context);
        if let Some(tx_id) = tx_id {
            entry = entry.with_tx_id(tx_id);
        }
        self.repository.insert_error_entry(&entry).await;
    }

    async fn finish(
        &self,
        batch_id: String,
        data_date: NaiveDate,
        total: usize,
        tally: impl Into<SummarizedTally>,
        status: BatchStatus,
        started: Instant,
    ) -> BatchResult {
        let tally = tally.into();

        let result = BatchResult {
            batch_id,
            data_date,
            total,
            succeeded: tally.succeeded,
            failed: tally.failed,
            unreconciled: tally.unreconciled,
            gas_used: tally.gas_used,
            gas_cost_native: tally.gas_cost_native,
            duration_seconds: started.elapsed().as_secs_f64(),
            status,
            processed_at: Utc::now(),
        };

        self.enter(&result.batch_id, BatchPhase::Finished(status));
        self.repository.insert_batch_result(&result).await;

        info!(
            batch_id = %result.batch_id,
            data_date = %result.data_date,
            total = result.total,
            succeeded = result.succeeded,
            failed = result.failed,
            unreconciled = result.unreconciled,
            gas_used = result.gas_used,
            gas_cost_eth = result.gas_cost_native,
            duration_secs = result.duration_seconds,
            status = %result.status,
            "Batch run finished"
        );

        result
    }
}

#[derive(Debug, Default)]
struct SummarizedTally {
    succeeded: usize,
    failed: usize,
    unreconciled: usize,
    gas_used: u64,
    gas_cost_native: f64,
}

impl From<Tally> for SummarizedTally {
    fn from(tally: Tally) -> Self {
        Self {
            succeeded: tally.succeeded,
            failed: tally.failed,
            unreconciled: tally.unreconciled,
            ..Self::default()
        }
    }
}
