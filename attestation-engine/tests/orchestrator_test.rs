//! Batch orchestration against in-process collaborators

mod common;

use attestation_engine::contract::registrarAlarmaDiariaCall;
use attestation_engine::{hasher, AlarmRegistry, BatchOrchestrator, BatchStatus, TransactionStatus};
use alloy::primitives::Address;
use alloy::sol_types::SolCall;
use common::*;
use ledger_client::{LedgerClient, TxStatus};
use std::sync::Arc;

fn orchestrator(
    ledger: Arc<FakeLedger>,
    source: FakeSource,
    repository: Arc<MemoryRepository>,
    chunk_size: usize,
) -> BatchOrchestrator {
    let ledger_handle: Arc<dyn LedgerClient> = ledger;
    let registry = AlarmRegistry::new(ledger_handle.clone(), CONTRACT.parse().unwrap());
    BatchOrchestrator::new(Arc::new(source), ledger_handle, repository, registry, chunk_size)
}

#[tokio::test]
async fn test_all_records_submitted() {
    let ledger = Arc::new(FakeLedger::accepting());
    let repository = Arc::new(MemoryRepository::default());
    let orchestrator = orchestrator(
        ledger.clone(),
        FakeSource::with(summaries(5)),
        repository.clone(),
        10,
    );

    let result = orchestrator.run(Some(date())).await;

    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(result.total, 5);
    assert_eq!(result.succeeded, 5);
    assert_eq!(result.failed, 0);
    assert_eq!(result.unreconciled, 0);
    assert_eq!(result.data_date, date());
    assert!(result.batch_id.starts_with("batch_"));

    assert_eq!(repository.records.lock().len(), 5);
    let transactions = repository.transactions.lock().clone();
    assert_eq!(transactions.len(), 5);
    assert!(transactions
        .iter()
        .all(|tx| tx.status == TransactionStatus::Pending));

    assert_eq!(repository.batches.lock().len(), 1);
    assert!(repository.errors.lock().is_empty());
}

#[tokio::test]
async fn test_submission_preserves_order_and_encodes_call() {
    let ledger = Arc::new(FakeLedger::accepting());
    let repository = Arc::new(MemoryRepository::default());
    let orchestrator = orchestrator(
        ledger.clone(),
        FakeSource::with(summaries(4)),
        repository.clone(),
        3,
    );

    orchestrator.run(Some(date())).await;

    let requests = ledger.requests.lock().clone();
    assert_eq!(requests.len(), 4);

    for (i, request) in requests.iter().enumerate() {
        assert_eq!(request.to, CONTRACT.parse::<Address>().unwrap());
        let call = registrarAlarmaDiariaCall::abi_decode(&request.data).unwrap();
        assert_eq!(call.device_id, format!("GAS-{:03}", i));
    }
}

#[tokio::test]
async fn test_integrity_hash_recomputable_from_record() {
    let ledger = Arc::new(FakeLedger::accepting());
    let repository = Arc::new(MemoryRepository::default());
    let orchestrator = orchestrator(
        ledger,
        FakeSource::with(summaries(2)),
        repository.clone(),
        10,
    );

    orchestrator.run(Some(date())).await;

    for record in repository.records.lock().iter() {
        assert_eq!(
            record.integrity_hash,
            hasher::hash(&record.summary, record.created_at)
        );
        assert!(!record.verified);
        assert!(record.tx_id.is_some());
    }
}

#[tokio::test]
async fn test_failed_chunk_yields_partial_failure() {
    // 23 records, chunks of [10, 10, 3]; every record of the second chunk
    // fails at the transport layer
    let ledger = Arc::new(FakeLedger::with_plan(|index| {
        if (10..20).contains(&index) {
            Err(ledger_client::Error::Transport("connection reset".into()))
        } else {
            Ok(())
        }
    }));
    let repository = Arc::new(MemoryRepository::default());
    let orchestrator = orchestrator(
        ledger.clone(),
        FakeSource::with(summaries(23)),
        repository.clone(),
        10,
    );

    let result = orchestrator.run(Some(date())).await;

    assert_eq!(result.status, BatchStatus::PartialFailure);
    assert_eq!(result.total, 23);
    assert_eq!(result.succeeded, 13);
    assert_eq!(result.failed, 10);
    assert_eq!(result.succeeded + result.failed, result.total);

    assert_eq!(ledger.submit_calls(), 23);
    assert_eq!(repository.records.lock().len(), 13);
    assert_eq!(repository.error_kinds(), vec!["transport".to_string(); 10]);
}

#[tokio::test]
async fn test_contract_rejection_isolated_to_record() {
    let ledger = Arc::new(FakeLedger::with_plan(|index| {
        if index == 1 {
            Err(ledger_client::Error::ContractRejection(
                "execution reverted: already registered".into(),
            ))
        } else {
            Ok(())
        }
    }));
    let repository = Arc::new(MemoryRepository::default());
    let orchestrator = orchestrator(
        ledger,
        FakeSource::with(summaries(3)),
        repository.clone(),
        10,
    );

    let result = orchestrator.run(Some(date())).await;

    assert_eq!(result.status, BatchStatus::PartialFailure);
    assert_eq!(result.succeeded, 2);
    assert_eq!(result.failed, 1);

    let records = repository.records.lock().clone();
    assert!(records.iter().all(|r| r.summary.device_id != "GAS-001"));
    assert!(records.iter().any(|r| r.summary.device_id == "GAS-002"));

    let errors = repository.errors.lock().clone();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, "contract_rejection");
    assert_eq!(errors[0].tx_id, None);
    assert_eq!(errors[0].context["device_id"], "GAS-001");
}

#[tokio::test]
async fn test_invalid_summary_fails_before_submission() {
    let mut rows = summaries(2);
    rows[0].max_concentration = f64::NAN;

    let ledger = Arc::new(FakeLedger::accepting());
    let repository = Arc::new(MemoryRepository::default());
    let orchestrator = orchestrator(
        ledger.clone(),
        FakeSource::with(rows),
        repository.clone(),
        10,
    );

    let result = orchestrator.run(Some(date())).await;

    assert_eq!(result.failed, 1);
    assert_eq!(result.succeeded, 1);
    assert_eq!(ledger.submit_calls(), 1);
    assert_eq!(repository.error_kinds(), vec!["encoding".to_string()]);
}

#[tokio::test]
async fn test_zero_records_completes() {
    let ledger = Arc::new(FakeLedger::accepting());
    let repository = Arc::new(MemoryRepository::default());
    let orchestrator = orchestrator(
        ledger.clone(),
        FakeSource::with(Vec::new()),
        repository.clone(),
        10,
    );

    let result = orchestrator.run(Some(date())).await;

    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!((result.total, result.succeeded, result.failed), (0, 0, 0));
    assert_eq!(ledger.submit_calls(), 0);
    assert_eq!(repository.batches.lock().len(), 1);
}

#[tokio::test]
async fn test_source_failure_fails_run() {
    let ledger = Arc::new(FakeLedger::accepting());
    let repository = Arc::new(MemoryRepository::default());
    let orchestrator = orchestrator(
        ledger.clone(),
        FakeSource::failing(),
        repository.clone(),
        10,
    );

    let result = orchestrator.run(Some(date())).await;

    assert_eq!(result.status, BatchStatus::Failed);
    assert_eq!(result.total, 0);
    assert_eq!(ledger.submit_calls(), 0);
    assert_eq!(repository.error_kinds(), vec!["source".to_string()]);
}

#[tokio::test]
async fn test_persistence_failure_flags_unreconciled() {
    let ledger = Arc::new(FakeLedger::accepting());
    let repository = Arc::new(MemoryRepository {
        fail_transaction_inserts: true,
        ..MemoryRepository::default()
    });
    let orchestrator = orchestrator(
        ledger.clone(),
        FakeSource::with(summaries(3)),
        repository.clone(),
        10,
    );

    let result = orchestrator.run(Some(date())).await;

    // Broadcast transactions count as submitted even when not stored
    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(result.succeeded, 3);
    assert_eq!(result.unreconciled, 3);
    assert!(repository.records.lock().is_empty());

    let errors = repository.errors.lock().clone();
    assert_eq!(errors.len(), 3);
    assert!(errors.iter().all(|e| e.kind == "persistence"));
    assert_eq!(errors[0].tx_id.as_deref(), Some(tx_hash(0).as_str()));
}

#[tokio::test]
async fn test_gas_totals_count_confirmed_only() {
    let ledger = Arc::new(FakeLedger::accepting());
    ledger.set_status(&tx_hash(0), TxStatus::Confirmed(receipt(&tx_hash(0), 10, true)));
    ledger.set_status(&tx_hash(1), TxStatus::Failed(receipt(&tx_hash(1), 10, false)));

    let repository = Arc::new(MemoryRepository::default());
    let orchestrator = orchestrator(
        ledger,
        FakeSource::with(summaries(3)),
        repository,
        10,
    );

    let result = orchestrator.run(Some(date())).await;

    assert_eq!(result.gas_used, 50_000);
    // 50k gas at 1 gwei
    assert!((result.gas_cost_native - 0.00005).abs() < 1e-12);
}

#[tokio::test]
async fn test_unexpected_abort_fails_whole_run() {
    let ledger = Arc::new(FakeLedger::with_plan(|index| {
        if index == 2 {
            panic!("signer crashed");
        }
        Ok(())
    }));
    let repository = Arc::new(MemoryRepository::default());
    let orchestrator = orchestrator(
        ledger.clone(),
        FakeSource::with(summaries(5)),
        repository.clone(),
        10,
    );

    let result = orchestrator.run(Some(date())).await;

    assert_eq!(result.status, BatchStatus::Failed);
    assert_eq!(result.total, 5);
    assert_eq!(result.failed, 5);
    assert_eq!(result.succeeded, 0);
    assert_eq!(result.succeeded + result.failed, result.total);
    assert_eq!(ledger.submit_calls(), 3);

    assert_eq!(repository.error_kinds(), vec!["internal".to_string()]);
    let batches = repository.batches.lock().clone();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].status, BatchStatus::Failed);
}
