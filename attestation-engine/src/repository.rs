//! Attestation persistence
//!
//! Repository calls never propagate errors to the engine. Each call is
//! independently committed; a failure is logged and reported as `false`
//! (or an empty result) so in-flight ledger work is never aborted.

use crate::config::DatabaseConfig;
use crate::error::Result;
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Persistence collaborator for the orchestrator, reconciler and monitor
#[async_trait]
pub trait AttestationRepository: Send + Sync {
    /// Store an attestation record
    async fn insert_attestation_record(&self, record: &AttestationRecord) -> bool;

    /// Store a freshly broadcast transaction
    async fn insert_ledger_transaction(&self, tx: &LedgerTransaction) -> bool;

    /// Move a PENDING transaction to a terminal state.
    ///
    /// Returns `false` when the row is missing or no longer pending.
    async fn update_transaction_status(&self, tx_id: &str, update: &TransactionUpdate) -> bool;

    /// Flag the attestation carried by `tx_id` as verified
    async fn mark_attestation_verified(&self, tx_id: &str) -> bool;

    /// Append a failure audit entry
    async fn insert_error_entry(&self, entry: &ErrorEntry) -> bool;

    /// Store a network health snapshot
    async fn insert_health_snapshot(&self, snapshot: &HealthSnapshot) -> bool;

    /// Store a batch summary
    async fn insert_batch_result(&self, result: &BatchResult) -> bool;

    /// Transactions still PENDING, oldest first
    async fn list_pending_transactions(&self) -> Vec<LedgerTransaction>;

    /// Connectivity check
    async fn ping(&self) -> bool;
}

/// Postgres-backed repository
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn wei_to_i64(value: u128) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl PgRepository {
    /// Connect a pool using the database settings
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!(max_connections = config.max_connections, "Database pool established");
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_transaction(row: &PgRow) -> std::result::Result<LedgerTransaction, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<TransactionStatus>()
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;

        let gas_limit: i64 = row.try_get("gas_limit")?;
        let gas_price: i64 = row.try_get("gas_price")?;
        let block_number: Option<i64> = row.try_get("block_number")?;
        let gas_used: Option<i64> = row.try_get("gas_used")?;
        let retry_count: i32 = row.try_get("retry_count")?;
        let created_at: DateTime<Utc> = row.try_get("created_at")?;

        Ok(LedgerTransaction {
            tx_id: row.try_get("tx_hash")?,
            gas_limit: u64::try_from(gas_limit).unwrap_or(0),
            gas_price: u128::try_from(gas_price).unwrap_or(0),
            gas_cost_native: row.try_get("gas_cost_eth")?,
            block_number: block_number.and_then(|n| u64::try_from(n).ok()),
            gas_used: gas_used.and_then(|n| u64::try_from(n).ok()),
            confirmation_time_seconds: row.try_get("confirmation_seconds")?,
            status,
            retry_count: u32::try_from(retry_count).unwrap_or(0),
            error_message: row.try_get("error_message")?,
            created_at,
        })
    }
}

#[async_trait]
impl AttestationRepository for PgRepository {
    async fn insert_attestation_record(&self, record: &AttestationRecord) -> bool {
        let result = sqlx::query(
            r#"
            INSERT INTO attestation_records (
                id, batch_id, data_date, device_id, client_id,
                alarm_count, max_concentration, tx_hash,
                integrity_hash, verified, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&record.batch_id)
        .bind(record.summary.date)
        .bind(&record.summary.device_id)
        .bind(&record.summary.client_id)
        .bind(to_i64(record.summary.alarm_count))
        .bind(record.summary.max_concentration)
        .bind(&record.tx_id)
        .bind(record.integrity_hash.to_hex())
        .bind(record.verified)
        .bind(record.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(device_id = %record.summary.device_id, "Attestation record stored");
                true
            }
            Err(e) => {
                error!(
                    device_id = %record.summary.device_id,
                    error = %e,
                    "Failed to store attestation record"
                );
                false
            }
        }
    }

    async fn insert_ledger_transaction(&self, tx: &LedgerTransaction) -> bool {
        let result = sqlx::query(
            r#"
            INSERT INTO ledger_transactions (
                tx_hash, gas_limit, gas_price, gas_cost_eth,
                block_number, gas_used, confirmation_seconds,
                status, retry_count, error_message, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&tx.tx_id)
        .bind(to_i64(tx.gas_limit))
        .bind(wei_to_i64(tx.gas_price))
        .bind(tx.gas_cost_native)
        .bind(tx.block_number.map(to_i64))
        .bind(tx.gas_used.map(to_i64))
        .bind(tx.confirmation_time_seconds)
        .bind(tx.status.as_str())
        .bind(i32::try_from(tx.retry_count).unwrap_or(i32::MAX))
        .bind(&tx.error_message)
        .bind(tx.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                error!(tx_hash = %tx.tx_id, error = %e, "Failed to store transaction");
                false
            }
        }
    }

    async fn update_transaction_status(&self, tx_id: &str, update: &TransactionUpdate) -> bool {
        let result = sqlx::query(
            r#"
            UPDATE ledger_transactions
            SET status = $2,
                block_number = COALESCE($3, block_number),
                gas_used = COALESCE($4, gas_used),
                gas_cost_eth = COALESCE($5, gas_cost_eth),
                confirmation_seconds = COALESCE($6, confirmation_seconds),
                error_message = COALESCE($7, error_message),
                updated_at = NOW()
            WHERE tx_hash = $1 AND status = 'PENDING'
            "#,
        )
        .bind(tx_id)
        .bind(update.status.as_str())
        .bind(update.block_number.map(to_i64))
        .bind(update.gas_used.map(to_i64))
        .bind(update.gas_cost_native)
        .bind(update.confirmation_seconds)
        .bind(&update.error_message)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() > 0 => {
                debug!(tx_hash = tx_id, status = %update.status, "Transaction status updated");
                true
            }
            Ok(_) => {
                warn!(tx_hash = tx_id, "Transaction missing or no longer pending");
                false
            }
            Err(e) => {
                error!(tx_hash = tx_id, error = %e, "Failed to update transaction status");
                false
            }
        }
    }

    async fn mark_attestation_verified(&self, tx_id: &str) -> bool {
        let result = sqlx::query(
            r#"
            UPDATE attestation_records
            SET verified = TRUE
            WHERE tx_hash = $1
            "#,
        )
        .bind(tx_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => done.rows_affected() > 0,
            Err(e) => {
                error!(tx_hash = tx_id, error = %e, "Failed to mark attestation verified");
                false
            }
        }
    }

    async fn insert_error_entry(&self, entry: &ErrorEntry) -> bool {
        let result = sqlx::query(
            r#"
            INSERT INTO error_log (
                id, error_type, message, tx_hash, retry_attempt, context, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&entry.kind)
        .bind(&entry.message)
        .bind(&entry.tx_id)
        .bind(i32::try_from(entry.retry_attempt).unwrap_or(i32::MAX))
        .bind(&entry.context)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                error!(error_type = %entry.kind, error = %e, "Failed to store error entry");
                false
            }
        }
    }

    async fn insert_health_snapshot(&self, snapshot: &HealthSnapshot) -> bool {
        let result = sqlx::query(
            r#"
            INSERT INTO network_health (
                id, network, chain_id, block_number, block_interval_secs,
                gas_price_gwei, is_synced, balance_eth, status, checked_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&snapshot.network)
        .bind(snapshot.chain_id.map(to_i64))
        .bind(snapshot.block_number.map(to_i64))
        .bind(snapshot.block_interval_secs)
        .bind(snapshot.gas_price_gwei)
        .bind(snapshot.is_synced)
        .bind(snapshot.balance_eth)
        .bind(snapshot.status.as_str())
        .bind(snapshot.checked_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "Failed to store health snapshot");
                false
            }
        }
    }

    async fn insert_batch_result(&self, result: &BatchResult) -> bool {
        let outcome = sqlx::query(
            r#"
            INSERT INTO processing_batches (
                batch_id, data_date, total_records, succeeded, failed,
                unreconciled, gas_used, gas_cost_eth, duration_seconds,
                status, processed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&result.batch_id)
        .bind(result.data_date)
        .bind(to_i64(result.total as u64))
        .bind(to_i64(result.succeeded as u64))
        .bind(to_i64(result.failed as u64))
        .bind(to_i64(result.unreconciled as u64))
        .bind(to_i64(result.gas_used))
        .bind(result.gas_cost_native)
        .bind(result.duration_seconds)
        .bind(result.status.as_str())
        .bind(result.processed_at)
        .execute(&self.pool)
        .await;

        match outcome {
            Ok(_) => true,
            Err(e) => {
                error!(batch_id = %result.batch_id, error = %e, "Failed to store batch result");
                false
            }
        }
    }

    async fn list_pending_transactions(&self) -> Vec<LedgerTransaction> {
        let rows = sqlx::query(
            r#"
            SELECT tx_hash, gas_limit, gas_price, gas_cost_eth, block_number,
                   gas_used, confirmation_seconds, status, retry_count,
                   error_message, created_at
            FROM ledger_transactions
            WHERE status = 'PENDING'
            ORDER BY created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await;

        let rows = match rows {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "Failed to list pending transactions");
                return Vec::new();
            }
        };

        rows.iter()
            .filter_map(|row| match Self::row_to_transaction(row) {
                Ok(tx) => Some(tx),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed transaction row");
                    None
                }
            })
            .collect()
    }

    async fn ping(&self) -> bool {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "Database connectivity check failed");
                false
            }
        }
    }
}
