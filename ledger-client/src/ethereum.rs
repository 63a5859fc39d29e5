//! Ethereum JSON-RPC client
//!
//! Signs legacy (gas price) transactions locally with a single private key
//! and talks to the node over plain JSON-RPC for maximum compatibility.

use crate::client::LedgerClient;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::rpc::{parse_quantity, parse_quantity_u64, to_quantity, RpcTransport};
use crate::types::*;
use crate::units;
use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, TxKind};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Blocks between the two samples used for the block interval estimate
const BLOCK_INTERVAL_SAMPLE: u64 = 10;

/// Client configuration
#[derive(Clone)]
pub struct ClientConfig {
    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// Signing key (hex, with or without 0x prefix)
    pub private_key: String,

    /// Chain id; fetched from the node once when `None`
    pub chain_id: Option<u64>,

    /// Gas price (wei) used when the node cannot be asked
    pub default_gas_price: u128,

    /// Multiplier applied to estimated gas
    pub gas_limit_margin: f64,

    /// Multiplier applied to the current gas price
    pub gas_price_premium: f64,

    /// Per-request HTTP timeout
    pub request_timeout: Duration,

    /// Interval between receipt polls while waiting
    pub receipt_poll_interval: Duration,

    /// Retry policy for submission
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Configuration with defaults for everything but endpoint and key
    pub fn new(rpc_url: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            private_key: private_key.into(),
            chain_id: None,
            default_gas_price: 20 * units::WEI_PER_GWEI,
            gas_limit_margin: 1.2,
            gas_price_premium: 1.1,
            request_timeout: Duration::from_secs(30),
            receipt_poll_interval: Duration::from_secs(2),
            retry: RetryPolicy::default(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("rpc_url", &self.rpc_url)
            .field("private_key", &"<redacted>")
            .field("chain_id", &self.chain_id)
            .field("default_gas_price", &self.default_gas_price)
            .field("gas_limit_margin", &self.gas_limit_margin)
            .field("gas_price_premium", &self.gas_price_premium)
            .field("request_timeout", &self.request_timeout)
            .field("receipt_poll_interval", &self.receipt_poll_interval)
            .field("retry", &self.retry)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    gas_used: String,
    status: Option<String>,
    effective_gas_price: Option<String>,
}

impl RpcReceipt {
    /// `None` while the receipt is not attached to a block
    fn into_receipt(self) -> Result<Option<TransactionReceipt>> {
        let block_number = match self.block_number {
            Some(number) => parse_quantity_u64(&number)?,
            None => return Ok(None),
        };

        let success = match self.status.as_deref() {
            Some(status) => parse_quantity(status)? == 1,
            // Pre-byzantium receipts carry no status
            None => true,
        };

        let effective_gas_price = self
            .effective_gas_price
            .as_deref()
            .map(parse_quantity)
            .transpose()?;

        Ok(Some(TransactionReceipt {
            tx_hash: self.transaction_hash,
            block_number,
            gas_used: parse_quantity_u64(&self.gas_used)?,
            effective_gas_price,
            success,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct RpcBlockHeader {
    timestamp: String,
}

/// Ethereum ledger client
pub struct EthereumClient {
    config: ClientConfig,
    rpc: RpcTransport,
    signer: PrivateKeySigner,
    chain_id: OnceCell<u64>,
    last_block: AtomicU64,
    last_gas_price: Mutex<Option<u128>>,
}

impl fmt::Debug for EthereumClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EthereumClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("address", &self.signer.address())
            .finish()
    }
}

impl EthereumClient {
    /// Create a client. Fails on an unparsable key or an unusable HTTP client.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let signer: PrivateKeySigner = config
            .private_key
            .trim_start_matches("0x")
            .parse()
            .map_err(|e| Error::Config(format!("Invalid private key: {}", e)))?;

        let rpc = RpcTransport::new(config.rpc_url.clone(), config.request_timeout)?;

        let chain_id = match config.chain_id {
            Some(id) => OnceCell::new_with(Some(id)),
            None => OnceCell::new(),
        };

        info!(
            rpc_url = %config.rpc_url,
            address = %signer.address(),
            "Ledger client initialized"
        );

        Ok(Self {
            config,
            rpc,
            signer,
            chain_id,
            last_block: AtomicU64::new(0),
            last_gas_price: Mutex::new(None),
        })
    }

    /// Chain id from configuration, or fetched once and cached
    pub async fn chain_id(&self) -> Result<u64> {
        self.chain_id
            .get_or_try_init(|| async {
                let id: String = self.rpc.call("eth_chainId", serde_json::json!([])).await?;
                parse_quantity_u64(&id)
            })
            .await
            .copied()
    }

    async fn fetch_block_number(&self) -> Result<u64> {
        let number: String = self.rpc.call("eth_blockNumber", serde_json::json!([])).await?;
        let number = parse_quantity_u64(&number)?;
        self.last_block.store(number, Ordering::Relaxed);
        Ok(number)
    }

    async fn fetch_gas_price(&self) -> Result<u128> {
        let price: String = self.rpc.call("eth_gasPrice", serde_json::json!([])).await?;
        let price = parse_quantity(&price)?;
        *self.last_gas_price.lock() = Some(price);
        Ok(price)
    }

    async fn fetch_receipt(&self, tx_hash: &str) -> Result<Option<TransactionReceipt>> {
        let receipt: Option<RpcReceipt> = self
            .rpc
            .call("eth_getTransactionReceipt", serde_json::json!([tx_hash]))
            .await?;

        match receipt {
            Some(receipt) => receipt.into_receipt(),
            None => Ok(None),
        }
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64> {
        let nonce: String = self
            .rpc
            .call(
                "eth_getTransactionCount",
                serde_json::json!([address.to_string(), "pending"]),
            )
            .await?;
        parse_quantity_u64(&nonce)
    }

    async fn estimate_gas(&self, request: &TransactionRequest) -> Result<u64> {
        let call = serde_json::json!({
            "from": self.signer.address().to_string(),
            "to": request.to.to_string(),
            "data": format!("0x{}", hex::encode(&request.data)),
            "value": to_quantity(u128::try_from(request.value).unwrap_or(u128::MAX)),
        });

        let estimate: String = self.rpc.call("eth_estimateGas", serde_json::json!([call])).await?;
        parse_quantity_u64(&estimate)
    }

    /// Resolve gas, price, nonce and chain id, then sign
    async fn prepare(&self, request: &TransactionRequest) -> Result<SignedTransaction> {
        let from = self.signer.address();

        let gas_limit = match request.gas_limit {
            Some(limit) => limit,
            None => {
                let estimate = self.estimate_gas(request).await?;
                let limit = units::scale(u128::from(estimate), self.config.gas_limit_margin);
                u64::try_from(limit).unwrap_or(u64::MAX)
            }
        };

        let gas_price = match request.gas_price {
            Some(price) => price,
            None => self.recommended_gas_price().await,
        };

        let nonce = match request.nonce {
            Some(nonce) => nonce,
            None => self.pending_nonce(from).await?,
        };

        let chain_id = self.chain_id().await?;

        let tx = TxLegacy {
            chain_id: Some(chain_id),
            nonce,
            gas_price,
            gas_limit,
            to: TxKind::Call(request.to),
            value: request.value,
            input: request.data.clone(),
        };

        let signature = self
            .signer
            .sign_hash(&tx.signature_hash())
            .await
            .map_err(|e| Error::Signing(e.to_string()))?;

        let signed = tx.into_signed(signature);
        let tx_hash = format!("{:#x}", signed.hash());

        let mut raw = Vec::new();
        TxEnvelope::Legacy(signed).encode_2718(&mut raw);

        Ok(SignedTransaction {
            raw: format!("0x{}", hex::encode(&raw)),
            submitted: SubmittedTransaction {
                tx_hash,
                nonce,
                gas_limit,
                gas_price,
                to: request.to,
                value: request.value,
            },
        })
    }

    /// Broadcast already signed bytes. A node that has seen them counts as accepted.
    async fn broadcast(&self, signed: &SignedTransaction) -> Result<String> {
        let sent: Result<String> = self
            .rpc
            .call("eth_sendRawTransaction", serde_json::json!([signed.raw]))
            .await;

        match sent {
            Ok(tx_hash) => Ok(tx_hash),
            Err(Error::Rpc { message, .. }) if is_already_known(&message) => {
                debug!(
                    tx_hash = %signed.submitted.tx_hash,
                    "Node already has the transaction"
                );
                Ok(signed.submitted.tx_hash.clone())
            }
            Err(e) => Err(e),
        }
    }
}

/// Signed transaction ready for (re)broadcast
struct SignedTransaction {
    raw: String,
    submitted: SubmittedTransaction,
}

fn is_already_known(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("already known") || message.contains("known transaction")
}

#[async_trait]
impl LedgerClient for EthereumClient {
    fn signer_address(&self) -> Address {
        self.signer.address()
    }

    async fn current_block_height(&self) -> u64 {
        match self.fetch_block_number().await {
            Ok(number) => number,
            Err(e) => {
                let cached = self.last_block.load(Ordering::Relaxed);
                error!(error = %e, cached, "Failed to get current block");
                cached
            }
        }
    }

    async fn current_gas_price(&self) -> u128 {
        match self.fetch_gas_price().await {
            Ok(price) => price,
            Err(e) => {
                let fallback = self
                    .last_gas_price
                    .lock()
                    .unwrap_or(self.config.default_gas_price);
                error!(error = %e, fallback = %fallback, "Failed to get gas price");
                fallback
            }
        }
    }

    async fn recommended_gas_price(&self) -> u128 {
        match self.fetch_gas_price().await {
            Ok(current) => {
                let recommended = units::scale(current, self.config.gas_price_premium);
                debug!(
                    current = %current,
                    recommended = %recommended,
                    "Recommended gas price calculated"
                );
                recommended
            }
            Err(e) => {
                error!(error = %e, "Failed to calculate recommended gas price");
                self.config.default_gas_price
            }
        }
    }

    async fn estimate_block_interval(&self) -> f64 {
        let current = match self.fetch_block_number().await {
            Ok(number) => number,
            Err(e) => {
                error!(error = %e, "Failed to estimate block interval");
                return DEFAULT_BLOCK_INTERVAL_SECS;
            }
        };

        if current < 2 {
            return DEFAULT_BLOCK_INTERVAL_SECS;
        }

        let older = current.saturating_sub(BLOCK_INTERVAL_SAMPLE);
        let timestamps = (
            self.block_timestamp(current).await,
            self.block_timestamp(older).await,
        );

        match timestamps {
            (Ok(recent_ts), Ok(older_ts)) => {
                let blocks = current - older;
                let seconds = recent_ts.saturating_sub(older_ts);
                let interval = seconds as f64 / blocks as f64;
                debug!(blocks, seconds, interval, "Calculated average block interval");
                interval
            }
            (Err(e), _) | (_, Err(e)) => {
                error!(error = %e, "Failed to read block timestamps");
                DEFAULT_BLOCK_INTERVAL_SECS
            }
        }
    }

    async fn is_synced(&self) -> bool {
        match self
            .rpc
            .call::<serde_json::Value>("eth_syncing", serde_json::json!([]))
            .await
        {
            Ok(serde_json::Value::Bool(false)) => true,
            Ok(_) => false,
            Err(e) => {
                error!(error = %e, "Failed to check sync status");
                false
            }
        }
    }

    async fn balance(&self) -> u128 {
        let result: Result<u128> = async {
            let balance: String = self
                .rpc
                .call(
                    "eth_getBalance",
                    serde_json::json!([self.signer.address().to_string(), "latest"]),
                )
                .await?;
            parse_quantity(&balance)
        }
        .await;

        result.unwrap_or_else(|e| {
            error!(error = %e, "Failed to get balance");
            0
        })
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64> {
        let block: Option<RpcBlockHeader> = self
            .rpc
            .call(
                "eth_getBlockByNumber",
                serde_json::json!([to_quantity(u128::from(block_number)), false]),
            )
            .await?;

        let block = block
            .ok_or_else(|| Error::InvalidResponse(format!("Block {} not found", block_number)))?;
        parse_quantity_u64(&block.timestamp)
    }

    async fn network_info(&self) -> Result<NetworkInfo> {
        let chain_id: String = self.rpc.call("eth_chainId", serde_json::json!([])).await?;
        let chain_id = parse_quantity_u64(&chain_id)?;
        let block_number = self.fetch_block_number().await?;

        Ok(NetworkInfo {
            chain_id,
            block_number,
            gas_price: self.current_gas_price().await,
            block_interval_secs: self.estimate_block_interval().await,
            is_synced: self.is_synced().await,
        })
    }

    async fn submit(&self, request: TransactionRequest) -> Result<SubmittedTransaction> {
        // Signed once so every retry rebroadcasts the same nonce and bytes
        let result = match self
            .config
            .retry
            .execute("build_transaction", || self.prepare(&request))
            .await
        {
            Ok(signed) => self
                .config
                .retry
                .execute("send_transaction", || self.broadcast(&signed))
                .await
                .map(|tx_hash| {
                    info!(
                        tx_hash = %tx_hash,
                        nonce = signed.submitted.nonce,
                        gas_limit = signed.submitted.gas_limit,
                        gas_price = %signed.submitted.gas_price,
                        "Transaction sent"
                    );
                    SubmittedTransaction {
                        tx_hash,
                        ..signed.submitted.clone()
                    }
                }),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            error!(
                to = %request.to,
                error = %e,
                "Error sending transaction"
            );
        }

        result
    }

    async fn wait_for_receipt(&self, tx_hash: &str, timeout: Duration) -> ReceiptOutcome {
        let started = Instant::now();

        if timeout.is_zero() {
            warn!(tx_hash, "Receipt wait requested with an expired deadline");
            return ReceiptOutcome::Timeout {
                waited: Duration::ZERO,
            };
        }

        let poll = async {
            loop {
                match self.fetch_receipt(tx_hash).await {
                    Ok(Some(receipt)) => return Ok(receipt),
                    Ok(None) => {}
                    Err(e) if !e.is_retryable() => return Err(e),
                    Err(e) => debug!(tx_hash, error = %e, "Receipt poll failed"),
                }
                tokio::time::sleep(self.config.receipt_poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(Ok(receipt)) => {
                let waited = started.elapsed();
                info!(
                    tx_hash,
                    block_number = receipt.block_number,
                    gas_used = receipt.gas_used,
                    waited_secs = waited.as_secs(),
                    "Transaction confirmed"
                );
                ReceiptOutcome::Mined { receipt, waited }
            }
            Ok(Err(e)) => {
                error!(tx_hash, error = %e, "Error waiting for receipt");
                ReceiptOutcome::Error(e.to_string())
            }
            Err(_) => {
                error!(tx_hash, timeout_secs = timeout.as_secs(), "Transaction receipt timeout");
                ReceiptOutcome::Timeout {
                    waited: started.elapsed(),
                }
            }
        }
    }

    async fn transaction_status(&self, tx_hash: &str) -> TxStatus {
        match self.fetch_receipt(tx_hash).await {
            Ok(None) => TxStatus::Pending,
            Ok(Some(receipt)) if receipt.success => TxStatus::Confirmed(receipt),
            Ok(Some(receipt)) => TxStatus::Failed(receipt),
            Err(e) => {
                error!(tx_hash, error = %e, "Error getting transaction status");
                TxStatus::Error(e.to_string())
            }
        }
    }
}
