//! Minimal JSON-RPC 2.0 transport over HTTP

use crate::error::{Error, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

/// JSON-RPC error code used by geth-style nodes for reverted calls
const EXECUTION_REVERTED_CODE: i64 = 3;

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    data: Option<serde_json::Value>,
}

impl JsonRpcError {
    fn is_revert(&self) -> bool {
        self.code == EXECUTION_REVERTED_CODE
            || self.message.to_lowercase().contains("execution reverted")
    }

    fn into_error(self) -> Error {
        if self.is_revert() {
            let detail = match self.data {
                Some(data) => format!("{} ({})", self.message, data),
                None => self.message,
            };
            Error::ContractRejection(detail)
        } else {
            Error::Rpc {
                code: self.code,
                message: self.message,
            }
        }
    }
}

/// HTTP JSON-RPC transport bound to one endpoint
#[derive(Debug)]
pub struct RpcTransport {
    client: Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcTransport {
    /// Create a transport with a per-request timeout
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Send a request and decode its `result`.
    ///
    /// A `null` result decodes into `Option::None` when `T` is an `Option`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id
        });

        debug!(method, id, "JSON-RPC request");

        let response = self.client.post(&self.url).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Transport(format!(
                "{} returned HTTP {}",
                method, status
            )));
        }

        let response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("{} response parse error: {}", method, e)))?;

        if let Some(err) = response.error {
            return Err(err.into_error());
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result)
            .map_err(|e| Error::InvalidResponse(format!("{}: {}", method, e)))
    }
}

/// Parse a hex quantity (`0x1a`) into an integer
pub fn parse_quantity(value: &str) -> Result<u128> {
    let digits = value.trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| Error::InvalidResponse(format!("Invalid quantity '{}': {}", value, e)))
}

/// Parse a hex quantity that must fit in 64 bits
pub fn parse_quantity_u64(value: &str) -> Result<u64> {
    let quantity = parse_quantity(value)?;
    u64::try_from(quantity)
        .map_err(|_| Error::InvalidResponse(format!("Quantity '{}' overflows u64", value)))
}

/// Encode an integer as a hex quantity
pub fn to_quantity(value: u128) -> String {
    format!("0x{:x}", value)
}
