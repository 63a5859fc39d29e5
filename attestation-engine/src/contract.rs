//! Alarm registry contract adapter
//!
//! Encodes the `registrarAlarmaDiaria` call and hands it to the ledger
//! client. Encoding happens before any network access, so a malformed
//! argument can never produce a partial submission.

use crate::error::{Error, Result};
use crate::types::IntegrityHash;
use alloy::primitives::{Address, B256, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use chrono::NaiveDate;
use ledger_client::{LedgerClient, SubmittedTransaction, TransactionRequest};
use std::sync::Arc;
use tracing::{debug, info};

sol! {
    /// Registers one device's alarm aggregate for a day
    function registrarAlarmaDiaria(
        uint256 date,
        string device_id,
        string client_id,
        uint256 alarm_count,
        uint256 max_concentration,
        bytes32 integrity_hash
    );
}

/// Arguments of a daily alarm registration
#[derive(Debug, Clone, PartialEq)]
pub struct DailyAlarmCall {
    /// Attested day
    pub date: NaiveDate,

    /// Device identifier
    pub device_id: String,

    /// Client identifier
    pub client_id: String,

    /// Number of alarms
    pub alarm_count: u64,

    /// Highest concentration, truncated to an integer on-chain
    pub max_concentration: f64,

    /// Integrity digest as `0x` hex
    pub integrity_hash: String,
}

impl DailyAlarmCall {
    /// ABI-encoded call data including the function selector
    pub fn encode(&self) -> Result<Vec<u8>> {
        let hash: IntegrityHash = self.integrity_hash.parse()?;

        if !self.max_concentration.is_finite() || self.max_concentration < 0.0 {
            return Err(Error::Encoding(format!(
                "Max concentration must be a non-negative number, got {}",
                self.max_concentration
            )));
        }

        let timestamp = self
            .date
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc().timestamp())
            .ok_or_else(|| Error::Encoding(format!("Invalid date {}", self.date)))?;
        let timestamp = u64::try_from(timestamp)
            .map_err(|_| Error::Encoding(format!("Date {} precedes the unix epoch", self.date)))?;

        let call = registrarAlarmaDiariaCall {
            date: U256::from(timestamp),
            device_id: self.device_id.clone(),
            client_id: self.client_id.clone(),
            alarm_count: U256::from(self.alarm_count),
            max_concentration: U256::from(self.max_concentration.trunc() as u128),
            integrity_hash: B256::from(*hash.as_bytes()),
        };

        Ok(call.abi_encode())
    }
}

/// Client for the on-chain alarm registry
pub struct AlarmRegistry {
    ledger: Arc<dyn LedgerClient>,
    contract_address: Address,
    gas_limit: Option<u64>,
}

impl std::fmt::Debug for AlarmRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlarmRegistry")
            .field("contract_address", &self.contract_address)
            .field("gas_limit", &self.gas_limit)
            .finish()
    }
}

impl AlarmRegistry {
    /// Create an adapter for the contract at `contract_address`
    pub fn new(ledger: Arc<dyn LedgerClient>, contract_address: Address) -> Self {
        Self {
            ledger,
            contract_address,
            gas_limit: None,
        }
    }

    /// Use a fixed gas limit instead of estimating one per call
    pub fn with_gas_limit(mut self, gas_limit: Option<u64>) -> Self {
        self.gas_limit = gas_limit;
        self
    }

    /// Contract address
    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    /// Build the transaction request for a call
    pub fn build_request(&self, call: &DailyAlarmCall) -> Result<TransactionRequest> {
        let data = call.encode()?;
        let request = TransactionRequest::call(self.contract_address, data);

        Ok(match self.gas_limit {
            Some(limit) => request.with_gas_limit(limit),
            None => request,
        })
    }

    /// Encode, sign and broadcast a registration
    pub async fn register_daily_alarm(&self, call: &DailyAlarmCall) -> Result<SubmittedTransaction> {
        let request = self.build_request(call)?;

        debug!(
            device_id = %call.device_id,
            date = %call.date,
            alarm_count = call.alarm_count,
            "Registering daily alarm"
        );

        let submitted = self.ledger.submit(request).await?;

        info!(
            device_id = %call.device_id,
            tx_hash = %submitted.tx_hash,
            "Daily alarm registered"
        );

        Ok(submitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call() -> DailyAlarmCall {
        DailyAlarmCall {
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            device_id: "GAS-001".to_string(),
            client_id: "client-7".to_string(),
            alarm_count: 12,
            max_concentration: 87.9,
            integrity_hash: format!("0x{}", "11".repeat(32)),
        }
    }

    #[test]
    fn test_encode_selector_and_arguments() {
        let data = call().encode().unwrap();
        assert_eq!(&data[..4], &registrarAlarmaDiariaCall::SELECTOR);

        let decoded = registrarAlarmaDiariaCall::abi_decode(&data).unwrap();
        assert_eq!(decoded.date, U256::from(1_709_251_200u64));
        assert_eq!(decoded.device_id, "GAS-001");
        assert_eq!(decoded.client_id, "client-7");
        assert_eq!(decoded.alarm_count, U256::from(12u64));
        assert_eq!(decoded.max_concentration, U256::from(87u64));
        assert_eq!(decoded.integrity_hash, B256::repeat_byte(0x11));
    }

    #[test]
    fn test_malformed_hash_rejected() {
        let mut bad = call();
        bad.integrity_hash = "0xdeadbeef".to_string();
        assert!(matches!(bad.encode(), Err(Error::Encoding(_))));

        bad.integrity_hash = "not-hex".to_string();
        assert!(matches!(bad.encode(), Err(Error::Encoding(_))));
    }

    #[test]
    fn test_negative_concentration_rejected() {
        let mut bad = call();
        bad.max_concentration = -1.0;
        assert!(matches!(bad.encode(), Err(Error::Encoding(_))));

        bad.max_concentration = f64::NAN;
        assert!(matches!(bad.encode(), Err(Error::Encoding(_))));
    }
}
