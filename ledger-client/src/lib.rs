//! Ledger Client
//!
//! Low-level access to an EVM-compatible ledger over JSON-RPC.
//!
//! # Responsibilities
//!
//! The client is the sole owner of the network connection and the signing
//! key. It provides:
//!
//! 1. **Chain reads**: block height, gas price, block interval, sync status
//! 2. **Submission**: gas estimation, signing and broadcast with a retry policy
//! 3. **Confirmation**: blocking receipt wait with a deadline, and a
//!    non-blocking point-in-time status check
//!
//! Read helpers fail soft: callers treat them as advisory, so transport errors
//! are logged and a cached or configured default is returned instead.
//!
//! # Example
//!
//! ```no_run
//! use ledger_client::{ClientConfig, EthereumClient, LedgerClient};
//!
//! #[tokio::main]
//! async fn main() -> ledger_client::Result<()> {
//!     let config = ClientConfig::new("http://localhost:8545", "0x<private-key>");
//!     let client = EthereumClient::new(config)?;
//!
//!     let height = client.current_block_height().await;
//!     let price = client.recommended_gas_price().await;
//!     println!("block {} gas price {}", height, price);
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

pub mod client;
pub mod error;
pub mod ethereum;
pub mod retry;
pub mod rpc;
pub mod types;
pub mod units;

// Re-exports
pub use client::LedgerClient;
pub use error::{Error, Result};
pub use ethereum::{ClientConfig, EthereumClient};
pub use retry::RetryPolicy;
pub use types::*;
