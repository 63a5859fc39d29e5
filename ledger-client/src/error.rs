//! Error types for the ledger client

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger client errors
#[derive(Error, Debug)]
pub enum Error {
    /// RPC endpoint unreachable, timed out, or returned a non-JSON body
    #[error("Transport error: {0}")]
    Transport(String),

    /// JSON-RPC error object returned by the node
    #[error("RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message reported by the node
        message: String,
    },

    /// The contract reverted the call (on-chain or during gas estimation)
    #[error("Contract rejected call: {0}")]
    ContractRejection(String),

    /// Malformed argument or call data
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Transaction signing failed
    #[error("Signing error: {0}")]
    Signing(String),

    /// The node answered with something we cannot interpret
    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),

    /// Invalid client configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether the submission retry policy may try the operation again.
    ///
    /// Contract rejections are deterministic: resubmitting the same call
    /// burns gas for the same revert.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Rpc { .. } => true,

            Error::ContractRejection(_) => false,
            Error::Encoding(_) => false,
            Error::Signing(_) => false,
            Error::InvalidResponse(_) => false,
            Error::Config(_) => false,
            Error::Serialization(_) => false,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}
