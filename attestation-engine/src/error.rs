//! Error types for the attestation engine

use thiserror::Error;

/// Result type for attestation operations
pub type Result<T> = std::result::Result<T, Error>;

/// Attestation errors
#[derive(Error, Debug)]
pub enum Error {
    /// Ledger client error
    #[error("Ledger error: {0}")]
    Ledger(#[from] ledger_client::Error),

    /// Call arguments could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Persistence backend error
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Aggregation source error
    #[error("Source error: {0}")]
    Source(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Scheduler error
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Type tag recorded on error entries
    pub fn kind(&self) -> &'static str {
        use ledger_client::Error as LedgerError;

        match self {
            Error::Ledger(e) => match e {
                LedgerError::Transport(_) => "transport",
                LedgerError::Rpc { .. } | LedgerError::InvalidResponse(_) => "rpc",
                LedgerError::ContractRejection(_) => "contract_rejection",
                LedgerError::Encoding(_) => "encoding",
                LedgerError::Signing(_) => "signing",
                LedgerError::Config(_) => "configuration",
                LedgerError::Serialization(_) => "internal",
            },
            Error::Encoding(_) => "encoding",
            Error::Persistence(_) => "persistence",
            Error::Source(_) => "source",
            Error::Config(_) => "configuration",
            Error::Scheduler(_) | Error::Io(_) | Error::Other(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for Error {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        Error::Scheduler(err.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}
