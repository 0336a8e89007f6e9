//! Error types for the ledger chaincode

use crate::types::Amount;
use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
///
/// Every error aborts the whole invocation: the simulation that produced it is
/// discarded, so no balance write or log entry from a failed call is ever
/// committed.
#[derive(Error, Debug)]
pub enum Error {
    /// Non-positive amount, malformed identifier, bad arguments
    #[error("validation error: {0}")]
    Validation(String),

    /// Role mismatch or caller does not own the debited account
    #[error("authorization error: {0}")]
    Authorization(String),

    /// Debit larger than the available balance
    #[error("insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds {
        /// Balance at the time of the debit check
        available: Amount,
        /// Amount the caller tried to move
        requested: Amount,
    },

    /// Underlying store unavailable or holding an undecodable document
    #[error("state store error: {0}")]
    StateStore(String),

    /// A key read during simulation changed before commit
    #[error("state store error: MVCC read conflict on key {key}")]
    ReadConflict {
        /// First conflicting key
        key: String,
    },

    /// JSON document (de)serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Binary value encoding error (RocksDB values)
    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Concurrency error (committer mailbox closed, etc.)
    #[error("concurrency error: {0}")]
    Concurrency(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client-facing classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// Bad input
    ValidationError,
    /// Caller is not allowed to perform the operation
    AuthorizationError,
    /// Client-correctable balance shortfall
    InsufficientFunds,
    /// Store failure or conflict; the caller may resubmit
    StateStoreError,
}

impl Error {
    /// Classify the error for the gateway
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::Authorization(_) => ErrorKind::AuthorizationError,
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::StateStore(_)
            | Error::ReadConflict { .. }
            | Error::Serialization(_)
            | Error::Encoding(_)
            | Error::Config(_)
            | Error::Concurrency(_)
            | Error::Io(_) => ErrorKind::StateStoreError,
        }
    }

    /// Only a balance shortfall can be fixed by the client without operator help
    pub fn is_client_correctable(&self) -> bool {
        matches!(self, Error::InsufficientFunds { .. })
    }

    /// Status code used in the gateway response envelope
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::ValidationError => 400,
            ErrorKind::AuthorizationError => 403,
            ErrorKind::InsufficientFunds => 409,
            ErrorKind::StateStoreError => 500,
        }
    }

    /// Shorthand for a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Shorthand for an authorization error
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Error::Authorization(msg.into())
    }
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::StateStore(err.to_string())
    }
}
