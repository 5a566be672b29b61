//! Error taxonomy for the transfer coordinator, per the error-handling design.
//!
//! Each component owns a `thiserror` enum; [`Error`] composes them for
//! anything that crosses a component boundary (e.g. the CLI, or the
//! coordinator calling into the mover or the pool).

use thiserror::Error;

/// Errors raised by the data-mover JSON-RPC facade.
#[derive(Error, Debug)]
pub enum MoverError {
    #[error("data mover request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("data mover returned malformed JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("data mover RPC error: {message}")]
    Rpc { message: String },

    #[error("data mover copy job {job_id} failed: {reason}")]
    CopyFailed { job_id: i64, reason: String },

    #[error("data mover call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("data mover copy aborted by shutdown")]
    Aborted,
}

impl MoverError {
    /// True for failures the worker's retry loop should treat as worth
    /// retrying: network errors and timeouts. Malformed responses are not,
    /// since a retry would hit the same parsing bug again.
    pub fn is_transient(&self) -> bool {
        matches!(self, MoverError::Http(_) | MoverError::Timeout(_))
    }
}


/// Errors raised by the credential pool.
#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("no credentials registered for provider {0}")]
    NoCredentials(String),

    #[error("all credentials for provider {0} are at or above their safety margin")]
    QuotaExhausted(String),

    #[error("{0} is not a directory")]
    NotADirectory(std::path::PathBuf),

    #[error("unknown credential id: {0}")]
    UnknownCredential(String),

    #[error("I/O error reading {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the coordinator.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("a transfer job is already in progress")]
    TransferInProgress,

    #[error("no transfer job is currently active")]
    NoActiveJob,

    #[error("enumeration failed: {0}")]
    EnumerationFailed(String),

    #[error(transparent)]
    Mover(#[from] MoverError),
}

/// Top-level error type. CLI commands map variants to process exit codes.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Mover(#[from] MoverError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
