//! Error types shared by the store, service and HTTP layers.

use thiserror::Error;

/// Failures raised by an [`crate::store::OrderStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sheet request failed: {0}")]
    Http(String),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("could not decode stored data: {0}")]
    Decode(String),

    #[error("store lock poisoned")]
    Lock,

    #[error("store is not configured: {0}")]
    Config(String),
}

/// Errors surfaced to callers of the order service and the HTTP commands.
#[derive(Debug, Error)]
pub enum CrmError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Locked(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("credential store: {0}")]
    Credential(String),

    #[error("receipt: {0}")]
    Receipt(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type CrmResult<T> = Result<T, CrmError>;
