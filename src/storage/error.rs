use thiserror::Error;

/// Errors the Storage Gateway can raise (§4.1). Kept separate from
/// [`crate::error::EngineError`] so the gateway can be unit-tested without
/// pulling in the rest of the engine; `EngineError` wraps this type at the
/// pipeline boundary via `#[from]`.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Db(#[from] sled::Error),

    #[error("transaction aborted: {0}")]
    Transaction(String),

    #[error("mutator attempted to change record identity: {0}")]
    IdentityChanged(String),
}

impl<E> From<sled::transaction::TransactionError<E>> for StorageError
where
    E: Into<StorageError>,
{
    fn from(err: sled::transaction::TransactionError<E>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(inner) => inner.into(),
            sled::transaction::TransactionError::Storage(db) => StorageError::Db(db),
        }
    }
}
