use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the index store, the indexer and the search engine.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("index store at {path:?} is unavailable: {source}")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },

    #[error("transaction failed: {0}")]
    TransactionFailed(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("table {0} was not opened by this transaction")]
    TableNotInScope(&'static str),

    #[error("table {0} cannot be written in a read transaction")]
    ReadOnly(&'static str),

    #[error("corrupt value in table {table}: unexpected length {len}")]
    CorruptValue { table: &'static str, len: usize },
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// A failed transaction leaves other tables untouched; the whole logical
    /// operation may be attempted again.
    pub fn is_retriable(&self) -> bool {
        matches!(self, IndexError::TransactionFailed(_))
    }
}

impl From<bincode::Error> for IndexError {
    fn from(err: bincode::Error) -> Self {
        IndexError::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Codec(err.to_string())
    }
}

impl From<sled::transaction::TransactionError<IndexError>> for IndexError {
    fn from(err: sled::transaction::TransactionError<IndexError>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(inner) => inner,
            sled::transaction::TransactionError::Storage(e) => IndexError::TransactionFailed(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transaction_failures_are_retriable() {
        let failed = IndexError::TransactionFailed(sled::Error::Unsupported("x".into()));
        assert!(failed.is_retriable());
        assert!(!IndexError::Codec("bad".into()).is_retriable());
        assert!(!IndexError::TableNotInScope("positions").is_retriable());
    }

    #[test]
    fn aborts_unwrap_to_inner_error() {
        let abort = IndexError::TableNotInScope("max_tf");
        let err: IndexError = sled::transaction::TransactionError::Abort(abort).into();
        assert_eq!(err.to_string(), "table max_tf was not opened by this transaction");
    }
}
