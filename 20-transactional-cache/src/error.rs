use std::io;

use thiserror::Error;

/// Failures surfaced by the store, the remote binding and the transaction manager.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Get or Unset on a key that is not present. Recoverable.
    #[error("key '{0}' not found")]
    NotFound(String),

    /// Rollback with no open transaction.
    #[error("no open transaction")]
    NoOpenTransaction,

    /// Connection refused, dropped or timed out.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    /// The peer answered with something that does not fit the call.
    #[error("malformed response: {0}")]
    Protocol(String),

    /// The server rejected the call for a reason other than a missing key.
    #[error("server error: {0}")]
    Remote(String),
}

impl CacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CacheError::NotFound(_))
    }
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;
