//! Error type for `warden-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] warden_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// An advisory lock was requested outside a transaction. This is a bug in
  /// the caller, never a condition to retry.
  #[error("advisory xact lock requires an active transaction")]
  NoTransaction,

  #[error("session already has an active transaction")]
  TransactionActive,

  /// The session holds the shared lock and asked for the exclusive one. Take
  /// the exclusive lock first when a transaction reads and then writes.
  #[error("cannot upgrade a shared advisory lock to exclusive")]
  LockUpgrade,

  /// The graph engine call failed; the source is the engine's own error.
  #[error("graph engine error: {0}")]
  Engine(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// The engine's bulk-check response does not line up with the request.
  #[error("bulk check response mismatch: {0}")]
  BulkCheckMismatch(String),
}

impl Error {
  pub(crate) fn engine(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Engine(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
