//! Error types for `warden-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown relation: {0:?}")]
  UnknownRelation(String),

  #[error("unknown subject type: {0:?}")]
  UnknownSubjectType(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
