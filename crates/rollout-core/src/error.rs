//! Error types for `rollout-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A raw record whose date could not be parsed (or which carries no date
  /// at all), or which cannot be attributed to an entity.
  #[error("malformed record {record}: {reason}")]
  MalformedEvent { record: String, reason: String },

  #[error("unknown entity: {0}")]
  UnknownEntity(String),

  #[error("unparsable instant: {0:?}")]
  UnparsableInstant(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
