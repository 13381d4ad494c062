//! Error type for `rollout-engine`.

use std::{convert::Infallible, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] rollout_core::Error),

  #[error("failed to read {path}: {source}")]
  Io {
    path:   PathBuf,
    source: std::io::Error,
  },

  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{url} returned {status}")]
  Status {
    url:    String,
    status: reqwest::StatusCode,
  },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// The scrub feed's worker has stopped.
  #[error("scrub feed closed")]
  FeedClosed,
}

impl Error {
  /// Whether retrying the same fetch later may succeed.
  ///
  /// Fetch-layer failures (I/O, transport, 5xx and 429 responses) are
  /// transient; bad data and resolution errors are not.
  pub fn is_retryable(&self) -> bool {
    match self {
      Self::Io { .. } => true,
      Self::Http(e) => !e.is_decode() && !e.is_builder(),
      Self::Status { status, .. } => {
        status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
      }
      Self::Core(_) | Self::Json(_) | Self::FeedClosed => false,
    }
  }
}

impl From<Infallible> for Error {
  fn from(never: Infallible) -> Self { match never {} }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
