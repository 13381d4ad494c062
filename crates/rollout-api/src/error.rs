//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// A transient upstream failure; the client may retry.
  #[error("service unavailable: {0}")]
  Unavailable(#[source] rollout_engine::Error),

  #[error("engine error: {0}")]
  Engine(#[source] rollout_engine::Error),
}

impl From<rollout_engine::Error> for ApiError {
  fn from(err: rollout_engine::Error) -> Self {
    use rollout_core::Error as Core;
    use rollout_engine::Error as Engine;

    match err {
      Engine::Core(Core::UnknownEntity(id)) => Self::NotFound(format!("entity {id} not found")),
      Engine::Core(Core::UnparsableInstant(s)) => {
        Self::BadRequest(format!("unparsable instant {s:?}"))
      }
      err if err.is_retryable() => Self::Unavailable(err),
      err => Self::Engine(err),
    }
  }
}

impl From<rollout_core::Error> for ApiError {
  fn from(err: rollout_core::Error) -> Self { rollout_engine::Error::Core(err).into() }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Unavailable(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
      ApiError::Engine(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
