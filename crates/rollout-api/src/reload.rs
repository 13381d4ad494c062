//! `POST /reload`: re-fetch the dataset from the configured source.
//!
//! The replacement engine is built beside the current one, with no lock held
//! while the source is fetched, and swapped in only on success. A failed
//! reload leaves the served data untouched.

use axum::{Json, extract::State};
use rollout_core::source::EventSource;
use rollout_engine::{Engine, LoadSummary};
use tracing::{info, warn};

use crate::{AppState, error::ApiError};

/// `POST /reload`. Responds 503 when the source is temporarily unreachable.
pub async fn handler<S>(State(state): State<AppState<S>>) -> Result<Json<LoadSummary>, ApiError>
where
  S: EventSource + 'static,
  rollout_engine::Error: From<S::Error>,
{
  let summary = Engine::refresh_shared(&state.engine, state.source.as_ref())
    .await
    .inspect_err(|e| warn!(error = %e, "reload failed"))?;
  info!(
    entities = summary.entities,
    events = summary.events,
    geometries = summary.geometries,
    "reloaded rollout dataset"
  );
  Ok(Json(summary))
}
