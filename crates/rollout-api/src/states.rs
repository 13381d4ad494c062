//! Handlers for `/states` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/states` | Every entity; optional `?as_of` |
//! | `GET`  | `/states/{id}` | 404 if the entity is unknown |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use rollout_core::{source::EventSource, state::ResolvedState};

use crate::{AppState, error::ApiError, params::AsOfParams};

/// `GET /states[?as_of=<instant>]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<AsOfParams>,
) -> Result<Json<Vec<ResolvedState>>, ApiError>
where
  S: EventSource,
{
  let as_of = params.instant()?;
  Ok(Json(state.engine.read().await.resolve_all_states(as_of)))
}

/// `GET /states/{id}[?as_of=<instant>]`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
  Query(params): Query<AsOfParams>,
) -> Result<Json<ResolvedState>, ApiError>
where
  S: EventSource,
{
  let as_of = params.instant()?;
  let resolved = state.engine.read().await.resolve_state(&id, as_of)?;
  Ok(Json(resolved))
}
