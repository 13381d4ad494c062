//! Handlers for `/entities` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entities` | All tracked deployments |
//! | `GET`  | `/entities/{id}/ticks` | Timeline ticks; `?as_of` stands in for "now" |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use rollout_core::{entity::Entity, source::EventSource, ticks::TimelineTick};

use crate::{AppState, error::ApiError, params::AsOfParams};

/// `GET /entities`
pub async fn list<S>(State(state): State<AppState<S>>) -> Json<Vec<Entity>>
where
  S: EventSource,
{
  Json(state.engine.read().await.entities().cloned().collect())
}

/// `GET /entities/{id}/ticks[?as_of=<instant>]`
pub async fn ticks<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<String>,
  Query(params): Query<AsOfParams>,
) -> Result<Json<Vec<TimelineTick>>, ApiError>
where
  S: EventSource,
{
  let now = params.instant()?;
  let ticks = state.engine.read().await.assemble_ticks(&id, now)?;
  Ok(Json(ticks))
}
