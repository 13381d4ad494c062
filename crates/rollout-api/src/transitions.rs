//! Handlers for the map layer: transitions, the per-operator area summary and
//! the scrub slider's month domain.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/transitions` | Optional `as_of`, `operator`, `city` |
//! | `GET`  | `/summary` | Active area per operator; optional `as_of` |
//! | `GET`  | `/domain` | Month starts spanning the dataset |

use axum::{
  Json,
  extract::{Query, State},
};
use chrono::{DateTime, Utc};
use rollout_core::source::EventSource;
use rollout_engine::{OperatorArea, TransitionFilter, TransitionView};
use serde::{Deserialize, Serialize};

use crate::{
  AppState,
  error::ApiError,
  params::{AsOfParams, instant_or_now},
};

// ─── Transitions ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TransitionParams {
  pub as_of:    Option<String>,
  pub operator: Option<String>,
  pub city:     Option<String>,
}

/// `GET /transitions[?as_of=...][&operator=...][&city=...]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<TransitionParams>,
) -> Result<Json<TransitionView>, ApiError>
where
  S: EventSource,
{
  let as_of = instant_or_now(params.as_of.as_deref())?;
  let filter = TransitionFilter { operator: params.operator, city: params.city };
  Ok(Json(state.engine.read().await.transitions(as_of, &filter)))
}

// ─── Summary ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Summary {
  pub as_of:     DateTime<Utc>,
  pub operators: Vec<OperatorArea>,
}

/// `GET /summary[?as_of=...]`
pub async fn summary<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<AsOfParams>,
) -> Result<Json<Summary>, ApiError>
where
  S: EventSource,
{
  let as_of = params.instant()?;
  let operators = state.engine.read().await.area_by_operator(as_of);
  Ok(Json(Summary { as_of, operators }))
}

// ─── Domain ───────────────────────────────────────────────────────────────────

/// `GET /domain`
pub async fn domain<S>(State(state): State<AppState<S>>) -> Json<Vec<DateTime<Utc>>>
where
  S: EventSource,
{
  Json(state.engine.read().await.month_domain())
}
