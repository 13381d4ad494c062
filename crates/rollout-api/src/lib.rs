//! JSON REST API for the rollout tracker.
//!
//! Exposes an axum [`Router`] over a shared [`Engine`](rollout_engine::Engine)
//! and the [`EventSource`] it reloads from. Tracing, TLS and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", rollout_api::api_router(state))
//! ```

pub mod entities;
pub mod error;
pub mod params;
pub mod reload;
pub mod states;
pub mod transitions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use rollout_core::source::EventSource;
use rollout_engine::SharedEngine;

pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub engine: SharedEngine,
  pub source: Arc<S>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      engine: Arc::clone(&self.engine),
      source: Arc::clone(&self.source),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router over `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: EventSource + 'static,
  rollout_engine::Error: From<S::Error>,
{
  Router::new()
    // Entities
    .route("/entities", get(entities::list::<S>))
    .route("/entities/{id}/ticks", get(entities::ticks::<S>))
    // States
    .route("/states", get(states::list::<S>))
    .route("/states/{id}", get(states::get_one::<S>))
    // Map layer
    .route("/transitions", get(transitions::list::<S>))
    .route("/summary", get(transitions::summary::<S>))
    .route("/domain", get(transitions::domain::<S>))
    // Maintenance
    .route("/reload", post(reload::handler::<S>))
    .with_state(state)
}
