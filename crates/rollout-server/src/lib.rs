//! HTTP server for the rollout tracker.
//!
//! Loads the dataset from the configured source into an
//! [`Engine`](rollout_engine::Engine) and serves the JSON API under `/api`.

use std::path::Path;

use anyhow::Context as _;
use axum::Router;
use rollout_api::{AppState, api_router};
use rollout_core::source::EventSource;
use rollout_engine::{EngineOptions, SourceConfig};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

/// Prefix of environment variables overriding the configuration file, e.g.
/// `ROLLOUT_PORT=9000` or `ROLLOUT_ENGINE__TICK_MIN_GAP=2.5`.
pub const ENV_PREFIX: &str = "ROLLOUT";

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and the
/// environment.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:   String,
  pub port:   u16,
  pub source: SourceConfig,
  pub engine: EngineOptions,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      host:   "127.0.0.1".to_string(),
      port:   8080,
      source: SourceConfig::default(),
      engine: EngineOptions::default(),
    }
  }
}

impl ServerConfig {
  /// Read `path` (if it exists), then apply `ROLLOUT_*` overrides.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix(ENV_PREFIX)
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The complete application: the API nested under `/api`, with request
/// tracing.
pub fn app<S>(state: AppState<S>) -> Router
where
  S: EventSource + 'static,
  rollout_engine::Error: From<S::Error>,
{
  Router::new()
    .nest("/api", api_router(state))
    .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use rollout_core::{geometry::Geometry, source::RawLog};
  use rollout_engine::{Engine, MemorySource};
  use serde_json::{Value, json};
  use tokio::sync::RwLock;
  use tower::ServiceExt;

  use super::*;

  fn raw_log() -> RawLog {
    serde_json::from_value(json!({
      "entities": [
        { "id": "waymo-phx", "operator": "Waymo", "city": "Phoenix" },
        { "id": "cruise-sf", "operator": "Cruise", "city": "San Francisco" }
      ],
      "events": [
        { "entity_id": "waymo-phx", "type": "service_created", "date": "2020-01-01",
          "details": { "access": "closed_testing" } },
        { "entity_id": "waymo-phx", "type": "service_updated", "date": "2021-06-01",
          "details": { "access": "public_service" } },
        { "entity_id": "cruise-sf", "type": "service_created", "date": "2022-02-01",
          "details": { "access": "public" } },
        { "entity_id": "cruise-sf", "type": "service_ended", "date": "2023-10-24",
          "details": {} }
      ],
      "shapes": [
        { "id": "phx-a", "entity_id": "waymo-phx", "valid_from": "2020-01-01",
          "valid_to": "2021-01-01" },
        { "id": "phx-b", "entity_id": "waymo-phx", "valid_from": "2021-01-01" },
        { "id": "sf-1", "entity_id": "cruise-sf", "valid_from": "2022-02-01",
          "valid_to": "2023-10-24" }
      ]
    }))
    .unwrap()
  }

  fn square(size: f64) -> Geometry {
    Geometry(json!({
      "type": "Polygon",
      "coordinates": [[[0.0, 0.0], [size, 0.0], [size, size], [0.0, size], [0.0, 0.0]]]
    }))
  }

  async fn make_state() -> AppState<MemorySource> {
    let source = MemorySource::new(raw_log())
      .with_geometry("phx-a", square(1.0))
      .with_geometry("phx-b", square(2.0))
      .with_geometry("sf-1", square(0.5));
    let engine = Engine::load(&source, EngineOptions::default()).await.unwrap();
    AppState {
      engine: Arc::new(RwLock::new(engine)),
      source: Arc::new(source),
    }
  }

  async fn call(state: AppState<MemorySource>, method: &str, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder()
      .method(method)
      .uri(uri)
      .body(Body::empty())
      .unwrap();
    let resp = app(state).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
  }

  // ── Entities ──────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn lists_entities() {
    let (status, body) = call(make_state().await, "GET", "/api/entities").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
  }

  #[tokio::test]
  async fn ticks_for_an_ended_deployment() {
    let (status, body) = call(make_state().await, "GET", "/api/entities/cruise-sf/ticks").await;
    assert_eq!(status, StatusCode::OK);
    let positions: Vec<f64> = body
      .as_array()
      .unwrap()
      .iter()
      .map(|t| t["position"].as_f64().unwrap())
      .collect();
    assert_eq!(positions, [0.0, 100.0]);
  }

  // ── States ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn resolves_one_state_as_of_a_date() {
    let state = make_state().await;
    let (status, body) = call(state, "GET", "/api/states/waymo-phx?as_of=2020-06-01").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["scalars"]["access"], "closed_testing");
    assert_eq!(body["active_shape"]["version_id"], "phx-a");
    assert_eq!(body["planned_shape"]["version_id"], "phx-b");
  }

  #[tokio::test]
  async fn accepts_month_labels_for_as_of() {
    let state = make_state().await;
    let (status, body) = call(state, "GET", "/api/states?as_of=January%202022").await;
    assert_eq!(status, StatusCode::OK);
    let states = body.as_array().unwrap();
    assert_eq!(states.len(), 2);
    assert_eq!(states[1]["entity_id"], "waymo-phx");
    assert_eq!(states[1]["scalars"]["access"], "public_service");
  }

  #[tokio::test]
  async fn unknown_entity_is_404() {
    let (status, body) = call(make_state().await, "GET", "/api/states/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
  }

  #[tokio::test]
  async fn unparsable_as_of_is_400() {
    let (status, body) = call(make_state().await, "GET", "/api/states?as_of=yesterday").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "unparsable instant \"yesterday\"");
  }

  // ── Map layer ─────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn transitions_filter_by_city() {
    let state = make_state().await;
    let uri = "/api/transitions?as_of=2022-06-01&city=san%20francisco";
    let (status, body) = call(state, "GET", uri).await;
    assert_eq!(status, StatusCode::OK);

    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["entity_id"], "cruise-sf");
    assert_eq!(entries[0]["version"]["version_id"], "sf-1");
    assert_eq!(entries[0]["bbox"], json!([0.0, 0.0, 0.5, 0.5]));
  }

  #[tokio::test]
  async fn summary_ranks_operators_by_area() {
    let (status, body) = call(make_state().await, "GET", "/api/summary?as_of=2022-06-01").await;
    assert_eq!(status, StatusCode::OK);
    let operators = body["operators"].as_array().unwrap();
    assert_eq!(operators[0]["operator"], "Waymo");
    assert_eq!(operators[1]["operator"], "Cruise");
  }

  #[tokio::test]
  async fn domain_lists_month_starts() {
    let (status, body) = call(make_state().await, "GET", "/api/domain").await;
    assert_eq!(status, StatusCode::OK);
    let months = body.as_array().unwrap();
    assert_eq!(months.len(), 46);
    assert_eq!(months[0], "2020-01-01T00:00:00Z");
  }

  // ── Reload ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn reload_swaps_in_the_fresh_dataset() {
    let state = make_state().await;
    let mut log = raw_log();
    log.entities.push(json!({ "id": "zoox-lv", "operator": "Zoox" }));
    state.source.replace_log(log).await;

    let (status, body) = call(state.clone(), "POST", "/api/reload").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entities"], 3);
    assert_eq!(body["geometries"], 3);

    let (_, entities) = call(state, "GET", "/api/entities").await;
    assert_eq!(entities.as_array().unwrap().len(), 3);
  }

  // ── Configuration ─────────────────────────────────────────────────────────

  #[test]
  fn config_reads_source_and_engine_tables() {
    let toml = r#"
      port = 9000

      [source]
      kind         = "http"
      url          = "https://example.com/rollouts.json"
      geometry_url = "https://example.com/geometry"

      [engine]
      tick_min_gap        = 2.5
      include_unpublished = true
      load_policy         = "abort"
    "#;
    let cfg: ServerConfig = config::Config::builder()
      .add_source(config::File::from_str(toml, config::FileFormat::Toml))
      .build()
      .unwrap()
      .try_deserialize()
      .unwrap();

    assert_eq!(cfg.address(), "127.0.0.1:9000");
    assert!(matches!(cfg.source, SourceConfig::Http { ref url, .. } if url.ends_with("rollouts.json")));
    assert_eq!(cfg.engine.tick_min_gap, 2.5);
    assert!(cfg.engine.include_unpublished);
    assert_eq!(cfg.engine.load_policy, rollout_core::loader::LoadPolicy::Abort);
  }

  #[test]
  fn missing_config_file_falls_back_to_defaults() {
    let cfg = ServerConfig::load(Path::new("/definitely/not/here/config.toml")).unwrap();
    assert_eq!(cfg.port, 8080);
    assert!(matches!(cfg.source, SourceConfig::File { .. }));
  }
}
