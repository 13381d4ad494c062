//! The engine: one loaded snapshot of the dataset plus its geometry cache.
//!
//! An [`Engine`] is immutable once built. Refreshing builds a new engine from
//! a fresh fetch, carrying the geometry cache over, so a query never observes
//! a half-loaded dataset.
//!
//! Data-quality warnings that do not depend on the query instant (overlapping
//! intervals, missing geometry) are found and logged once per load. Queries
//! return them alongside their results and log them only at `debug`.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use rollout_core::{
  domain::month_domain,
  entity::{Entity, EntityId},
  event::Event,
  geometry::{BoundingBox, Geometry},
  loader::{SkippedRecord, load_entities, load_events, load_shapes},
  rules::RuleTable,
  shape::{DataQualityWarning, ShapeResolution, ShapeVersion},
  source::{EventSource, RawLog},
  state::{ResolvedState, resolve_state},
  ticks::{TimelineTick, assemble_ticks},
  transition::{ShapeIndex, TransitionMap},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  cache::{CachedGeometry, GeometryCache},
  options::EngineOptions,
};

/// An engine shared between request handlers and background refreshes.
pub type SharedEngine = Arc<tokio::sync::RwLock<Engine>>;

/// Operator name reported for entities that carry none.
const UNKNOWN_OPERATOR: &str = "unknown";

// ─── Views ───────────────────────────────────────────────────────────────────

/// Restricts a transition view to one operator and/or city.
/// Matching ignores ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionFilter {
  pub operator: Option<String>,
  pub city:     Option<String>,
}

impl TransitionFilter {
  pub fn matches(&self, entity: &Entity) -> bool {
    let accepts = |wanted: &Option<String>, actual: &str| {
      wanted.as_deref().is_none_or(|w| w.eq_ignore_ascii_case(actual))
    };
    accepts(&self.operator, &entity.operator) && accepts(&self.city, &entity.city)
  }
}

/// One entity's row in a [`TransitionView`].
#[derive(Debug, Clone, Serialize)]
pub struct TransitionEntry {
  pub entity_id: EntityId,
  pub operator:  String,
  pub city:      String,
  /// The active version; `None` when no version is valid or its geometry is
  /// unavailable.
  pub version:   Option<ShapeVersion>,
  pub bbox:      Option<BoundingBox>,
  pub area_km2:  Option<f64>,
  pub geometry:  Option<Arc<Geometry>>,
}

/// A transition map joined with entity metadata and cached geometry, ready
/// for the map layer.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionView {
  pub as_of:    DateTime<Utc>,
  pub entries:  Vec<TransitionEntry>,
  pub warnings: Vec<DataQualityWarning>,
}

/// Total active service area of one operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorArea {
  pub operator: String,
  pub area_km2: f64,
  pub entities: usize,
}

/// Counts describing a loaded engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadSummary {
  pub entities:       usize,
  pub events:         usize,
  pub shape_versions: usize,
  pub geometries:     usize,
  pub skipped:        usize,
  pub warnings:       usize,
  pub loaded_at:      DateTime<Utc>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Engine {
  options:    EngineOptions,
  rules:      RuleTable,
  entities:   BTreeMap<EntityId, Entity>,
  events:     BTreeMap<EntityId, Vec<Event>>,
  shapes:     ShapeIndex,
  geometries: GeometryCache,
  skipped:    Vec<SkippedRecord>,
  warnings:   Vec<DataQualityWarning>,
  loaded_at:  DateTime<Utc>,
}

impl Engine {
  /// Fetch the log from `source` and build an engine over it.
  pub async fn load<S>(source: &S, options: EngineOptions) -> Result<Self>
  where
    S: EventSource,
    Error: From<S::Error>,
  {
    Self::load_with_cache(source, options, GeometryCache::default()).await
  }

  /// Like [`Engine::load`], starting from geometries already cached. Only
  /// versions missing from `geometries` are fetched.
  pub async fn load_with_cache<S>(
    source: &S,
    options: EngineOptions,
    geometries: GeometryCache,
  ) -> Result<Self>
  where
    S: EventSource,
    Error: From<S::Error>,
  {
    let raw = source.fetch_log().await?;
    Self::assemble(source, raw, options, geometries).await
  }

  /// Re-fetch the log into a replacement for `shared` and swap it in.
  ///
  /// The lock is taken briefly to copy the options and geometry cache, and
  /// again only for the swap; no guard is held while the source is fetched.
  /// On failure the current engine stays in place.
  pub async fn refresh_shared<S>(shared: &SharedEngine, source: &S) -> Result<LoadSummary>
  where
    S: EventSource,
    Error: From<S::Error>,
  {
    let (options, geometries) = {
      let current = shared.read().await;
      (current.options.clone(), current.geometries.clone())
    };
    let next = Self::load_with_cache(source, options, geometries).await?;
    let summary = next.summary();
    *shared.write().await = next;
    Ok(summary)
  }

  async fn assemble<S>(
    source: &S,
    raw: RawLog,
    options: EngineOptions,
    mut geometries: GeometryCache,
  ) -> Result<Self>
  where
    S: EventSource,
    Error: From<S::Error>,
  {
    let listed = load_entities(&raw.entities, options.load_policy)?;
    let events = load_events(&raw.events, options.load_policy)?;
    let shapes = load_shapes(&raw.shapes, &raw.snapshots, options.load_policy)?;

    let mut skipped = listed.skipped;
    skipped.extend(events.skipped);
    skipped.extend(shapes.skipped);
    for record in &skipped {
      warn!(
        kind = record.kind.as_str(),
        index = record.index,
        error = %record.error,
        "skipped malformed record"
      );
    }

    let versions: Vec<ShapeVersion> = shapes
      .versions
      .into_iter()
      .filter(|v| options.include_unpublished || v.published)
      .collect();

    let mut inline = shapes.geometries;
    for version in &versions {
      if let Some(geometry) = inline.remove(&version.version_id) {
        geometries.insert(version.version_id.clone(), geometry);
        continue;
      }
      if geometries.contains(&version.version_id) {
        continue;
      }
      match source.fetch_geometry(&version.version_id).await {
        Ok(Some(geometry)) => {
          geometries.insert(version.version_id.clone(), geometry);
        }
        Ok(None) => debug!(version_id = %version.version_id, "source has no geometry"),
        Err(err) => warn!(
          version_id = %version.version_id,
          error = %Error::from(err),
          "geometry fetch failed"
        ),
      }
    }

    let mut entities: BTreeMap<EntityId, Entity> = listed
      .entities
      .into_iter()
      .map(|e| (e.entity_id.clone(), e))
      .collect();
    let referenced = events
      .by_entity
      .keys()
      .chain(versions.iter().map(|v| &v.entity_id));
    for entity_id in referenced {
      if !entities.contains_key(entity_id) {
        entities.insert(entity_id.clone(), Entity::bare(entity_id.clone()));
      }
    }

    let shape_index = ShapeIndex::new(versions);
    let mut warnings = shapes.warnings;
    warnings.extend(shape_index.overlaps());
    for version in shape_index.all_versions() {
      if !geometries.contains(&version.version_id) {
        warnings.push(DataQualityWarning::MissingGeometry {
          entity_id:  version.entity_id.clone(),
          version_id: version.version_id.clone(),
        });
      }
    }
    for warning in &warnings {
      warn!(?warning, "data quality warning");
    }

    let engine = Self {
      rules: options.rule_table(),
      options,
      entities,
      events: events.by_entity,
      shapes: shape_index,
      geometries,
      skipped,
      warnings,
      loaded_at: Utc::now(),
    };

    let summary = engine.summary();
    info!(
      entities = summary.entities,
      events = summary.events,
      shape_versions = summary.shape_versions,
      geometries = summary.geometries,
      skipped = summary.skipped,
      "loaded rollout dataset"
    );
    Ok(engine)
  }

  // ── Accessors ─────────────────────────────────────────────────────────

  pub fn options(&self) -> &EngineOptions { &self.options }

  pub fn rules(&self) -> &RuleTable { &self.rules }

  pub fn loaded_at(&self) -> DateTime<Utc> { self.loaded_at }

  pub fn entities(&self) -> impl Iterator<Item = &Entity> { self.entities.values() }

  pub fn entity(&self, entity_id: &str) -> Result<&Entity> {
    self
      .entities
      .get(entity_id)
      .ok_or_else(|| rollout_core::Error::UnknownEntity(entity_id.to_owned()).into())
  }

  /// An entity's events in arrival order.
  pub fn events(&self, entity_id: &str) -> &[Event] {
    self.events.get(entity_id).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn skipped(&self) -> &[SkippedRecord] { &self.skipped }

  /// Warnings found while loading: duplicate snapshots, overlapping
  /// intervals and versions without geometry.
  pub fn load_warnings(&self) -> &[DataQualityWarning] { &self.warnings }

  /// Geometries cached so far, keyed by version id.
  pub fn geometry_cache(&self) -> &GeometryCache { &self.geometries }

  pub fn geometry(&self, version_id: &str) -> Option<&CachedGeometry> {
    self.geometries.get(version_id)
  }

  pub fn summary(&self) -> LoadSummary {
    LoadSummary {
      entities:       self.entities.len(),
      events:         self.events.values().map(Vec::len).sum(),
      shape_versions: self.shapes.len(),
      geometries:     self.geometries.len(),
      skipped:        self.skipped.len(),
      warnings:       self.warnings.len(),
      loaded_at:      self.loaded_at,
    }
  }

  // ── Queries ───────────────────────────────────────────────────────────

  pub fn resolve_state(&self, entity_id: &str, as_of: DateTime<Utc>) -> Result<ResolvedState> {
    self.entity(entity_id)?;
    Ok(self.state_of(entity_id, as_of))
  }

  /// One state per known entity, ordered by entity id.
  pub fn resolve_all_states(&self, as_of: DateTime<Utc>) -> Vec<ResolvedState> {
    self.entities.keys().map(|id| self.state_of(id, as_of)).collect()
  }

  fn state_of(&self, entity_id: &str, as_of: DateTime<Utc>) -> ResolvedState {
    let shapes = self.shape_of(entity_id, as_of);
    resolve_state(entity_id, self.events(entity_id), as_of, &self.rules).with_shapes(&shapes)
  }

  pub fn resolve_shape(&self, entity_id: &str, as_of: DateTime<Utc>) -> Result<ShapeResolution> {
    self.entity(entity_id)?;
    Ok(self.shape_of(entity_id, as_of))
  }

  fn shape_of(&self, entity_id: &str, as_of: DateTime<Utc>) -> ShapeResolution {
    let mut resolution = self.shapes.resolve(entity_id, as_of);
    self.require_geometry(entity_id, &mut resolution.active, &mut resolution.warnings);
    log_warnings(&resolution.warnings);
    resolution
  }

  /// The active version of every known entity; entities without one (or
  /// whose geometry is unavailable) map to `None`.
  pub fn resolve_transitions(&self, as_of: DateTime<Utc>) -> TransitionMap {
    let mut map = self.shapes.transitions(as_of);
    for (entity_id, active) in map.entries.iter_mut() {
      self.require_geometry(entity_id, active, &mut map.warnings);
    }
    for entity_id in self.entities.keys() {
      map.entries.entry(entity_id.clone()).or_insert(None);
    }
    log_warnings(&map.warnings);
    map
  }

  /// [`Engine::resolve_transitions`] joined with entity metadata, metrics
  /// and geometry, restricted by `filter`.
  pub fn transitions(&self, as_of: DateTime<Utc>, filter: &TransitionFilter) -> TransitionView {
    let map = self.resolve_transitions(as_of);
    let included = |entity_id: &str| {
      self.entities.get(entity_id).is_some_and(|e| filter.matches(e))
    };

    let entries = map
      .entries
      .into_iter()
      .filter(|(entity_id, _)| included(entity_id))
      .filter_map(|(entity_id, version)| {
        let entity = self.entities.get(&entity_id)?;
        let cached = version.as_ref().and_then(|v| self.geometries.get(&v.version_id));
        Some(TransitionEntry {
          operator: entity.operator.clone(),
          city: entity.city.clone(),
          bbox: cached.and_then(|c| c.metrics.bbox),
          area_km2: cached.and_then(|c| c.metrics.area_km2),
          geometry: cached.map(|c| Arc::clone(&c.geometry)),
          version,
          entity_id,
        })
      })
      .collect();

    TransitionView {
      as_of,
      entries,
      warnings: map.warnings.into_iter().filter(|w| included(w.entity_id())).collect(),
    }
  }

  pub fn assemble_ticks(&self, entity_id: &str, now: DateTime<Utc>) -> Result<Vec<TimelineTick>> {
    self.entity(entity_id)?;
    Ok(assemble_ticks(
      self.events(entity_id),
      &self.rules,
      now,
      self.options.tick_min_gap,
    ))
  }

  /// Active service area per operator at `as_of`, largest first.
  pub fn area_by_operator(&self, as_of: DateTime<Utc>) -> Vec<OperatorArea> {
    let map = self.resolve_transitions(as_of);
    let mut totals: BTreeMap<&str, (f64, usize)> = BTreeMap::new();

    for (entity_id, version) in &map.entries {
      let Some(area) = version
        .as_ref()
        .and_then(|v| self.geometries.get(&v.version_id))
        .and_then(|c| c.metrics.area_km2)
      else {
        continue;
      };
      let operator = self
        .entities
        .get(entity_id)
        .map(|e| e.operator.as_str())
        .filter(|o| !o.is_empty())
        .unwrap_or(UNKNOWN_OPERATOR);
      let total = totals.entry(operator).or_default();
      total.0 += area;
      total.1 += 1;
    }

    let mut areas: Vec<OperatorArea> = totals
      .into_iter()
      .map(|(operator, (area_km2, entities))| OperatorArea {
        operator: operator.to_owned(),
        area_km2,
        entities,
      })
      .collect();
    areas.sort_by(|a, b| {
      b.area_km2
        .total_cmp(&a.area_km2)
        .then_with(|| a.operator.cmp(&b.operator))
    });
    areas
  }

  /// Month starts spanning every shape version start and event date.
  pub fn month_domain(&self) -> Vec<DateTime<Utc>> {
    let version_starts = self.shapes.all_versions().map(|v| v.valid_from);
    let event_dates = self.events.values().flatten().map(|e| e.effective_at);
    month_domain(version_starts.chain(event_dates))
  }

  /// Demote an active version whose geometry is not cached.
  fn require_geometry(
    &self,
    entity_id: &str,
    active: &mut Option<ShapeVersion>,
    warnings: &mut Vec<DataQualityWarning>,
  ) {
    if active
      .as_ref()
      .is_some_and(|v| !self.geometries.contains(&v.version_id))
      && let Some(version) = active.take()
    {
      warnings.push(DataQualityWarning::MissingGeometry {
        entity_id:  entity_id.to_owned(),
        version_id: version.version_id,
      });
    }
  }
}

/// Per-query copies of load-time warnings; `warn` already fired at load.
fn log_warnings(warnings: &[DataQualityWarning]) {
  for warning in warnings {
    debug!(?warning, "data quality warning");
  }
}
