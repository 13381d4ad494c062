//! The per-version geometry cache.
//!
//! Keyed by shape version id. Geometries are immutable once published, so an
//! entry never goes stale and is carried over from one engine to the next on
//! refresh. There is no eviction: memory grows with the number of distinct
//! versions ever loaded.

use std::{collections::HashMap, sync::Arc};

use rollout_core::geometry::{Geometry, ShapeMetrics};

/// A geometry and the metrics computed from it on insertion.
#[derive(Debug, Clone)]
pub struct CachedGeometry {
  pub geometry: Arc<Geometry>,
  pub metrics:  ShapeMetrics,
}

#[derive(Debug, Clone, Default)]
pub struct GeometryCache {
  entries: HashMap<String, CachedGeometry>,
}

impl GeometryCache {
  pub fn get(&self, version_id: &str) -> Option<&CachedGeometry> { self.entries.get(version_id) }

  pub fn contains(&self, version_id: &str) -> bool { self.entries.contains_key(version_id) }

  /// Cache `geometry` under `version_id`, replacing any previous entry.
  pub fn insert(&mut self, version_id: impl Into<String>, geometry: Geometry) -> &CachedGeometry {
    let metrics = geometry.metrics();
    let entry = CachedGeometry { geometry: Arc::new(geometry), metrics };
    let slot = self.entries.entry(version_id.into()).insert_entry(entry);
    slot.into_mut()
  }

  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}
