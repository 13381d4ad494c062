//! The transition mapper: the active shape of every tracked entity at one
//! instant.
//!
//! The map layer polls this on every scrub tick. Versions are grouped by
//! entity once, in [`ShapeIndex::new`]; each tick then only re-checks interval
//! membership per entity.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  entity::EntityId,
  shape::{DataQualityWarning, ShapeResolution, ShapeVersion, resolve_shape},
};

/// Entity id → active version (or `None`) at `as_of`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionMap {
  pub as_of:    DateTime<Utc>,
  pub entries:  BTreeMap<EntityId, Option<ShapeVersion>>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub warnings: Vec<DataQualityWarning>,
}

impl TransitionMap {
  pub fn active(&self, entity_id: &str) -> Option<&ShapeVersion> {
    self.entries.get(entity_id).and_then(Option::as_ref)
  }
}

/// Shape versions grouped by entity.
#[derive(Debug, Clone, Default)]
pub struct ShapeIndex {
  by_entity: BTreeMap<EntityId, Vec<ShapeVersion>>,
}

impl ShapeIndex {
  pub fn new(versions: impl IntoIterator<Item = ShapeVersion>) -> Self {
    let mut by_entity: BTreeMap<EntityId, Vec<ShapeVersion>> = BTreeMap::new();
    for version in versions {
      by_entity.entry(version.entity_id.clone()).or_default().push(version);
    }
    Self { by_entity }
  }

  pub fn entity_ids(&self) -> impl Iterator<Item = &EntityId> { self.by_entity.keys() }

  pub fn versions(&self, entity_id: &str) -> &[ShapeVersion] {
    self.by_entity.get(entity_id).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn all_versions(&self) -> impl Iterator<Item = &ShapeVersion> {
    self.by_entity.values().flatten()
  }

  pub fn len(&self) -> usize { self.by_entity.values().map(Vec::len).sum() }

  pub fn is_empty(&self) -> bool { self.by_entity.is_empty() }

  pub fn resolve(&self, entity_id: &str, instant: DateTime<Utc>) -> ShapeResolution {
    resolve_shape(entity_id, self.versions(entity_id), instant)
  }

  /// Every overlap between versions of one entity, independent of any query
  /// instant. Each is reported at the start of the later version, where it
  /// first shows.
  pub fn overlaps(&self) -> Vec<DataQualityWarning> {
    let mut warnings = Vec::new();
    for (entity_id, versions) in &self.by_entity {
      for version in versions {
        for warning in resolve_shape(entity_id, versions, version.valid_from).warnings {
          if !warnings.contains(&warning) {
            warnings.push(warning);
          }
        }
      }
    }
    warnings
  }

  /// One shape resolution per indexed entity.
  pub fn transitions(&self, instant: DateTime<Utc>) -> TransitionMap {
    let mut entries = BTreeMap::new();
    let mut warnings = Vec::new();
    for (entity_id, versions) in &self.by_entity {
      let resolution = resolve_shape(entity_id, versions, instant);
      warnings.extend(resolution.warnings);
      entries.insert(entity_id.clone(), resolution.active);
    }
    TransitionMap { as_of: instant, entries, warnings }
  }
}

/// Group `versions` by entity and resolve each group at `instant`.
pub fn resolve_transitions(versions: &[ShapeVersion], instant: DateTime<Utc>) -> TransitionMap {
  ShapeIndex::new(versions.iter().cloned()).transitions(instant)
}
