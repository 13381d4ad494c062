//! Entities: tracked deployments, one operator in one city.
//!
//! An entity is a thin, immutable envelope. Everything that changes over time
//! lives in its events and shape versions.

use serde::{Deserialize, Serialize};

/// Stable identifier of a tracked deployment.
pub type EntityId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
  #[serde(alias = "entityId", alias = "id")]
  pub entity_id: EntityId,
  #[serde(default, alias = "provider")]
  pub operator:  String,
  #[serde(default)]
  pub city:      String,
  /// Cached snapshot kept by the store. Advisory only: resolution never
  /// reads it; the event log is the source of truth.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub snapshot:  Option<serde_json::Value>,
}

impl Entity {
  pub fn new(
    entity_id: impl Into<EntityId>,
    operator: impl Into<String>,
    city: impl Into<String>,
  ) -> Self {
    Self {
      entity_id: entity_id.into(),
      operator:  operator.into(),
      city:      city.into(),
      snapshot:  None,
    }
  }

  /// An entity known only by id (referenced by events or shapes but absent
  /// from the entity list).
  pub fn bare(entity_id: impl Into<EntityId>) -> Self {
    Self::new(entity_id, String::new(), String::new())
  }
}
