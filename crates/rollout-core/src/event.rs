//! Events: the immutable, dated facts that change an entity's attributes.
//!
//! Events are never updated or deleted; a correction is a new compensating
//! event. The fold order is `(effective_at, sequence)`, where `sequence` is
//! the record's arrival position in the raw log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::EntityId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
  pub event_id:     String,
  pub entity_id:    EntityId,
  /// Discriminant used to look up merge rules (e.g. `"service_updated"`).
  pub event_type:   String,
  /// When the change takes effect in the real world.
  pub effective_at: DateTime<Utc>,
  /// When the change was recorded; equals `effective_at` when the raw record
  /// carried only one date.
  pub recorded_at:  DateTime<Utc>,
  /// Arrival position in the raw log; breaks `effective_at` ties.
  pub sequence:     u64,
  pub description:  Option<String>,
  pub details:      Map<String, Value>,
}

impl Event {
  /// An event with empty details, recorded at the moment it takes effect.
  pub fn new(
    event_id: impl Into<String>,
    entity_id: impl Into<EntityId>,
    event_type: impl Into<String>,
    effective_at: DateTime<Utc>,
    sequence: u64,
  ) -> Self {
    Self {
      event_id: event_id.into(),
      entity_id: entity_id.into(),
      event_type: event_type.into(),
      effective_at,
      recorded_at: effective_at,
      sequence,
      description: None,
      details: Map::new(),
    }
  }

  pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.details.insert(key.into(), value.into());
    self
  }

  pub fn with_description(mut self, description: impl Into<String>) -> Self {
    self.description = Some(description.into());
    self
  }

  /// The total order events are folded in.
  pub fn ordering_key(&self) -> (DateTime<Utc>, u64) { (self.effective_at, self.sequence) }

  /// A non-null detail value.
  pub fn detail(&self, key: &str) -> Option<&Value> {
    self.details.get(key).filter(|v| !v.is_null())
  }

  /// A detail interpreted as a list of set members.
  ///
  /// Accepts an array (scalars are stringified, nested structures skipped) or
  /// a single string. Anything else yields an empty list.
  pub fn detail_members(&self, key: &str) -> Vec<String> {
    match self.detail(key) {
      Some(Value::Array(items)) => items.iter().filter_map(member_string).collect(),
      Some(Value::String(s)) => vec![s.clone()],
      _ => Vec::new(),
    }
  }
}

fn member_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}
