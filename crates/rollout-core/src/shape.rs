//! Shape versions and the single-entity shape resolver.
//!
//! A shape version is a boundary valid for one entity during
//! `[valid_from, valid_to)`. The geometry payload itself is not carried here;
//! it is cached by version id so that interval checks stay independent of
//! geometry size.

use std::{cmp::Reverse, collections::BTreeMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

// ─── ShapeVersion ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShapeVersion {
  pub version_id: String,
  pub entity_id:  EntityId,
  pub valid_from: DateTime<Utc>,
  /// `None` means open-ended (the current boundary).
  pub valid_to:   Option<DateTime<Utc>>,
  #[serde(default = "published_default")]
  pub published:  bool,
  /// Arrival position in the raw input; the later of two otherwise equal
  /// candidates wins.
  #[serde(default)]
  pub sequence:   u64,
}

fn published_default() -> bool { true }

impl ShapeVersion {
  pub fn new(
    version_id: impl Into<String>,
    entity_id: impl Into<EntityId>,
    valid_from: DateTime<Utc>,
    valid_to: Option<DateTime<Utc>>,
  ) -> Self {
    Self {
      version_id: version_id.into(),
      entity_id: entity_id.into(),
      valid_from,
      valid_to,
      published: true,
      sequence: 0,
    }
  }

  pub fn with_sequence(mut self, sequence: u64) -> Self {
    self.sequence = sequence;
    self
  }

  /// `valid_from <= instant < valid_to`, with an open end treated as +∞.
  pub fn contains(&self, instant: DateTime<Utc>) -> bool {
    self.valid_from <= instant && self.valid_to.is_none_or(|end| instant < end)
  }
}

// ─── Warnings ────────────────────────────────────────────────────────────────

/// A non-fatal data-quality defect found while resolving. Returned alongside
/// results; never raised as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataQualityWarning {
  /// Several versions of one entity contain the same instant.
  OverlappingShapes {
    entity_id:   EntityId,
    instant:     DateTime<Utc>,
    chosen:      String,
    conflicting: Vec<String>,
  },
  /// The selected version has no geometry payload; the entity is treated as
  /// having no active boundary.
  MissingGeometry {
    entity_id:  EntityId,
    version_id: String,
  },
  /// Two snapshots of one entity share an effective date; the one supplied
  /// first was dropped.
  DuplicateSnapshot {
    entity_id:      EntityId,
    effective_date: DateTime<Utc>,
    kept:           String,
    discarded:      String,
  },
}

impl DataQualityWarning {
  pub fn entity_id(&self) -> &str {
    match self {
      Self::OverlappingShapes { entity_id, .. }
      | Self::MissingGeometry { entity_id, .. }
      | Self::DuplicateSnapshot { entity_id, .. } => entity_id,
    }
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// The shape selection for one entity at one instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShapeResolution {
  pub active:   Option<ShapeVersion>,
  /// The earliest version starting strictly after the instant.
  pub planned:  Option<ShapeVersion>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub warnings: Vec<DataQualityWarning>,
}

/// Select the active and next-planned version of `entity_id` at `instant`.
///
/// When several versions contain `instant` the one with the latest
/// `valid_from` wins (ties: supplied last) and an
/// [`DataQualityWarning::OverlappingShapes`] is attached.
pub fn resolve_shape(
  entity_id: &str,
  versions: &[ShapeVersion],
  instant: DateTime<Utc>,
) -> ShapeResolution {
  let mut containing: Vec<&ShapeVersion> = versions
    .iter()
    .filter(|v| v.entity_id == entity_id && v.contains(instant))
    .collect();
  containing.sort_by_key(|v| (v.valid_from, v.sequence));

  let mut warnings = Vec::new();
  let active = containing.pop().cloned();
  if let Some(chosen) = &active
    && !containing.is_empty()
  {
    warnings.push(DataQualityWarning::OverlappingShapes {
      entity_id:   entity_id.to_owned(),
      instant,
      chosen:      chosen.version_id.clone(),
      conflicting: containing.iter().map(|v| v.version_id.clone()).collect(),
    });
  }

  let planned = versions
    .iter()
    .filter(|v| v.entity_id == entity_id && v.valid_from > instant)
    .min_by_key(|v| (v.valid_from, Reverse(v.sequence)))
    .cloned();

  ShapeResolution { active, planned, warnings }
}

// ─── Snapshots ───────────────────────────────────────────────────────────────

/// A loosely-versioned boundary: an effective date and an optional end date
/// instead of an explicit interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
  pub version_id:     String,
  pub entity_id:      EntityId,
  pub effective_date: DateTime<Utc>,
  pub end_date:       Option<DateTime<Utc>>,
  pub published:      bool,
  pub sequence:       u64,
}

/// Turn snapshots into interval versions.
///
/// Snapshots sharing an effective date collapse to the one supplied last. A
/// snapshot without an end date closes where the entity's next snapshot
/// begins, so the newest snapshot stays open-ended.
pub fn versions_from_snapshots(
  snapshots: Vec<Snapshot>,
) -> (Vec<ShapeVersion>, Vec<DataQualityWarning>) {
  let mut by_entity: BTreeMap<EntityId, Vec<Snapshot>> = BTreeMap::new();
  for snapshot in snapshots {
    by_entity.entry(snapshot.entity_id.clone()).or_default().push(snapshot);
  }

  let mut versions = Vec::new();
  let mut warnings = Vec::new();

  for (entity_id, mut group) in by_entity {
    group.sort_by_key(|s| (s.effective_date, s.sequence));

    let mut canonical: Vec<Snapshot> = Vec::with_capacity(group.len());
    for snapshot in group {
      match canonical.last_mut() {
        Some(prev) if prev.effective_date == snapshot.effective_date => {
          warnings.push(DataQualityWarning::DuplicateSnapshot {
            entity_id:      entity_id.clone(),
            effective_date: snapshot.effective_date,
            kept:           snapshot.version_id.clone(),
            discarded:      prev.version_id.clone(),
          });
          *prev = snapshot;
        }
        _ => canonical.push(snapshot),
      }
    }

    let next_starts: Vec<Option<DateTime<Utc>>> = canonical
      .iter()
      .skip(1)
      .map(|s| Some(s.effective_date))
      .chain(std::iter::once(None))
      .collect();

    for (snapshot, next_start) in canonical.into_iter().zip(next_starts) {
      versions.push(ShapeVersion {
        version_id: snapshot.version_id,
        entity_id:  snapshot.entity_id,
        valid_from: snapshot.effective_date,
        valid_to:   snapshot.end_date.or(next_start),
        published:  snapshot.published,
        sequence:   snapshot.sequence,
      });
    }
  }

  (versions, warnings)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
  }

  fn version(
    id: &str,
    from: DateTime<Utc>,
    to: Option<DateTime<Utc>>,
    sequence: u64,
  ) -> ShapeVersion {
    ShapeVersion::new(id, "waymo-phx", from, to).with_sequence(sequence)
  }

  fn snapshot(id: &str, date: DateTime<Utc>, sequence: u64) -> Snapshot {
    Snapshot {
      version_id: id.to_owned(),
      entity_id: "waymo-sf".to_owned(),
      effective_date: date,
      end_date: None,
      published: true,
      sequence,
    }
  }

  #[test]
  fn interval_is_half_open() {
    let v = version("a", day(2020, 1, 1), Some(day(2021, 1, 1)), 0);
    assert!(v.contains(day(2020, 1, 1)));
    assert!(v.contains(day(2020, 12, 31)));
    assert!(!v.contains(day(2021, 1, 1)));
    assert!(!v.contains(day(2019, 12, 31)));
  }

  #[test]
  fn open_ended_version_contains_the_far_future() {
    let v = version("a", day(2020, 1, 1), None, 0);
    assert!(v.contains(day(2099, 1, 1)));
  }

  #[test]
  fn selects_the_containing_version_and_the_next_planned_one() {
    let versions = vec![
      version("a", day(2020, 1, 1), Some(day(2021, 1, 1)), 0),
      version("b", day(2021, 1, 1), Some(day(2022, 1, 1)), 1),
      version("c", day(2022, 1, 1), None, 2),
    ];

    let r = resolve_shape("waymo-phx", &versions, day(2021, 6, 1));
    assert_eq!(r.active.unwrap().version_id, "b");
    assert_eq!(r.planned.unwrap().version_id, "c");
    assert!(r.warnings.is_empty());
  }

  #[test]
  fn no_active_version_outside_every_interval() {
    let versions = vec![
      version("a", day(2020, 1, 1), Some(day(2020, 6, 1)), 0),
      version("b", day(2021, 1, 1), None, 1),
    ];

    let gap = resolve_shape("waymo-phx", &versions, day(2020, 9, 1));
    assert!(gap.active.is_none());
    assert_eq!(gap.planned.unwrap().version_id, "b");

    let before = resolve_shape("waymo-phx", &versions, day(2019, 1, 1));
    assert!(before.active.is_none());
    assert_eq!(before.planned.unwrap().version_id, "a");
  }

  #[test]
  fn ignores_other_entities() {
    let versions = vec![ShapeVersion::new("z", "cruise-sf", day(2020, 1, 1), None)];
    let r = resolve_shape("waymo-phx", &versions, day(2021, 1, 1));
    assert!(r.active.is_none());
    assert!(r.planned.is_none());
  }

  #[test]
  fn overlap_prefers_latest_valid_from_and_warns() {
    let versions = vec![
      version("late", day(2020, 6, 1), None, 0),
      version("early", day(2020, 1, 1), None, 1),
    ];

    let r = resolve_shape("waymo-phx", &versions, day(2020, 7, 1));
    assert_eq!(r.active.as_ref().unwrap().version_id, "late");
    assert_eq!(r.warnings, vec![DataQualityWarning::OverlappingShapes {
      entity_id:   "waymo-phx".into(),
      instant:     day(2020, 7, 1),
      chosen:      "late".into(),
      conflicting: vec!["early".into()],
    }]);
  }

  #[test]
  fn overlap_with_equal_starts_prefers_the_one_supplied_last() {
    let versions = vec![
      version("second", day(2020, 1, 1), None, 9),
      version("first", day(2020, 1, 1), None, 3),
    ];
    let r = resolve_shape("waymo-phx", &versions, day(2020, 2, 1));
    assert_eq!(r.active.unwrap().version_id, "second");
    assert_eq!(r.warnings.len(), 1);
  }

  #[test]
  fn resolution_does_not_depend_on_input_order() {
    let mut versions = vec![
      version("a", day(2020, 1, 1), Some(day(2021, 1, 1)), 0),
      version("b", day(2021, 1, 1), None, 1),
    ];
    let forward = resolve_shape("waymo-phx", &versions, day(2020, 3, 1));
    versions.reverse();
    let backward = resolve_shape("waymo-phx", &versions, day(2020, 3, 1));
    assert_eq!(forward, backward);
  }

  #[test]
  fn snapshots_chain_into_consecutive_intervals() {
    let (versions, warnings) = versions_from_snapshots(vec![
      snapshot("jun", day(2025, 6, 1), 1),
      snapshot("jan", day(2025, 1, 1), 0),
    ]);

    assert!(warnings.is_empty());
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].version_id, "jan");
    assert_eq!(versions[0].valid_to, Some(day(2025, 6, 1)));
    assert_eq!(versions[1].version_id, "jun");
    assert_eq!(versions[1].valid_to, None);
  }

  #[test]
  fn duplicate_snapshot_dates_keep_the_last_supplied() {
    let (versions, warnings) = versions_from_snapshots(vec![
      snapshot("draft", day(2025, 6, 1), 0),
      snapshot("final", day(2025, 6, 1), 1),
    ]);

    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].version_id, "final");
    assert!(matches!(
      &warnings[..],
      [DataQualityWarning::DuplicateSnapshot { kept, discarded, .. }]
        if kept == "final" && discarded == "draft"
    ));
  }

  #[test]
  fn explicit_end_date_wins_over_the_next_snapshot() {
    let mut first = snapshot("pilot", day(2024, 1, 1), 0);
    first.end_date = Some(day(2024, 3, 1));
    let (versions, _) =
      versions_from_snapshots(vec![first, snapshot("launch", day(2024, 9, 1), 1)]);

    assert_eq!(versions[0].valid_to, Some(day(2024, 3, 1)));
    let gap = resolve_shape("waymo-sf", &versions, day(2024, 5, 1));
    assert!(gap.active.is_none());
  }
}
