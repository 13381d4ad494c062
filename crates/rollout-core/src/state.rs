//! The state resolver: fold an entity's events into its attributes as of an
//! instant.
//!
//! The resolved state is never stored. It is recomputed from the event log on
//! every query, which keeps it a pure function of `(events, instant, rules)`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
  entity::EntityId,
  event::Event,
  rules::{MergeRule, RuleTable},
  shape::{ShapeResolution, ShapeVersion},
};

// ─── ResolvedState ───────────────────────────────────────────────────────────

/// The computed read model for one entity at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedState {
  pub entity_id:      EntityId,
  pub as_of:          DateTime<Utc>,
  /// Last-write-wins fields.
  pub scalars:        BTreeMap<String, Value>,
  /// Accumulated add/remove fields.
  pub sets:           BTreeMap<String, BTreeSet<String>>,
  /// How many events took effect at or before `as_of`.
  pub applied_events: usize,
  pub last_event_at:  Option<DateTime<Utc>>,
  pub active_shape:   Option<ShapeVersion>,
  pub planned_shape:  Option<ShapeVersion>,
}

impl ResolvedState {
  pub fn scalar(&self, field: &str) -> Option<&Value> { self.scalars.get(field) }

  pub fn scalar_str(&self, field: &str) -> Option<&str> {
    self.scalar(field).and_then(Value::as_str)
  }

  pub fn set(&self, field: &str) -> Option<&BTreeSet<String>> { self.sets.get(field) }

  /// Attach the shape pointers from a resolution made at the same instant.
  pub fn with_shapes(mut self, shapes: &ShapeResolution) -> Self {
    self.active_shape = shapes.active.clone();
    self.planned_shape = shapes.planned.clone();
    self
  }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Resolve `entity_id`'s attributes at `instant`.
///
/// Events of other entities and events effective after `instant` are
/// ignored. The rest are folded in `(effective_at, sequence)` order using the
/// rules `rules` assigns to each event type. Inputs are not modified and the
/// output depends only on the arguments.
pub fn resolve_state(
  entity_id: &str,
  events: &[Event],
  instant: DateTime<Utc>,
  rules: &RuleTable,
) -> ResolvedState {
  let mut ordered: Vec<&Event> = events
    .iter()
    .filter(|e| e.entity_id == entity_id && e.effective_at <= instant)
    .collect();
  ordered.sort_by_key(|e| e.ordering_key());

  let mut fold = Fold::default();
  for event in &ordered {
    for rule in rules.rules_for(&event.event_type) {
      fold.apply(rule, event);
    }
  }

  ResolvedState {
    entity_id:      entity_id.to_owned(),
    as_of:          instant,
    scalars:        fold.finish_scalars(&rules.defaults),
    sets:           fold.sets,
    applied_events: ordered.len(),
    last_event_at:  ordered.last().map(|e| e.effective_at),
    active_shape:   None,
    planned_shape:  None,
  }
}

/// Accumulator for one left fold.
#[derive(Default)]
struct Fold {
  explicit: BTreeMap<String, Value>,
  seeded:   BTreeMap<String, Value>,
  sets:     BTreeMap<String, BTreeSet<String>>,
}

impl Fold {
  fn apply(&mut self, rule: &MergeRule, event: &Event) {
    match rule {
      MergeRule::Scalar { field, key } => {
        if let Some(value) = event.detail(key) {
          self.explicit.insert(field.clone(), value.clone());
        }
      }
      MergeRule::Constant { field, value } => {
        self.explicit.insert(field.clone(), value.clone());
      }
      MergeRule::Set { field, add, remove } => {
        let added = event.detail_members(add);
        let removed = event.detail_members(remove);
        if added.is_empty() && removed.is_empty() {
          return;
        }
        let members = self.sets.entry(field.clone()).or_default();
        members.extend(added);
        for member in &removed {
          members.remove(member);
        }
      }
      MergeRule::Bootstrap { field, key, value } => {
        if self.explicit.contains_key(field) || self.seeded.contains_key(field) {
          return;
        }
        let seed = key
          .as_deref()
          .and_then(|k| event.detail(k))
          .or(value.as_ref());
        if let Some(seed) = seed {
          self.seeded.insert(field.clone(), seed.clone());
        }
      }
    }
  }

  /// Table defaults, overlaid by bootstrap seeds, overlaid by explicit
  /// writes. An explicit write made after a seed still wins here.
  fn finish_scalars(&mut self, defaults: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    let mut scalars = defaults.clone();
    scalars.append(&mut self.seeded);
    scalars.append(&mut self.explicit);
    scalars
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  const ID: &str = "waymo-phx";

  fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
  }

  fn event(seq: u64, kind: &str, at: DateTime<Utc>) -> Event {
    Event::new(format!("e{seq}"), ID, kind, at, seq)
  }

  fn rules() -> RuleTable { RuleTable::deployments() }

  fn scenario_a() -> Vec<Event> {
    vec![
      event(0, "service_created", day(2020, 1, 1)).with_detail("access", "closed_testing"),
      event(1, "service_updated", day(2021, 6, 1)).with_detail("access", "public_service"),
    ]
  }

  #[test]
  fn scenario_a_access_over_time() {
    let events = scenario_a();
    let early = resolve_state(ID, &events, day(2020, 6, 1), &rules());
    let late = resolve_state(ID, &events, day(2022, 1, 1), &rules());
    assert_eq!(early.scalar_str("access"), Some("closed_testing"));
    assert_eq!(late.scalar_str("access"), Some("public_service"));
  }

  #[test]
  fn last_write_wins_at_and_after_the_second_write() {
    let events = scenario_a();
    let at_t2 = resolve_state(ID, &events, day(2021, 6, 1), &rules());
    let before_t2 = resolve_state(ID, &events, day(2021, 5, 31), &rules());
    let at_t1 = resolve_state(ID, &events, day(2020, 1, 1), &rules());
    assert_eq!(at_t2.scalar_str("access"), Some("public_service"));
    assert_eq!(before_t2.scalar_str("access"), Some("closed_testing"));
    assert_eq!(at_t1.scalar_str("access"), Some("closed_testing"));
  }

  #[test]
  fn nothing_applies_before_the_first_event() {
    let state = resolve_state(ID, &scenario_a(), day(2019, 1, 1), &rules());
    assert!(state.scalars.is_empty());
    assert!(state.sets.is_empty());
    assert_eq!(state.applied_events, 0);
    assert_eq!(state.last_event_at, None);
  }

  #[test]
  fn arrival_order_does_not_matter_except_for_ties() {
    let mut events = scenario_a();
    events.reverse();
    let state = resolve_state(ID, &events, day(2022, 1, 1), &rules());
    assert_eq!(state.scalar_str("access"), Some("public_service"));
  }

  #[test]
  fn ties_on_effective_date_resolve_by_sequence() {
    let events = vec![
      event(7, "access_changed", day(2021, 1, 1)).with_detail("access", "later_in_log"),
      event(3, "access_changed", day(2021, 1, 1)).with_detail("access", "earlier_in_log"),
    ];
    let state = resolve_state(ID, &events, day(2021, 1, 1), &rules());
    assert_eq!(state.scalar_str("access"), Some("later_in_log"));
  }

  #[test]
  fn resolution_is_deterministic() {
    let events = vec![
      event(0, "service_created", day(2020, 1, 1))
        .with_detail("access", "waitlist")
        .with_detail("platforms", json!(["waymo_one", "uber"])),
      event(1, "platform_updated", day(2020, 5, 1)).with_detail("remove", json!(["uber"])),
    ];
    let first = resolve_state(ID, &events, day(2021, 1, 1), &rules());
    let second = resolve_state(ID, &events, day(2021, 1, 1), &rules());
    assert_eq!(first, second);
    assert_eq!(
      serde_json::to_string(&first).unwrap(),
      serde_json::to_string(&second).unwrap()
    );
  }

  #[test]
  fn set_add_then_remove_within_one_event() {
    let events = vec![
      event(0, "platform_updated", day(2020, 1, 1))
        .with_detail("add", json!(["uber", "lyft"]))
        .with_detail("remove", json!(["lyft"])),
    ];
    let state = resolve_state(ID, &events, day(2020, 1, 1), &rules());
    let platforms: Vec<_> = state.set("platforms").unwrap().iter().cloned().collect();
    assert_eq!(platforms, ["uber"]);
  }

  #[test]
  fn set_operations_are_idempotent() {
    let base = vec![
      event(0, "platform_updated", day(2020, 1, 1)).with_detail("add", json!(["uber"])),
    ];
    let mut noisy = base.clone();
    noisy.push(event(1, "platform_updated", day(2020, 2, 1)).with_detail("add", json!(["uber"])));
    noisy.push(event(2, "platform_updated", day(2020, 3, 1)).with_detail("remove", json!(["lyft"])));

    let expected = resolve_state(ID, &base, day(2021, 1, 1), &rules());
    let actual = resolve_state(ID, &noisy, day(2021, 1, 1), &rules());
    assert_eq!(expected.sets, actual.sets);
  }

  #[test]
  fn bootstrap_seeds_only_unset_fields() {
    let events = vec![
      event(0, "testing_started", day(2019, 1, 1)),
      event(1, "access_changed", day(2020, 1, 1)).with_detail("access", "waitlist"),
    ];

    let during_testing = resolve_state(ID, &events, day(2019, 6, 1), &rules());
    assert_eq!(during_testing.scalar_str("access"), Some("testing"));
    assert_eq!(during_testing.scalar_str("autonomy"), Some("safety_driver"));
    assert_eq!(during_testing.scalar_str("status"), Some("testing"));

    let later = resolve_state(ID, &events, day(2020, 6, 1), &rules());
    assert_eq!(later.scalar_str("access"), Some("waitlist"));
  }

  #[test]
  fn bootstrap_never_overrides_an_earlier_explicit_value() {
    let events = vec![
      event(0, "service_created", day(2019, 1, 1)).with_detail("access", "public_service"),
      event(1, "testing_started", day(2020, 1, 1)).with_detail("access", "testing"),
    ];
    let state = resolve_state(ID, &events, day(2021, 1, 1), &rules());
    assert_eq!(state.scalar_str("access"), Some("public_service"));
    // `service_created` seeded status first; the later seed is ignored.
    assert_eq!(state.scalar_str("status"), Some("active"));
  }

  #[test]
  fn constant_rule_overrides_a_seed() {
    let events = vec![
      event(0, "service_created", day(2019, 1, 1)),
      event(1, "service_ended", day(2023, 1, 1)),
    ];
    assert_eq!(
      resolve_state(ID, &events, day(2022, 1, 1), &rules()).scalar_str("status"),
      Some("active")
    );
    assert_eq!(
      resolve_state(ID, &events, day(2023, 1, 1), &rules()).scalar_str("status"),
      Some("ended")
    );
  }

  #[test]
  fn table_defaults_fill_untouched_fields() {
    let table = RuleTable::new("feed")
      .on("launch", MergeRule::scalar("access", "access"))
      .with_default("access", "none")
      .with_default("fares", false);

    let events = vec![event(0, "launch", day(2020, 1, 1)).with_detail("access", "public")];
    let before = resolve_state(ID, &events, day(2019, 1, 1), &table);
    let after = resolve_state(ID, &events, day(2020, 1, 1), &table);

    assert_eq!(before.scalar_str("access"), Some("none"));
    assert_eq!(after.scalar_str("access"), Some("public"));
    assert_eq!(after.scalar("fares"), Some(&json!(false)));
  }

  #[test]
  fn other_entities_are_ignored() {
    let mut events = scenario_a();
    events.push(
      Event::new("x", "cruise-sf", "access_changed", day(2020, 2, 1), 9)
        .with_detail("access", "paused"),
    );
    let state = resolve_state(ID, &events, day(2020, 6, 1), &rules());
    assert_eq!(state.scalar_str("access"), Some("closed_testing"));
    assert_eq!(state.applied_events, 1);
  }

  #[test]
  fn inputs_are_left_untouched() {
    let events = scenario_a();
    let copy = events.clone();
    let _ = resolve_state(ID, &events, day(2022, 1, 1), &rules());
    assert_eq!(events, copy);
  }
}
