//! Timeline ticks for the scrub bar.
//!
//! One entity's events are grouped by calendar day (UTC) and laid out on a
//! 0–100 axis running from the entity's first event to its last one, or to
//! "now" while the deployment is still running. The layout is deterministic
//! so markers never jitter between renders.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{event::Event, rules::RuleTable};

/// Default minimum distance between two ticks, in axis percent.
pub const DEFAULT_MIN_GAP: f64 = 3.0;

const AXIS_MAX: f64 = 100.0;

/// One event as shown in a tick's tooltip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickEvent {
  pub event_id:     String,
  pub event_type:   String,
  pub effective_at: DateTime<Utc>,
  pub description:  Option<String>,
  pub details:      Map<String, Value>,
}

impl From<&Event> for TickEvent {
  fn from(e: &Event) -> Self {
    Self {
      event_id:     e.event_id.clone(),
      event_type:   e.event_type.clone(),
      effective_at: e.effective_at,
      description:  e.description.clone(),
      details:      e.details.clone(),
    }
  }
}

/// All of one day's events at one position on the axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineTick {
  pub date:     NaiveDate,
  /// Position in `[0, 100]` after de-overlapping.
  pub position: f64,
  pub events:   Vec<TickEvent>,
}

/// Lay out `events` as day-grouped ticks.
///
/// The axis ends at the last event when the latest event at or before `now`
/// is terminal per `rules`, and at `now` (or the last event, if later)
/// otherwise. Scanning in date order, a tick closer than `min_gap` to the one
/// placed before it moves to exactly `min_gap` past it, never beyond 100.
pub fn assemble_ticks(
  events: &[Event],
  rules: &RuleTable,
  now: DateTime<Utc>,
  min_gap: f64,
) -> Vec<TimelineTick> {
  let mut ordered: Vec<&Event> = events.iter().collect();
  ordered.sort_by_key(|e| e.ordering_key());

  let (Some(first), Some(last)) = (ordered.first(), ordered.last()) else {
    return Vec::new();
  };
  let start = first.effective_at.date_naive();
  let last_day = last.effective_at.date_naive();

  let ended = ordered
    .iter()
    .rev()
    .find(|e| e.effective_at <= now)
    .is_some_and(|e| rules.is_terminal(&e.event_type));
  let end = if ended { last_day } else { last_day.max(now.date_naive()) };
  let span_days = (end - start).num_days() as f64;

  let mut groups: BTreeMap<NaiveDate, Vec<TickEvent>> = BTreeMap::new();
  for event in &ordered {
    groups
      .entry(event.effective_at.date_naive())
      .or_default()
      .push(TickEvent::from(*event));
  }

  let mut placed: Option<f64> = None;
  groups
    .into_iter()
    .map(|(date, events)| {
      let raw = if span_days > 0.0 {
        (date - start).num_days() as f64 / span_days * AXIS_MAX
      } else {
        0.0
      };
      let position = match placed {
        Some(prev) if raw - prev < min_gap => prev + min_gap,
        _ => raw,
      }
      .clamp(0.0, AXIS_MAX);
      placed = Some(position);
      TimelineTick { date, position, events }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
  }

  fn event(seq: u64, kind: &str, at: DateTime<Utc>) -> Event {
    Event::new(format!("e{seq}"), "zoox-lv", kind, at, seq)
  }

  fn positions(ticks: &[TimelineTick]) -> Vec<f64> {
    ticks.iter().map(|t| t.position).collect()
  }

  #[test]
  fn no_events_no_ticks() {
    let ticks = assemble_ticks(&[], &RuleTable::deployments(), day(2024, 1, 1), DEFAULT_MIN_GAP);
    assert!(ticks.is_empty());
  }

  #[test]
  fn same_day_events_share_one_tick() {
    let events = vec![
      event(0, "service_created", day(2020, 1, 1)).with_description("launch"),
      event(1, "platform_updated", Utc.with_ymd_and_hms(2020, 1, 1, 18, 30, 0).unwrap()),
      event(2, "service_ended", day(2020, 1, 11)),
    ];
    let ticks = assemble_ticks(&events, &RuleTable::deployments(), day(2030, 1, 1), 0.0);

    assert_eq!(ticks.len(), 2);
    assert_eq!(ticks[0].events.len(), 2);
    assert_eq!(ticks[0].events[0].description.as_deref(), Some("launch"));
    assert_eq!(positions(&ticks), [0.0, 100.0]);
  }

  #[test]
  fn active_entity_axis_runs_to_now() {
    let events = vec![
      event(0, "service_created", day(2020, 1, 1)),
      event(1, "service_updated", day(2020, 1, 11)),
    ];
    let ticks = assemble_ticks(&events, &RuleTable::deployments(), day(2020, 1, 21), 0.0);
    assert_eq!(positions(&ticks), [0.0, 50.0]);
  }

  #[test]
  fn ended_entity_axis_stops_at_its_last_event() {
    let events = vec![
      event(0, "service_created", day(2020, 1, 1)),
      event(1, "service_updated", day(2020, 1, 6)),
      event(2, "service_ended", day(2020, 1, 11)),
    ];
    let ticks = assemble_ticks(&events, &RuleTable::deployments(), day(2025, 1, 1), 0.0);
    assert_eq!(positions(&ticks), [0.0, 50.0, 100.0]);
  }

  #[test]
  fn crowded_ticks_are_pushed_right_by_the_gap() {
    let events = vec![
      event(0, "service_created", day(2020, 1, 1)),
      event(1, "service_updated", day(2020, 1, 2)),
      event(2, "service_updated", day(2020, 1, 3)),
      event(3, "service_ended", day(2020, 4, 10)),
    ];
    // 100 day span: raw positions 0, 1, 2, 100.
    let ticks = assemble_ticks(&events, &RuleTable::deployments(), day(2021, 1, 1), 5.0);
    assert_eq!(positions(&ticks), [0.0, 5.0, 10.0, 100.0]);
  }

  #[test]
  fn pushed_ticks_are_clamped_to_the_axis() {
    let events = vec![
      event(0, "service_created", day(2020, 1, 1)),
      event(1, "service_updated", day(2020, 4, 9)),
      event(2, "service_ended", day(2020, 4, 10)),
    ];
    let ticks = assemble_ticks(&events, &RuleTable::deployments(), day(2021, 1, 1), 5.0);
    assert_eq!(positions(&ticks), [0.0, 99.0, 100.0]);
  }

  #[test]
  fn layout_is_reproducible_regardless_of_input_order() {
    let mut events = vec![
      event(0, "service_created", day(2020, 1, 1)),
      event(1, "service_updated", day(2020, 1, 2)),
      event(2, "platform_updated", day(2020, 2, 1)),
    ];
    let rules = RuleTable::deployments();
    let first = assemble_ticks(&events, &rules, day(2020, 6, 1), DEFAULT_MIN_GAP);
    events.reverse();
    let second = assemble_ticks(&events, &rules, day(2020, 6, 1), DEFAULT_MIN_GAP);
    assert_eq!(first, second);
  }

  #[test]
  fn single_day_history_sits_at_the_origin() {
    let events = vec![event(0, "service_created", day(2020, 1, 1))];
    let ticks = assemble_ticks(&events, &RuleTable::deployments(), day(2020, 1, 1), DEFAULT_MIN_GAP);
    assert_eq!(positions(&ticks), [0.0]);
  }
}
