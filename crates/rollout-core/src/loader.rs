//! The event log loader: heterogeneous raw records in, typed events and shape
//! versions out.
//!
//! Raw event records come in two flavours. A *structured* record names its
//! `type` and carries a `details` object; a *blob* is any other JSON object,
//! from which the fields are picked by a list of accepted key spellings.
//! Either way, a record's arrival position becomes its `sequence`.
//!
//! Only dates are mandatory. A record whose date is missing or unparsable (or
//! which names no entity) is malformed; whether that skips the record or
//! aborts the whole load is the caller's [`LoadPolicy`].
//!
//! Every section of a log is read one element at a time from plain JSON
//! values, so an entry serde cannot read is malformed in the same way and one
//! bad entry never fails its neighbours.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
  Error, Result,
  entity::{Entity, EntityId},
  event::Event,
  geometry::Geometry,
  shape::{DataQualityWarning, ShapeVersion, Snapshot, versions_from_snapshots},
  time::parse_instant,
};

/// Event type given to blob records that name none.
pub const DEFAULT_EVENT_TYPE: &str = "note";

const ENTITY_KEYS: &[&str] = &["entity_id", "entityId", "entity", "deployment_id"];
const TYPE_KEYS: &[&str] = &["type", "event_type", "eventType", "kind", "event"];
const DATE_KEYS: &[&str] = &["date", "recorded_at", "recordedAt", "created_at"];
const EFFECTIVE_KEYS: &[&str] = &[
  "effective_from",
  "effectiveFrom",
  "effective_at",
  "effectiveAt",
  "effective_date",
  "effectiveDate",
];
const DESCRIPTION_KEYS: &[&str] = &["description", "summary", "note"];
const ID_KEYS: &[&str] = &["id", "event_id", "eventId"];

// ─── Raw records ─────────────────────────────────────────────────────────────

/// One raw event record, as found in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawRecord {
  Structured(StructuredRecord),
  Blob(Map<String, Value>),
}

/// A record with an explicit `type` and `details` object.
///
/// Accepts the same key spellings as a blob, so a record reads the same
/// whether or not it carries `details`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredRecord {
  #[serde(default, skip_serializing_if = "Option::is_none", alias = "event_id", alias = "eventId")]
  pub id:             Option<Value>,
  #[serde(alias = "entityId", alias = "entity", alias = "deployment_id")]
  pub entity_id:      EntityId,
  #[serde(
    rename = "type",
    alias = "event_type",
    alias = "eventType",
    alias = "kind",
    alias = "event"
  )]
  pub event_type:     String,
  /// When the change was recorded.
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    alias = "recorded_at",
    alias = "recordedAt",
    alias = "created_at"
  )]
  pub date:           Option<String>,
  /// When the change takes effect, if different from `date`.
  #[serde(
    default,
    skip_serializing_if = "Option::is_none",
    alias = "effectiveFrom",
    alias = "effective_at",
    alias = "effectiveAt",
    alias = "effective_date",
    alias = "effectiveDate"
  )]
  pub effective_from: Option<String>,
  pub details:        Map<String, Value>,
  #[serde(default, skip_serializing_if = "Option::is_none", alias = "summary", alias = "note")]
  pub description:    Option<String>,
}

/// What to do with a malformed record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadPolicy {
  /// Record the failure and keep loading.
  #[default]
  SkipAndContinue,
  /// Fail the whole load on the first malformed record.
  Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
  Entity,
  Event,
  Shape,
  Snapshot,
}

impl RecordKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Entity => "entity",
      Self::Event => "event",
      Self::Shape => "shape",
      Self::Snapshot => "snapshot",
    }
  }
}

/// A record dropped under [`LoadPolicy::SkipAndContinue`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRecord {
  pub kind:  RecordKind,
  /// Position in its input list.
  pub index: usize,
  pub error: String,
}

// ─── Entities ────────────────────────────────────────────────────────────────

/// Readable entity records, in input order.
#[derive(Debug, Clone, Default)]
pub struct EntityList {
  pub entities: Vec<Entity>,
  pub skipped:  Vec<SkippedRecord>,
}

/// Read every entity record. An entry without a usable id is malformed.
pub fn load_entities(records: &[Value], policy: LoadPolicy) -> Result<EntityList> {
  let mut list = EntityList::default();
  for (index, value) in records.iter().enumerate() {
    let entity = decode::<Entity>(value, RecordKind::Entity, index).and_then(|entity| {
      if entity.entity_id.trim().is_empty() {
        return Err(malformed(&format!("entity #{index}"), "empty entity id"));
      }
      Ok(entity)
    });
    match entity {
      Ok(entity) => list.entities.push(entity),
      Err(err) => skip_or_abort(&mut list.skipped, policy, RecordKind::Entity, index, err)?,
    }
  }
  Ok(list)
}

// ─── Events ──────────────────────────────────────────────────────────────────

/// Normalised events, grouped by entity, each group in arrival order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
  pub by_entity: BTreeMap<EntityId, Vec<Event>>,
  pub skipped:   Vec<SkippedRecord>,
}

impl EventLog {
  pub fn events(&self, entity_id: &str) -> &[Event] {
    self.by_entity.get(entity_id).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn len(&self) -> usize { self.by_entity.values().map(Vec::len).sum() }

  pub fn is_empty(&self) -> bool { self.by_entity.is_empty() }
}

/// Normalise every record, in order.
pub fn load_events(records: &[Value], policy: LoadPolicy) -> Result<EventLog> {
  let mut log = EventLog::default();
  for (index, value) in records.iter().enumerate() {
    let event = decode::<RawRecord>(value, RecordKind::Event, index)
      .and_then(|record| normalize_record(&record, index as u64));
    match event {
      Ok(event) => log.by_entity.entry(event.entity_id.clone()).or_default().push(event),
      Err(err) => skip_or_abort(&mut log.skipped, policy, RecordKind::Event, index, err)?,
    }
  }
  Ok(log)
}

/// Turn one raw record into an [`Event`] with the given arrival position.
///
/// `effective_at` falls back to the record date and vice versa. A record
/// without an id is named `{entity_id}:{sequence}`.
pub fn normalize_record(record: &RawRecord, sequence: u64) -> Result<Event> {
  match record {
    RawRecord::Structured(r) => {
      let label = record_label(r.id.as_ref(), Some(&r.entity_id), sequence);
      let (effective_at, recorded_at) =
        event_dates(&label, r.effective_from.as_deref(), r.date.as_deref())?;
      Ok(Event {
        event_id: label_or_default(r.id.as_ref(), &r.entity_id, sequence),
        entity_id: r.entity_id.clone(),
        event_type: r.event_type.clone(),
        effective_at,
        recorded_at,
        sequence,
        description: r.description.clone(),
        details: r.details.clone(),
      })
    }
    RawRecord::Blob(map) => normalize_blob(map, sequence),
  }
}

fn normalize_blob(map: &Map<String, Value>, sequence: u64) -> Result<Event> {
  let id = pick(map, ID_KEYS);
  let entity_id = pick(map, ENTITY_KEYS).and_then(scalar_string);
  let label = record_label(id, entity_id.as_ref(), sequence);
  let Some(entity_id) = entity_id.filter(|e| !e.is_empty()) else {
    return Err(malformed(&label, "no entity id"));
  };

  let effective = pick(map, EFFECTIVE_KEYS).and_then(scalar_string);
  let date = pick(map, DATE_KEYS).and_then(scalar_string);
  let (effective_at, recorded_at) = event_dates(&label, effective.as_deref(), date.as_deref())?;

  let details = match map.get("details") {
    Some(Value::Object(details)) => details.clone(),
    _ => map
      .iter()
      .filter(|(k, _)| !is_envelope_key(k))
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect(),
  };

  Ok(Event {
    event_id: label_or_default(id, &entity_id, sequence),
    event_type: pick(map, TYPE_KEYS)
      .and_then(scalar_string)
      .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_owned()),
    entity_id,
    effective_at,
    recorded_at,
    sequence,
    description: pick(map, DESCRIPTION_KEYS).and_then(scalar_string),
    details,
  })
}

/// `(effective_at, recorded_at)`; each defaults to the other.
fn event_dates(
  label: &str,
  effective: Option<&str>,
  recorded: Option<&str>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
  let parse = |raw: Option<&str>| -> Result<Option<DateTime<Utc>>> {
    raw
      .map(|s| parse_instant(s).ok_or_else(|| malformed(label, &format!("unparsable date {s:?}"))))
      .transpose()
  };
  match (parse(effective)?, parse(recorded)?) {
    (Some(e), Some(r)) => Ok((e, r)),
    (Some(d), None) | (None, Some(d)) => Ok((d, d)),
    (None, None) => Err(malformed(label, "no date")),
  }
}

fn is_envelope_key(key: &str) -> bool {
  [ENTITY_KEYS, TYPE_KEYS, DATE_KEYS, EFFECTIVE_KEYS, DESCRIPTION_KEYS, ID_KEYS]
    .iter()
    .any(|keys| keys.contains(&key))
}

// ─── Shapes ──────────────────────────────────────────────────────────────────

/// A raw boundary version with an explicit validity interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawShape {
  #[serde(alias = "version_id", alias = "versionId")]
  pub id:         String,
  #[serde(alias = "entityId")]
  pub entity_id:  EntityId,
  #[serde(alias = "validFrom")]
  pub valid_from: String,
  #[serde(default, alias = "validTo")]
  pub valid_to:   Option<String>,
  #[serde(default = "published_default")]
  pub published:  bool,
  /// Inline GeoJSON; when absent it is fetched by `id` on demand.
  #[serde(default)]
  pub geometry:   Option<Geometry>,
}

/// A raw boundary snapshot: an effective date instead of an interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSnapshot {
  #[serde(default)]
  pub id:             Option<String>,
  #[serde(alias = "entityId")]
  pub entity_id:      EntityId,
  #[serde(alias = "effectiveDate", alias = "date")]
  pub effective_date: String,
  #[serde(default, alias = "endDate")]
  pub end_date:       Option<String>,
  #[serde(default = "published_default")]
  pub published:      bool,
  #[serde(default)]
  pub geometry:       Option<Geometry>,
}

fn published_default() -> bool { true }

/// Normalised shape versions plus the geometries that arrived inline.
#[derive(Debug, Clone, Default)]
pub struct ShapeLog {
  pub versions:   Vec<ShapeVersion>,
  pub geometries: BTreeMap<String, Geometry>,
  pub warnings:   Vec<DataQualityWarning>,
  pub skipped:    Vec<SkippedRecord>,
}

/// Normalise interval shapes and snapshots into one list of versions.
///
/// Snapshot sequences continue after the shapes', so a snapshot counts as
/// supplied later than every explicit shape.
pub fn load_shapes(shapes: &[Value], snapshots: &[Value], policy: LoadPolicy) -> Result<ShapeLog> {
  let mut log = ShapeLog::default();

  for (index, value) in shapes.iter().enumerate() {
    let shape = decode::<RawShape>(value, RecordKind::Shape, index)
      .and_then(|raw| normalize_shape(&raw, index as u64).map(|version| (version, raw.geometry)));
    match shape {
      Ok((version, geometry)) => {
        if let Some(geometry) = geometry {
          log.geometries.insert(version.version_id.clone(), geometry);
        }
        log.versions.push(version);
      }
      Err(err) => skip_or_abort(&mut log.skipped, policy, RecordKind::Shape, index, err)?,
    }
  }

  let offset = shapes.len() as u64;
  let mut parsed = Vec::with_capacity(snapshots.len());
  for (index, value) in snapshots.iter().enumerate() {
    let snapshot = decode::<RawSnapshot>(value, RecordKind::Snapshot, index).and_then(|raw| {
      normalize_snapshot(&raw, index, offset + index as u64).map(|snapshot| (snapshot, raw.geometry))
    });
    match snapshot {
      Ok((snapshot, geometry)) => {
        if let Some(geometry) = geometry {
          log.geometries.insert(snapshot.version_id.clone(), geometry);
        }
        parsed.push(snapshot);
      }
      Err(err) => skip_or_abort(&mut log.skipped, policy, RecordKind::Snapshot, index, err)?,
    }
  }

  let (versions, warnings) = versions_from_snapshots(parsed);
  log.versions.extend(versions);
  log.warnings.extend(warnings);
  Ok(log)
}

fn normalize_shape(raw: &RawShape, sequence: u64) -> Result<ShapeVersion> {
  let label = format!("shape {}", raw.id);
  let valid_from = required_date(&label, &raw.valid_from)?;
  let valid_to = raw
    .valid_to
    .as_deref()
    .map(|s| required_date(&label, s))
    .transpose()?;
  if let Some(end) = valid_to
    && end <= valid_from
  {
    return Err(malformed(&label, "valid_to does not follow valid_from"));
  }

  Ok(ShapeVersion {
    version_id: raw.id.clone(),
    entity_id: raw.entity_id.clone(),
    valid_from,
    valid_to,
    published: raw.published,
    sequence,
  })
}

fn normalize_snapshot(raw: &RawSnapshot, index: usize, sequence: u64) -> Result<Snapshot> {
  let version_id = raw
    .id
    .clone()
    .unwrap_or_else(|| format!("{}:snapshot:{index}", raw.entity_id));
  let label = format!("snapshot {version_id}");
  let effective_date = required_date(&label, &raw.effective_date)?;
  let end_date = raw
    .end_date
    .as_deref()
    .map(|s| required_date(&label, s))
    .transpose()?;
  if let Some(end) = end_date
    && end <= effective_date
  {
    return Err(malformed(&label, "end_date does not follow effective_date"));
  }

  Ok(Snapshot {
    version_id,
    entity_id: raw.entity_id.clone(),
    effective_date,
    end_date,
    published: raw.published,
    sequence,
  })
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

/// Read one log entry as `T`; an unreadable entry is malformed.
fn decode<T: DeserializeOwned>(value: &Value, kind: RecordKind, index: usize) -> Result<T> {
  T::deserialize(value)
    .map_err(|err| malformed(&format!("{} #{index}", kind.as_str()), &err.to_string()))
}

fn skip_or_abort(
  skipped: &mut Vec<SkippedRecord>,
  policy: LoadPolicy,
  kind: RecordKind,
  index: usize,
  err: Error,
) -> Result<()> {
  match policy {
    LoadPolicy::Abort => Err(err),
    LoadPolicy::SkipAndContinue => {
      skipped.push(SkippedRecord { kind, index, error: err.to_string() });
      Ok(())
    }
  }
}

fn required_date(label: &str, raw: &str) -> Result<DateTime<Utc>> {
  parse_instant(raw).ok_or_else(|| malformed(label, &format!("unparsable date {raw:?}")))
}

fn malformed(record: &str, reason: &str) -> Error {
  Error::MalformedEvent { record: record.to_owned(), reason: reason.to_owned() }
}

/// The first present, non-null value among `keys`.
fn pick<'a>(map: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
  keys.iter().find_map(|k| map.get(*k).filter(|v| !v.is_null()))
}

fn scalar_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

fn label_or_default(id: Option<&Value>, entity_id: &str, sequence: u64) -> String {
  id.and_then(scalar_string)
    .unwrap_or_else(|| format!("{entity_id}:{sequence}"))
}

fn record_label(id: Option<&Value>, entity_id: Option<&EntityId>, sequence: u64) -> String {
  match (id.and_then(scalar_string), entity_id) {
    (Some(id), _) => id,
    (None, Some(entity)) => format!("{entity}:{sequence}"),
    (None, None) => format!("#{sequence}"),
  }
}
