//! Field-merge rule tables.
//!
//! One resolver serves every entity family; what differs between families is
//! the table mapping each event type to the fields it touches and how. Tables
//! are plain data, so a deployment can ship its own through configuration.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── MergeRule ───────────────────────────────────────────────────────────────

/// How one event type affects one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum MergeRule {
  /// Last-write-wins: replace scalar `field` with `details[key]` when the
  /// event carries that key.
  Scalar { field: String, key: String },
  /// Last-write-wins with a fixed value (e.g. `status = "ended"`).
  Constant { field: String, value: Value },
  /// Apply `details[add]`, then `details[remove]`, to set `field`.
  Set {
    field:  String,
    add:    String,
    remove: String,
  },
  /// Seed scalar `field` from `details[key]` (or `value` when the key is
  /// absent) only if no other event sets it. Never overrides an explicit
  /// value, whether that value is written earlier or later.
  Bootstrap {
    field: String,
    #[serde(default)]
    key:   Option<String>,
    #[serde(default)]
    value: Option<Value>,
  },
}

impl MergeRule {
  pub fn scalar(field: &str, key: &str) -> Self {
    Self::Scalar { field: field.to_owned(), key: key.to_owned() }
  }

  pub fn constant(field: &str, value: impl Into<Value>) -> Self {
    Self::Constant { field: field.to_owned(), value: value.into() }
  }

  pub fn set(field: &str, add: &str, remove: &str) -> Self {
    Self::Set {
      field:  field.to_owned(),
      add:    add.to_owned(),
      remove: remove.to_owned(),
    }
  }

  pub fn bootstrap(field: &str, key: Option<&str>, value: Option<Value>) -> Self {
    Self::Bootstrap {
      field: field.to_owned(),
      key: key.map(str::to_owned),
      value,
    }
  }

  /// The field this rule writes.
  pub fn field(&self) -> &str {
    match self {
      Self::Scalar { field, .. }
      | Self::Constant { field, .. }
      | Self::Set { field, .. }
      | Self::Bootstrap { field, .. } => field,
    }
  }
}

// ─── RuleTable ───────────────────────────────────────────────────────────────

/// The merge rules for one entity family, keyed by event type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleTable {
  pub family:         String,
  #[serde(default)]
  pub rules:          BTreeMap<String, Vec<MergeRule>>,
  /// Scalar values in effect before any event applies.
  #[serde(default)]
  pub defaults:       BTreeMap<String, Value>,
  /// Event types that end a deployment; the timeline axis of an ended
  /// entity stops at its last event instead of running to "now".
  #[serde(default)]
  pub terminal_types: BTreeSet<String>,
}

impl RuleTable {
  pub fn new(family: impl Into<String>) -> Self {
    Self { family: family.into(), ..Self::default() }
  }

  pub fn on(mut self, event_type: &str, rule: MergeRule) -> Self {
    self.rules.entry(event_type.to_owned()).or_default().push(rule);
    self
  }

  pub fn with_default(mut self, field: &str, value: impl Into<Value>) -> Self {
    self.defaults.insert(field.to_owned(), value.into());
    self
  }

  pub fn terminal(mut self, event_type: &str) -> Self {
    self.terminal_types.insert(event_type.to_owned());
    self
  }

  /// Rules for `event_type`; unknown types affect nothing.
  pub fn rules_for(&self, event_type: &str) -> &[MergeRule] {
    self.rules.get(event_type).map(Vec::as_slice).unwrap_or_default()
  }

  pub fn is_terminal(&self, event_type: &str) -> bool {
    self.terminal_types.contains(event_type)
  }

  /// The canonical table for ride-hailing deployments.
  ///
  /// | Event type | Effect |
  /// |------------|--------|
  /// | `service_created` | `access`, `autonomy`, `fares` scalars; `platforms`, `vehicle_types` sets; seeds `status = "active"` |
  /// | `service_updated` | `access`, `autonomy`, `fares` scalars |
  /// | `access_changed` | `access` scalar |
  /// | `autonomy_changed` | `autonomy` scalar |
  /// | `platform_updated` | `platforms` set via `add` / `remove` |
  /// | `fleet_updated` | `vehicle_types` set via `add` / `remove`; `fleet_size` scalar |
  /// | `testing_started` | seeds `access = "testing"`, `autonomy = "safety_driver"`, `status = "testing"` |
  /// | `service_ended` | `status = "ended"`; terminal |
  pub fn deployments() -> Self {
    Self::new("deployment")
      .on("service_created", MergeRule::scalar("access", "access"))
      .on("service_created", MergeRule::scalar("autonomy", "autonomy"))
      .on("service_created", MergeRule::scalar("fares", "fares"))
      .on("service_created", MergeRule::set("platforms", "platforms", "platforms_removed"))
      .on(
        "service_created",
        MergeRule::set("vehicle_types", "vehicle_types", "vehicle_types_removed"),
      )
      .on("service_created", MergeRule::bootstrap("status", None, Some("active".into())))
      .on("service_updated", MergeRule::scalar("access", "access"))
      .on("service_updated", MergeRule::scalar("autonomy", "autonomy"))
      .on("service_updated", MergeRule::scalar("fares", "fares"))
      .on("access_changed", MergeRule::scalar("access", "access"))
      .on("autonomy_changed", MergeRule::scalar("autonomy", "autonomy"))
      .on("platform_updated", MergeRule::set("platforms", "add", "remove"))
      .on("fleet_updated", MergeRule::set("vehicle_types", "add", "remove"))
      .on("fleet_updated", MergeRule::scalar("fleet_size", "fleet_size"))
      .on(
        "testing_started",
        MergeRule::bootstrap("access", Some("access"), Some("testing".into())),
      )
      .on(
        "testing_started",
        MergeRule::bootstrap("autonomy", Some("autonomy"), Some("safety_driver".into())),
      )
      .on("testing_started", MergeRule::bootstrap("status", None, Some("testing".into())))
      .on("service_ended", MergeRule::constant("status", "ended"))
      .terminal("service_ended")
  }
}
