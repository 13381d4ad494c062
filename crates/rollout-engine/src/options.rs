//! Tunables for an [`Engine`](crate::Engine), read from the `[engine]` table
//! of the server configuration.

use rollout_core::{loader::LoadPolicy, rules::RuleTable, ticks::DEFAULT_MIN_GAP};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
  /// Minimum distance between timeline ticks, in axis percent.
  pub tick_min_gap:        f64,
  /// Resolve against unpublished boundary versions too.
  pub include_unpublished: bool,
  pub load_policy:         LoadPolicy,
  /// Replaces the built-in deployment rule table when set.
  pub rules:               Option<RuleTable>,
}

impl Default for EngineOptions {
  fn default() -> Self {
    Self {
      tick_min_gap:        DEFAULT_MIN_GAP,
      include_unpublished: false,
      load_policy:         LoadPolicy::default(),
      rules:               None,
    }
  }
}

impl EngineOptions {
  pub fn rule_table(&self) -> RuleTable {
    self.rules.clone().unwrap_or_else(RuleTable::deployments)
  }
}
