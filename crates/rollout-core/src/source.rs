//! The `EventSource` trait and the raw log it yields.
//!
//! Sources are implemented by the fetch layer (`rollout-engine`). Resolution
//! never talks to a source directly; the engine fetches a [`RawLog`], loads it
//! and then resolves over the in-memory result.

use std::future::Future;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geometry::Geometry;

// ─── Raw log ─────────────────────────────────────────────────────────────────

/// Everything a source serves in one fetch, before normalisation.
///
/// Sections hold untyped entries; the loader reads them one by one, so a
/// single unreadable entry is skipped rather than failing the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
  /// Entity records, read as [`Entity`](crate::entity::Entity).
  #[serde(default)]
  pub entities:  Vec<Value>,
  /// Raw event records, read as [`RawRecord`](crate::loader::RawRecord).
  #[serde(default)]
  pub events:    Vec<Value>,
  /// Read as [`RawShape`](crate::loader::RawShape).
  #[serde(default)]
  pub shapes:    Vec<Value>,
  /// Read as [`RawSnapshot`](crate::loader::RawSnapshot).
  #[serde(default)]
  pub snapshots: Vec<Value>,
}

impl RawLog {
  /// Parse a log document as served by a file or HTTP source.
  pub fn from_json(bytes: &[u8]) -> crate::Result<Self> { Ok(serde_json::from_slice(bytes)?) }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over where the rollout dataset lives.
///
/// All methods return `Send` futures so a source can be shared across tasks
/// of a multi-threaded runtime.
pub trait EventSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Fetch the complete raw log.
  fn fetch_log(&self) -> impl Future<Output = Result<RawLog, Self::Error>> + Send + '_;

  /// Fetch the geometry of one shape version. `None` when the source has no
  /// geometry under that id.
  fn fetch_geometry<'a>(
    &'a self,
    version_id: &'a str,
  ) -> impl Future<Output = Result<Option<Geometry>, Self::Error>> + Send + 'a;
}
