//! The fetch-and-cache layer of the rollout tracker.
//!
//! Owns everything `rollout-core` deliberately leaves out: talking to a
//! source, caching geometries by version id and coalescing rapid as-of
//! requests while the user scrubs through time.
//!
//! Embedders that drive a time slider (a map front-end, a desktop viewer)
//! should start from [`transition_feed`]: it wraps a [`SharedEngine`] in a
//! [`ScrubFeed`] that refreshes from the source and resolves the map layer for
//! only the latest settled instant. The HTTP server in `rollout-server`
//! answers single as-of queries and does not use it.

mod cache;
mod engine;
mod options;
mod scrub;
mod source;

pub mod error;

pub use cache::{CachedGeometry, GeometryCache};
pub use engine::{
  Engine, LoadSummary, OperatorArea, SharedEngine, TransitionEntry, TransitionFilter,
  TransitionView,
};
pub use error::{Error, Result};
pub use options::EngineOptions;
pub use scrub::{ScrubFeed, Scrubbed, transition_feed};
pub use source::{ConfiguredSource, FileSource, HttpSource, MemorySource, SourceConfig};
