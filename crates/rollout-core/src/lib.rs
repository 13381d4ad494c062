//! Core types and point-in-time resolution for the rollout tracker.
//!
//! Everything here is a pure, synchronous function over data that has
//! already been fetched into memory. Fetching, caching and serving live in
//! `rollout-engine` and `rollout-api`; this crate depends on nothing beyond
//! serde and chrono.

pub mod domain;
pub mod entity;
pub mod error;
pub mod event;
pub mod geometry;
pub mod loader;
pub mod rules;
pub mod shape;
pub mod source;
pub mod state;
pub mod ticks;
pub mod time;
pub mod transition;

pub use error::{Error, Result};
