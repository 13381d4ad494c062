//! Query parameters shared by several endpoints.

use chrono::{DateTime, Utc};
use rollout_core::time::require_instant;
use serde::Deserialize;

use crate::error::ApiError;

/// `?as_of=<instant>`. Any format [`parse_instant`] accepts; absent means
/// now.
///
/// [`parse_instant`]: rollout_core::time::parse_instant
#[derive(Debug, Default, Deserialize)]
pub struct AsOfParams {
  pub as_of: Option<String>,
}

impl AsOfParams {
  pub fn instant(&self) -> Result<DateTime<Utc>, ApiError> { instant_or_now(self.as_of.as_deref()) }
}

pub(crate) fn instant_or_now(raw: Option<&str>) -> Result<DateTime<Utc>, ApiError> {
  match raw.map(str::trim).filter(|s| !s.is_empty()) {
    None => Ok(Utc::now()),
    Some(s) => Ok(require_instant(s)?),
  }
}
