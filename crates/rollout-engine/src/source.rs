//! Concrete [`EventSource`]s: an in-memory log, a JSON file on disk and a
//! JSON document served over HTTP.

use std::{
  collections::HashMap,
  convert::Infallible,
  path::{Path, PathBuf},
  time::Duration,
};

use reqwest::{Client, StatusCode};
use rollout_core::{geometry::Geometry, source::EventSource, source::RawLog};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{Error, Result};

// ─── Memory ──────────────────────────────────────────────────────────────────

/// A log held in memory. The log can be swapped out to simulate upstream
/// changes between refreshes.
#[derive(Debug, Default)]
pub struct MemorySource {
  log:        RwLock<RawLog>,
  geometries: RwLock<HashMap<String, Geometry>>,
}

impl MemorySource {
  pub fn new(log: RawLog) -> Self {
    Self { log: RwLock::new(log), geometries: RwLock::default() }
  }

  pub fn with_geometry(mut self, version_id: impl Into<String>, geometry: Geometry) -> Self {
    self.geometries.get_mut().insert(version_id.into(), geometry);
    self
  }

  pub async fn replace_log(&self, log: RawLog) { *self.log.write().await = log; }
}

impl EventSource for MemorySource {
  type Error = Infallible;

  async fn fetch_log(&self) -> Result<RawLog, Infallible> { Ok(self.log.read().await.clone()) }

  async fn fetch_geometry(&self, version_id: &str) -> Result<Option<Geometry>, Infallible> {
    Ok(self.geometries.read().await.get(version_id).cloned())
  }
}

// ─── File ────────────────────────────────────────────────────────────────────

/// A JSON [`RawLog`] on disk, with geometries optionally stored beside it as
/// `<geometry_dir>/<version_id>.geojson`.
#[derive(Debug, Clone)]
pub struct FileSource {
  path:         PathBuf,
  geometry_dir: Option<PathBuf>,
}

impl FileSource {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into(), geometry_dir: None }
  }

  pub fn with_geometry_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.geometry_dir = Some(dir.into());
    self
  }

  pub fn path(&self) -> &Path { &self.path }
}

impl EventSource for FileSource {
  type Error = Error;

  async fn fetch_log(&self) -> Result<RawLog> {
    let bytes = tokio::fs::read(&self.path)
      .await
      .map_err(|source| Error::Io { path: self.path.clone(), source })?;
    Ok(RawLog::from_json(&bytes)?)
  }

  async fn fetch_geometry(&self, version_id: &str) -> Result<Option<Geometry>> {
    let Some(dir) = &self.geometry_dir else {
      return Ok(None);
    };
    if !is_plain_file_name(version_id) {
      return Ok(None);
    }

    let path = dir.join(format!("{version_id}.geojson"));
    match tokio::fs::read(&path).await {
      Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
      Err(source) if source.kind() == std::io::ErrorKind::NotFound => Ok(None),
      Err(source) => Err(Error::Io { path, source }),
    }
  }
}

/// Version ids become file names; refuse anything that could leave the
/// geometry directory.
fn is_plain_file_name(id: &str) -> bool {
  !id.is_empty() && !id.contains(['/', '\\']) && id != "." && id != ".."
}

// ─── HTTP ────────────────────────────────────────────────────────────────────

/// A JSON [`RawLog`] served at `log_url`; geometries are fetched from
/// `<geometry_url>/<version_id>.geojson` when a geometry URL is configured.
#[derive(Debug, Clone)]
pub struct HttpSource {
  client:       Client,
  log_url:      String,
  geometry_url: Option<String>,
}

impl HttpSource {
  pub fn new(log_url: impl Into<String>, geometry_url: Option<String>) -> Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self { client, log_url: log_url.into(), geometry_url })
  }
}

impl EventSource for HttpSource {
  type Error = Error;

  async fn fetch_log(&self) -> Result<RawLog> {
    let resp = self.client.get(&self.log_url).send().await?;
    if !resp.status().is_success() {
      return Err(Error::Status { url: self.log_url.clone(), status: resp.status() });
    }
    Ok(resp.json().await?)
  }

  async fn fetch_geometry(&self, version_id: &str) -> Result<Option<Geometry>> {
    let Some(base) = &self.geometry_url else {
      return Ok(None);
    };
    let url = format!("{}/{version_id}.geojson", base.trim_end_matches('/'));

    let resp = self.client.get(&url).send().await?;
    match resp.status() {
      StatusCode::NOT_FOUND => Ok(None),
      status if status.is_success() => Ok(Some(resp.json().await?)),
      status => Err(Error::Status { url, status }),
    }
  }
}

// ─── Configuration ───────────────────────────────────────────────────────────

/// Where the server reads its dataset from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
  File {
    path:         PathBuf,
    #[serde(default)]
    geometry_dir: Option<PathBuf>,
  },
  Http {
    url:          String,
    #[serde(default)]
    geometry_url: Option<String>,
  },
}

impl Default for SourceConfig {
  fn default() -> Self {
    Self::File { path: PathBuf::from("rollouts.json"), geometry_dir: None }
  }
}

impl SourceConfig {
  pub fn build(&self) -> Result<ConfiguredSource> {
    Ok(match self {
      Self::File { path, geometry_dir } => {
        let source = FileSource::new(path);
        ConfiguredSource::File(match geometry_dir {
          Some(dir) => source.with_geometry_dir(dir),
          None => source,
        })
      }
      Self::Http { url, geometry_url } => {
        ConfiguredSource::Http(HttpSource::new(url, geometry_url.clone())?)
      }
    })
  }
}

/// A source built from [`SourceConfig`].
#[derive(Debug, Clone)]
pub enum ConfiguredSource {
  File(FileSource),
  Http(HttpSource),
}

impl EventSource for ConfiguredSource {
  type Error = Error;

  async fn fetch_log(&self) -> Result<RawLog> {
    match self {
      Self::File(s) => s.fetch_log().await,
      Self::Http(s) => s.fetch_log().await,
    }
  }

  async fn fetch_geometry(&self, version_id: &str) -> Result<Option<Geometry>> {
    match self {
      Self::File(s) => s.fetch_geometry(version_id).await,
      Self::Http(s) => s.fetch_geometry(version_id).await,
    }
  }
}
