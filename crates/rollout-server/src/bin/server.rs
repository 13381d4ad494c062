//! rollout-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), loads the rollout
//! dataset from the configured source, and serves the query API over HTTP.
//!
//! # Validating a dataset
//!
//! To load the dataset, print what was loaded and exit without serving:
//!
//! ```
//! cargo run -p rollout-server --bin server -- --check
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use rollout_api::AppState;
use rollout_engine::{Engine, SourceConfig};
use rollout_server::ServerConfig;
use tokio::{net::TcpListener, sync::RwLock};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "AV rollout tracker server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Load the dataset, print a summary as JSON and exit.
  #[arg(long)]
  check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let mut server_cfg = ServerConfig::load(&cli.config)?;

  if let SourceConfig::File { path, geometry_dir } = &mut server_cfg.source {
    *path = expand_tilde(path);
    if let Some(dir) = geometry_dir {
      *dir = expand_tilde(dir);
    }
  }

  let source = server_cfg
    .source
    .build()
    .context("failed to configure event source")?;
  let engine = Engine::load(&source, server_cfg.engine.clone())
    .await
    .context("failed to load rollout dataset")?;

  if cli.check {
    let summary = serde_json::to_string_pretty(&engine.summary())?;
    println!("{summary}");
    return Ok(());
  }

  let state = AppState {
    engine: Arc::new(RwLock::new(engine)),
    source: Arc::new(source),
  };

  let app = rollout_server::app(state);
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
