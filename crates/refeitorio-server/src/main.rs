//! refeitorio server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! ledger, connects to the face service and serves the JSON API over HTTP.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::Parser;
use refeitorio_api::AppState;
use refeitorio_core::{
  enrollment::Enroller,
  gateway::{IdentificationGateway, with_timeout},
  meal::MealClassifier,
  registrar::Registrar,
  training::GalleryTrainer,
};
use refeitorio_face_gateway::HttpFaceGateway;
use refeitorio_server::ServerConfig;
use refeitorio_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Refeitório meal-benefit registration server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
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

  let cfg = ServerConfig::load(&cli.config).context("failed to load configuration")?;
  if cfg.gateway.endpoint.trim().is_empty() {
    anyhow::bail!("gateway.endpoint is not set");
  }

  let classifier =
    MealClassifier::new(&cfg.meals).context("invalid [meals] configuration")?;

  let store_path = expand_tilde(&cfg.server.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  let store = Arc::new(store);

  let gateway = HttpFaceGateway::new(cfg.gateway.clone())
    .context("failed to build face service client")?;
  let gateway = Arc::new(gateway);
  let gallery = cfg.gateway.gallery();

  // Registration works against an existing gallery, so a failure here is not
  // fatal.
  if let Err(e) = with_timeout(cfg.call_timeout(), gateway.ensure_gallery(&gallery)).await
  {
    tracing::warn!(%gallery, "could not verify the face gallery: {e}");
  }

  let trainer = Arc::new(GalleryTrainer::new(
    Arc::clone(&gateway),
    gallery.clone(),
    cfg.training.clone(),
  ));
  let registrar = Arc::new(Registrar::new(
    Arc::clone(&store),
    Arc::clone(&gateway),
    classifier,
    cfg.registrar_config(),
  ));
  let enroller = Arc::new(Enroller::new(
    Arc::clone(&store),
    Arc::clone(&gateway),
    Arc::clone(&trainer),
    gallery,
    cfg.call_timeout(),
  ));

  let app = refeitorio_api::api_router(AppState { store, registrar, enroller, trainer });
  let address = cfg.address();

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
