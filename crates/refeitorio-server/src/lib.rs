//! Configuration and wiring for the `refeitorio` server binary.
//!
//! Settings come from a TOML file and `REFEITORIO_`-prefixed environment
//! variables, with `__` separating nested keys:
//!
//! ```text
//! REFEITORIO_GATEWAY__API_KEY=...   # overrides [gateway] api_key
//! REFEITORIO_SERVER__PORT=8080      # overrides [server] port
//! ```

use std::{path::PathBuf, time::Duration};

use config::{ConfigError, Environment};
use refeitorio_core::{
  meal::MealPolicy,
  registrar::RegistrarConfig,
  resolver::ConfidenceThreshold,
  training::TrainingConfig,
};
use refeitorio_face_gateway::FaceGatewayConfig;
use serde::Deserialize;

// ─── Sections ────────────────────────────────────────────────────────────────

/// `[server]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
  pub host:       String,
  pub port:       u16,
  /// SQLite database file; a leading `~/` is expanded.
  pub store_path: PathBuf,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      host:       "127.0.0.1".into(),
      port:       8080,
      store_path: PathBuf::from("refeitorio.db"),
    }
  }
}

/// `[recognition]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
  pub confidence_threshold: ConfidenceThreshold,
  pub max_image_bytes:      usize,
}

impl Default for RecognitionConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: ConfidenceThreshold::DEFAULT,
      max_image_bytes:      6 * 1024 * 1024,
    }
  }
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub server:      HttpConfig,
  pub gateway:     FaceGatewayConfig,
  pub recognition: RecognitionConfig,
  pub meals:       MealPolicy,
  pub training:    TrainingConfig,
}

impl ServerConfig {
  /// Read `path` (optional) layered under the environment.
  pub fn load(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
    Self::from_source(config::File::from(path.into()).required(false))
  }

  fn from_source<T>(file: T) -> Result<Self, ConfigError>
  where
    T: config::Source + Send + Sync + 'static,
  {
    config::Config::builder()
      .add_source(file)
      .add_source(
        Environment::with_prefix("REFEITORIO")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }

  pub fn address(&self) -> String { format!("{}:{}", self.server.host, self.server.port) }

  pub fn registrar_config(&self) -> RegistrarConfig {
    let mut config = RegistrarConfig::new(self.gateway.gallery());
    config.threshold = self.recognition.confidence_threshold;
    config.gateway_timeout = self.gateway.timeout();
    config.max_image_bytes = self.recognition.max_image_bytes;
    config.value_cents = self.meals.value_cents;
    config
  }

  /// Upper bound for a single gateway call made outside registration.
  pub fn call_timeout(&self) -> Duration { self.gateway.timeout() }
}
