//! Background gallery training.
//!
//! Training is kicked off by enrollment flows, never by the registration
//! pipeline, and runs on its own tokio task. A trigger that arrives while a
//! cycle is running queues exactly one follow-up cycle, so every enrollment is
//! eventually covered by a completed training run.

use std::{
  sync::{Arc, Mutex, PoisonError},
  time::Duration,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::gateway::{
  GalleryId, GatewayError, IdentificationGateway, TrainingStatus, with_timeout,
};

/// Poll cadence for a training cycle, from the `[training]` config section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
  pub poll_interval_ms: u64,
  /// Give up on a cycle after this many status polls.
  pub max_polls:        u32,
  pub call_timeout_ms:  u64,
}

impl Default for TrainingConfig {
  fn default() -> Self {
    Self { poll_interval_ms: 1_000, max_polls: 120, call_timeout_ms: 10_000 }
  }
}

/// What a call to [`GalleryTrainer::trigger`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
  /// A new background cycle was spawned.
  Started,
  /// A cycle is already running; another will follow it.
  Queued,
}

/// Point-in-time view of the trainer, served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingSnapshot {
  pub status:        TrainingStatus,
  pub in_flight:     bool,
  pub rerun_pending: bool,
  pub cycles:        u64,
  pub started_at:    Option<DateTime<Utc>>,
  pub finished_at:   Option<DateTime<Utc>>,
  pub last_error:    Option<String>,
}

impl Default for TrainingSnapshot {
  fn default() -> Self {
    Self {
      status:        TrainingStatus::NotStarted,
      in_flight:     false,
      rerun_pending: false,
      cycles:        0,
      started_at:    None,
      finished_at:   None,
      last_error:    None,
    }
  }
}

pub struct GalleryTrainer<G> {
  gateway: Arc<G>,
  gallery: GalleryId,
  config:  TrainingConfig,
  state:   Arc<Mutex<TrainingSnapshot>>,
}

impl<G> GalleryTrainer<G>
where
  G: IdentificationGateway + 'static,
{
  pub fn new(gateway: Arc<G>, gallery: GalleryId, config: TrainingConfig) -> Self {
    Self {
      gateway,
      gallery,
      config,
      state: Arc::new(Mutex::new(TrainingSnapshot::default())),
    }
  }

  pub fn status(&self) -> TrainingSnapshot {
    self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Request a training cycle. Never waits for training to finish.
  ///
  /// Returns the spawned task when a new cycle started; callers may ignore it.
  /// Must be called from within a tokio runtime.
  pub fn trigger(&self) -> (TriggerOutcome, Option<JoinHandle<()>>) {
    {
      let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
      if st.in_flight {
        st.rerun_pending = true;
        return (TriggerOutcome::Queued, None);
      }
      st.in_flight = true;
    }

    let gateway = Arc::clone(&self.gateway);
    let gallery = self.gallery.clone();
    let config = self.config.clone();
    let state = Arc::clone(&self.state);

    let handle = tokio::spawn(async move {
      loop {
        run_cycle(gateway.as_ref(), &gallery, &config, &state).await;

        let mut st = state.lock().unwrap_or_else(PoisonError::into_inner);
        if st.rerun_pending {
          st.rerun_pending = false;
          continue;
        }
        st.in_flight = false;
        break;
      }
    });

    (TriggerOutcome::Started, Some(handle))
  }
}

async fn run_cycle<G>(
  gateway: &G,
  gallery: &GalleryId,
  config: &TrainingConfig,
  state: &Mutex<TrainingSnapshot>,
) where
  G: IdentificationGateway,
{
  {
    let mut st = state.lock().unwrap_or_else(PoisonError::into_inner);
    st.status = TrainingStatus::Running;
    st.cycles += 1;
    st.started_at = Some(Utc::now());
    st.finished_at = None;
    st.last_error = None;
  }
  tracing::info!(%gallery, "gallery training started");

  let result = train_to_completion(gateway, gallery, config).await;

  let mut st = state.lock().unwrap_or_else(PoisonError::into_inner);
  st.finished_at = Some(Utc::now());
  match result {
    Ok(TrainingStatus::Succeeded) => {
      st.status = TrainingStatus::Succeeded;
      tracing::info!(%gallery, "gallery training succeeded");
    }
    Ok(status) => {
      st.status = TrainingStatus::Failed;
      st.last_error = Some(format!("training ended with status {status:?}"));
      tracing::error!(%gallery, ?status, "gallery training failed");
    }
    Err(e) => {
      st.status = TrainingStatus::Failed;
      st.last_error = Some(e.to_string());
      tracing::error!(%gallery, "gallery training failed: {e}");
    }
  }
}

async fn train_to_completion<G>(
  gateway: &G,
  gallery: &GalleryId,
  config: &TrainingConfig,
) -> Result<TrainingStatus, GatewayError>
where
  G: IdentificationGateway,
{
  let timeout = Duration::from_millis(config.call_timeout_ms);
  let interval = Duration::from_millis(config.poll_interval_ms);

  with_timeout(timeout, gateway.train(gallery)).await?;

  for _ in 0..config.max_polls {
    let status = with_timeout(timeout, gateway.training_status(gallery)).await?;
    if status.is_terminal() {
      return Ok(status);
    }
    tokio::time::sleep(interval).await;
  }
  Err(GatewayError::Timeout)
}
