//! Enrollment: binding a worker to a fresh gallery identity.
//!
//! A new enrollment photo always produces a new identity handle. The old
//! identity is deleted from the gallery only after the local store points at
//! the new one, so there is no window in which the worker is unrecognisable
//! through a handle the store no longer knows. Training is requested at the
//! end and runs in the background.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use uuid::Uuid;

use crate::{
  gateway::{GalleryId, GatewayError, IdentificationGateway, with_timeout},
  store::MealStore,
  training::{GalleryTrainer, TriggerOutcome},
  worker::ExternalIdentityHandle,
};

#[derive(Debug, Error)]
pub enum EnrollmentError {
  #[error("enrollment photo is empty")]
  EmptyImage,

  #[error("worker not found: {0}")]
  WorkerNotFound(Uuid),

  #[error("identification gateway error: {0}")]
  Gateway(#[from] GatewayError),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Result of a successful enrollment.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Enrollment {
  pub worker_id:        Uuid,
  pub identity_handle:  ExternalIdentityHandle,
  pub previous_handle:  Option<ExternalIdentityHandle>,
  /// `false` when the previous identity could not be removed from the gallery
  /// and must be cleaned up by an operator.
  pub previous_deleted: bool,
  pub training:         TriggerOutcome,
}

pub struct Enroller<S, G> {
  store:   Arc<S>,
  gateway: Arc<G>,
  trainer: Arc<GalleryTrainer<G>>,
  gallery: GalleryId,
  timeout: Duration,
}

impl<S, G> Enroller<S, G>
where
  S: MealStore,
  G: IdentificationGateway + 'static,
{
  pub fn new(
    store: Arc<S>,
    gateway: Arc<G>,
    trainer: Arc<GalleryTrainer<G>>,
    gallery: GalleryId,
    timeout: Duration,
  ) -> Self {
    Self { store, gateway, trainer, gallery, timeout }
  }

  pub fn trainer(&self) -> &GalleryTrainer<G> { &self.trainer }

  /// Enroll (or re-enroll) `worker_id` with `photo`.
  pub async fn enroll(
    &self,
    worker_id: Uuid,
    photo: &[u8],
  ) -> Result<Enrollment, EnrollmentError> {
    if photo.is_empty() {
      return Err(EnrollmentError::EmptyImage);
    }

    let worker = self
      .store
      .get_worker(worker_id)
      .await
      .map_err(store_error)?
      .ok_or(EnrollmentError::WorkerNotFound(worker_id))?;

    with_timeout(self.timeout, self.gateway.ensure_gallery(&self.gallery)).await?;

    let handle = with_timeout(
      self.timeout,
      self.gateway.enroll_identity(&self.gallery, &worker.name),
    )
    .await?;

    if let Err(e) = with_timeout(
      self.timeout,
      self.gateway.attach_sample(&self.gallery, &handle, photo),
    )
    .await
    {
      self.discard(&handle).await;
      return Err(e.into());
    }

    let previous = match self.store.replace_identity_handle(worker_id, handle.clone()).await {
      Ok(previous) => previous,
      Err(e) => {
        self.discard(&handle).await;
        return Err(store_error(e));
      }
    };

    let previous_deleted = match &previous {
      Some(old) => self.discard(old).await,
      None => true,
    };

    let (training, _) = self.trainer.trigger();

    tracing::info!(
      %worker_id,
      identity = %handle,
      rotated = previous.is_some(),
      "worker enrolled"
    );

    Ok(Enrollment {
      worker_id,
      identity_handle: handle,
      previous_handle: previous,
      previous_deleted,
      training,
    })
  }

  /// Best-effort removal of a gallery identity.
  async fn discard(&self, identity: &ExternalIdentityHandle) -> bool {
    match with_timeout(self.timeout, self.gateway.delete_identity(&self.gallery, identity))
      .await
    {
      Ok(()) => true,
      Err(e) => {
        tracing::error!(
          %identity,
          "failed to delete gallery identity; manual cleanup required: {e}"
        );
        false
      }
    }
  }
}

fn store_error<E>(e: E) -> EnrollmentError
where
  E: std::error::Error + Send + Sync + 'static,
{
  EnrollmentError::Store(Box::new(e))
}
