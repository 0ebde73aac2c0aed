//! The `IdentificationGateway` trait and supporting types.
//!
//! The gateway is the only network dependency of the registration pipeline.
//! It performs N-way identification against a pre-trained gallery: one
//! detection call and one identification call per capture, independent of
//! gallery size. The gallery must be retrained after every enrollment before
//! `identify` reflects the change (see [`crate::training`]).

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::worker::ExternalIdentityHandle;

// ─── Types ───────────────────────────────────────────────────────────────────

/// Name of the gallery (person group) the gateway matches against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GalleryId(pub String);

impl GalleryId {
  pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for GalleryId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

/// Short-lived handle for a face detected in a probe image.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FaceHandle(pub String);

/// One ranked match returned by [`IdentificationGateway::identify`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
  pub identity:   ExternalIdentityHandle,
  /// In `[0, 1]`.
  pub confidence: f64,
}

impl Candidate {
  pub fn new(identity: impl Into<String>, confidence: f64) -> Self {
    Self { identity: ExternalIdentityHandle(identity.into()), confidence }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStatus {
  NotStarted,
  Running,
  Succeeded,
  Failed,
}

impl TrainingStatus {
  pub fn is_terminal(self) -> bool { matches!(self, Self::Succeeded | Self::Failed) }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Every gateway failure is a transient external failure from the pipeline's
/// point of view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
  #[error("gateway call timed out")]
  Timeout,

  #[error("gateway unreachable: {0}")]
  Unavailable(String),

  #[error("gateway rejected request with status {status}: {message}")]
  Rejected { status: u16, message: String },

  #[error("malformed gateway response: {0}")]
  Decode(String),
}

/// Bound a gateway call by `limit`; an elapsed call is a
/// [`GatewayError::Timeout`].
pub async fn with_timeout<T>(
  limit: Duration,
  call: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
  tokio::time::timeout(limit, call)
    .await
    .unwrap_or(Err(GatewayError::Timeout))
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a biometric identification provider.
///
/// Implementations are long-lived and shared across requests behind an `Arc`;
/// no method mutates request-scoped state.
pub trait IdentificationGateway: Send + Sync {
  /// Detect a face in `image`. Returns `None` when no face is present.
  fn detect_face<'a>(
    &'a self,
    image: &'a [u8],
  ) -> impl Future<Output = Result<Option<FaceHandle>, GatewayError>> + Send + 'a;

  /// Rank gallery identities against a detected face.
  fn identify<'a>(
    &'a self,
    face: &'a FaceHandle,
    gallery: &'a GalleryId,
  ) -> impl Future<Output = Result<Vec<Candidate>, GatewayError>> + Send + 'a;

  /// Create the gallery when it does not exist yet.
  fn ensure_gallery<'a>(
    &'a self,
    gallery: &'a GalleryId,
  ) -> impl Future<Output = Result<(), GatewayError>> + Send + 'a;

  /// Start a training cycle. Idempotent; completion is observed through
  /// [`training_status`](Self::training_status).
  fn train<'a>(
    &'a self,
    gallery: &'a GalleryId,
  ) -> impl Future<Output = Result<(), GatewayError>> + Send + 'a;

  fn training_status<'a>(
    &'a self,
    gallery: &'a GalleryId,
  ) -> impl Future<Output = Result<TrainingStatus, GatewayError>> + Send + 'a;

  /// Create a new, sample-less identity in the gallery.
  fn enroll_identity<'a>(
    &'a self,
    gallery: &'a GalleryId,
    name: &'a str,
  ) -> impl Future<Output = Result<ExternalIdentityHandle, GatewayError>> + Send + 'a;

  /// Attach a face sample taken from `image` to an enrolled identity.
  fn attach_sample<'a>(
    &'a self,
    gallery: &'a GalleryId,
    identity: &'a ExternalIdentityHandle,
    image: &'a [u8],
  ) -> impl Future<Output = Result<(), GatewayError>> + Send + 'a;

  /// Remove an identity; used to invalidate a rotated handle.
  fn delete_identity<'a>(
    &'a self,
    gallery: &'a GalleryId,
    identity: &'a ExternalIdentityHandle,
  ) -> impl Future<Output = Result<(), GatewayError>> + Send + 'a;
}
