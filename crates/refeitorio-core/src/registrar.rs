//! The registration orchestrator.
//!
//! ```text
//! Received → Detected → Identified → Resolved → Classified → Entitled → Recorded
//! ```
//!
//! Each arrow may exit with a [`RegistrationFailure`]. Nothing is retried
//! within a request and nothing is written before `Recorded`; the single write
//! is one store transaction, so dropping the future (client disconnect) can
//! abandon gateway calls but never leaves a partial event behind.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::Utc;

use crate::{
  gateway::{self, GalleryId, GatewayError, IdentificationGateway},
  ledger::{NewRegistration, TimestampSource},
  meal::MealClassifier,
  outcome::{
    Capture, FailureClass, RegistrationFailure, RegistrationOutcome,
    RegistrationSuccess, Stage,
  },
  resolver::{self, ConfidenceThreshold},
  store::MealStore,
};

/// Tunables for [`Registrar`]; all externally supplied.
#[derive(Debug, Clone)]
pub struct RegistrarConfig {
  pub gallery:         GalleryId,
  pub threshold:       ConfidenceThreshold,
  /// Upper bound on any single gateway call.
  pub gateway_timeout: Duration,
  pub max_image_bytes: usize,
  pub value_cents:     i64,
}

impl RegistrarConfig {
  pub fn new(gallery: GalleryId) -> Self {
    Self {
      gallery,
      threshold: ConfidenceThreshold::DEFAULT,
      gateway_timeout: Duration::from_secs(10),
      max_image_bytes: 6 * 1024 * 1024,
      value_cents: 0,
    }
  }
}

/// Sequences gateway, resolver, classifier, entitlement check and ledger for
/// each capture. Holds only process-wide handles; cheap to share.
pub struct Registrar<S, G> {
  store:      Arc<S>,
  gateway:    Arc<G>,
  classifier: MealClassifier,
  config:     RegistrarConfig,
}

impl<S, G> Registrar<S, G>
where
  S: MealStore,
  G: IdentificationGateway,
{
  pub fn new(
    store: Arc<S>,
    gateway: Arc<G>,
    classifier: MealClassifier,
    config: RegistrarConfig,
  ) -> Self {
    Self { store, gateway, classifier, config }
  }

  pub fn classifier(&self) -> &MealClassifier { &self.classifier }

  pub fn config(&self) -> &RegistrarConfig { &self.config }

  /// Run one capture through the pipeline and log the outcome.
  pub async fn register(&self, capture: Capture) -> RegistrationOutcome {
    let outcome = self.run(capture).await;
    match &outcome {
      Ok(s) if s.is_duplicate => tracing::warn!(
        registration_id = %s.registration_id,
        worker = %s.worker_name,
        meal = %s.meal_category,
        "duplicate same-day registration recorded and flagged"
      ),
      Ok(s) => tracing::info!(
        registration_id = %s.registration_id,
        worker = %s.worker_name,
        meal = %s.meal_category,
        "registration recorded"
      ),
      Err(f) => match f.class() {
        FailureClass::Consistency => {
          tracing::error!(code = f.code(), "registration refused: {f}")
        }
        FailureClass::Infrastructure => {
          tracing::warn!(code = f.code(), "registration failed: {f}")
        }
        FailureClass::Input | FailureClass::Recognition | FailureClass::Policy => {
          tracing::info!(code = f.code(), "registration refused: {f}")
        }
      },
    }
    outcome
  }

  async fn run(&self, capture: Capture) -> RegistrationOutcome {
    // Received
    let Capture { image, captured_at } = capture;
    if image.is_empty() {
      return Err(RegistrationFailure::EmptyImage);
    }
    if image.len() > self.config.max_image_bytes {
      return Err(RegistrationFailure::ImageTooLarge {
        size:  Some(image.len()),
        limit: self.config.max_image_bytes,
      });
    }
    let (captured_at, timestamp_source) = match captured_at {
      Some(at) => (at, TimestampSource::Device),
      None => (Utc::now(), TimestampSource::Server),
    };

    // Detected
    let face = self
      .call_gateway(Stage::Detected, self.gateway.detect_face(&image))
      .await?
      .ok_or(RegistrationFailure::NoFaceDetected)?;

    // Identified
    let candidates = self
      .call_gateway(Stage::Identified, self.gateway.identify(&face, &self.config.gallery))
      .await?;
    let candidate = resolver::select_candidate(&candidates, self.config.threshold)?;
    tracing::debug!(
      identity = %candidate.identity,
      confidence = candidate.confidence,
      "candidate accepted"
    );

    // Resolved
    let local = self
      .store
      .find_worker_by_handle(&candidate.identity)
      .await
      .map_err(|e| RegistrationFailure::PersistenceFailure {
        stage:  Stage::Resolved,
        reason: e.to_string(),
      })?;
    let worker = resolver::admit(&candidate.identity, local)?;

    // Classified
    let classification = self.classifier.classify(captured_at);

    // Entitled
    if !worker.entitlements.allows(classification.category) {
      return Err(RegistrationFailure::EntitlementDenied {
        worker_id:     worker.worker_id,
        worker_name:   worker.name,
        meal_category: classification.category,
      });
    }

    // Recorded
    let input =
      NewRegistration::snapshot(&worker, &classification, captured_at, timestamp_source)
        .with_value(self.config.value_cents)
        .with_capture(&image);
    let event = self.store.append_registration(input).await.map_err(|e| {
      RegistrationFailure::PersistenceFailure {
        stage:  Stage::Recorded,
        reason: e.to_string(),
      }
    })?;

    Ok(RegistrationSuccess::from(event))
  }

  /// Bound a gateway call by the configured timeout and fold every error into
  /// a retryable `GatewayUnavailable`.
  async fn call_gateway<T>(
    &self,
    stage: Stage,
    call: impl Future<Output = Result<T, GatewayError>>,
  ) -> Result<T, RegistrationFailure> {
    gateway::with_timeout(self.config.gateway_timeout, call)
      .await
      .map_err(|e| RegistrationFailure::GatewayUnavailable {
        stage,
        reason: e.to_string(),
      })
  }
}
