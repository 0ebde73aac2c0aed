//! JSON REST API for the Refeitório meal-benefit service.
//!
//! Exposes an axum [`Router`] backed by any [`MealStore`] and
//! [`IdentificationGateway`]. TLS and transport concerns are the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! axum::serve(listener, refeitorio_api::api_router(state)).await?;
//! ```

pub mod error;
pub mod gallery;
pub mod registrations;
pub mod reports;
pub mod workers;

use std::sync::Arc;

use axum::{
  Router,
  extract::DefaultBodyLimit,
  routing::{get, post, put},
};
use refeitorio_core::{
  enrollment::Enroller, gateway::IdentificationGateway, registrar::Registrar,
  store::MealStore, training::GalleryTrainer,
};
use tower_http::trace::TraceLayer;

pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
pub struct AppState<S, G> {
  pub store:     Arc<S>,
  pub registrar: Arc<Registrar<S, G>>,
  pub enroller:  Arc<Enroller<S, G>>,
  pub trainer:   Arc<GalleryTrainer<G>>,
}

impl<S, G> Clone for AppState<S, G> {
  fn clone(&self) -> Self {
    Self {
      store:     Arc::clone(&self.store),
      registrar: Arc::clone(&self.registrar),
      enroller:  Arc::clone(&self.enroller),
      trainer:   Arc::clone(&self.trainer),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
///
/// Request bodies may be up to twice the configured image limit so that
/// oversized photos reach the registration pipeline and are refused with a
/// structured outcome.
pub fn api_router<S, G>(state: AppState<S, G>) -> Router<()>
where
  S: MealStore + 'static,
  G: IdentificationGateway + 'static,
{
  let body_limit = state.registrar.config().max_image_bytes.saturating_mul(2);

  Router::new()
    // Registration
    .route(
      "/registrations",
      post(registrations::register::<S, G>).get(registrations::list::<S, G>),
    )
    .route("/registrations/{id}", get(registrations::get_one::<S, G>))
    .route(
      "/registrations/{id}/justification",
      post(registrations::justify::<S, G>),
    )
    // Reports
    .route("/alerts", get(reports::alerts::<S, G>))
    .route("/summary", get(reports::summary::<S, G>))
    // Workers
    .route("/workers", post(workers::create::<S, G>))
    .route(
      "/workers/{id}",
      get(workers::get_one::<S, G>).patch(workers::update::<S, G>),
    )
    .route("/workers/{id}/usage", get(workers::usage::<S, G>))
    .route("/workers/{id}/photo", put(workers::enroll::<S, G>))
    // Gallery
    .route(
      "/gallery/training",
      post(gallery::trigger::<S, G>).get(gallery::status::<S, G>),
    )
    .layer(DefaultBodyLimit::max(body_limit))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}
