//! HTTP adapter for a Face-API–style identification service.
//!
//! Implements [`refeitorio_core::gateway::IdentificationGateway`] over the
//! service's person-group REST endpoints with [`reqwest`].

mod client;
mod wire;

pub use client::{FaceGatewayConfig, HttpFaceGateway};

#[cfg(test)]
mod tests;
