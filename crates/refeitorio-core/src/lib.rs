//! Core types, trait definitions and the registration pipeline for the
//! Refeitório meal-benefit service.
//!
//! This crate is deliberately free of HTTP and database dependencies. Storage
//! backends implement [`store::MealStore`]; biometric providers implement
//! [`gateway::IdentificationGateway`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod enrollment;
pub mod error;
pub mod gateway;
pub mod ledger;
pub mod meal;
pub mod outcome;
pub mod registrar;
pub mod resolver;
pub mod store;
pub mod training;
pub mod worker;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use error::{Error, Result};
