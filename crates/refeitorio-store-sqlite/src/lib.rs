//! SQLite backend for the Refeitório worker store and usage ledger.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every call is a single closure on that
//! thread, which makes each write atomic with respect to request cancellation.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
