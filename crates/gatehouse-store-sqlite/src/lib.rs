//! SQLite backend for the Gatehouse access store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. That thread runs one closure at a time,
//! and every multi-step operation runs inside a single `BEGIN IMMEDIATE`
//! transaction within one closure, so each read-decide-write sequence is
//! serialised against every other writer.

mod challenges;
mod encode;
mod equipment;
mod ledger;
mod notifications;
mod persons;
mod schema;
mod shifts;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
