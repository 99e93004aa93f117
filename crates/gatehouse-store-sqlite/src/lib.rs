//! SQLite backend for Gatehouse.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. One [`SqliteStore`] serves both as the
//! [`gatehouse_core::store::AccessStore`] and as a local copy of the
//! [`gatehouse_core::directory::IdentityDirectory`].

mod directory;
mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use directory::SeedCounts;
pub use store::SqliteStore;


#[cfg(test)]
mod service_tests;
