//! SQLite backend for the riskmap flag store and change log.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. One [`SqliteStore`] implements both
//! [`FlagStore`](riskmap_core::store::FlagStore) and
//! [`ChangesetSink`](riskmap_core::store::ChangesetSink).

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
