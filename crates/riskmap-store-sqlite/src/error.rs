//! Error type for `riskmap-store-sqlite`.

use riskmap_core::country::CountryName;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] riskmap_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored column held text that no longer maps to a domain value.
  #[error("cannot decode stored {column}: {value:?}")]
  Decode { column: &'static str, value: String },

  #[error("database schema version {found} is newer than supported version {supported}")]
  UnsupportedSchema { found: i64, supported: i64 },

  #[error("country not found: {0}")]
  CountryNotFound(CountryName),

  #[error("country already exists: {0}")]
  CountryExists(CountryName),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
