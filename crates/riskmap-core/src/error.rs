//! Error types for `riskmap-core`.

use thiserror::Error;

use crate::{country::CountryName, flag::Flag};

#[derive(Debug, Error)]
pub enum Error {
  #[error("country not found: {0}")]
  CountryNotFound(CountryName),

  #[error("country already exists: {0}")]
  CountryExists(CountryName),

  #[error("invalid country name: {0:?}")]
  InvalidCountryName(String),

  #[error("unknown flag: {0:?}")]
  UnknownFlag(String),

  #[error("invalid value {value:?} for flag {flag}")]
  InvalidFlagValue { flag: Flag, value: String },

  #[error("unknown field: {0:?}")]
  UnknownField(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
