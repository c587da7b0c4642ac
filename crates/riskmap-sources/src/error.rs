//! Error type for `riskmap-sources`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("{url} answered {status}")]
  Status { url: String, status: u16 },

  #[error("invalid pattern: {0}")]
  Pattern(#[from] regex::Error),

  #[error("cannot read {path}: {source}")]
  Io { path: PathBuf, source: std::io::Error },

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("invalid source configuration: {0}")]
  Config(String),
}

impl Error {
  /// Worth another attempt: connection problems, timeouts and gateway-ish
  /// server errors.
  pub fn is_transient(&self) -> bool {
    match self {
      Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
      Error::Status { status, .. } => matches!(status, 500 | 502 | 503 | 504),
      _ => false,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
