//! Source adapters for the riskmap reconciler.
//!
//! Every adapter turns one external publication into an
//! [`AdapterBatch`](riskmap_core::adapter::AdapterBatch). Network access goes
//! through [`HttpFetcher`], per-country fan-out through [`pool::fan_out`].

pub mod config;
pub mod error;
pub mod file;
pub mod http;
pub mod list;
pub mod matcher;
pub mod pool;
pub mod score;
pub mod sections;
pub mod source;

pub use config::{Aliases, HttpConfig, SourceConfig, check_ownership};
pub use error::{Error, Result};
pub use http::HttpFetcher;
pub use source::{SourceAdapter, collect};

#[cfg(test)]
mod testing;
