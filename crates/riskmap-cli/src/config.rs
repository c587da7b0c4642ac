//! Application configuration: `riskmap.toml` layered with `RISKMAP_*`
//! environment variables.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use riskmap_core::classify::ClassificationScheme;
use riskmap_sources::{Aliases, HttpConfig, SourceConfig, check_ownership};
use serde::Deserialize;

/// Runtime configuration, deserialised from `riskmap.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub store_path:       PathBuf,
  /// Upper bound for fetching every source in one run.
  pub run_timeout_secs: u64,
  pub http:             HttpConfig,
  pub classification:   ClassificationScheme,
  pub aliases:          Aliases,
  pub sources:          Vec<SourceConfig>,
}

impl Default for AppConfig {
  fn default() -> Self {
    Self {
      store_path:       PathBuf::from("~/.local/share/riskmap/riskmap.db"),
      run_timeout_secs: 600,
      http:             HttpConfig::default(),
      classification:   ClassificationScheme::default(),
      aliases:          Aliases::default(),
      sources:          Vec::new(),
    }
  }
}

impl AppConfig {
  /// Read `path` (optional) and the environment. Nested keys use `__` in
  /// variable names: `RISKMAP_HTTP__TIMEOUT_SECS=10`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("RISKMAP")
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read config file")?;

    let cfg: Self = settings.try_deserialize().context("failed to deserialise AppConfig")?;
    cfg.validate()?;
    Ok(cfg)
  }

  /// Reject configurations where two sources would write the same column.
  pub fn validate(&self) -> anyhow::Result<()> {
    check_ownership(&self.sources).context("invalid [[sources]] configuration")
  }

  pub fn run_timeout(&self) -> Duration { Duration::from_secs(self.run_timeout_secs) }

  pub fn store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
