//! Building adapters from configuration and running them together.

use std::{sync::Arc, time::Duration};

use riskmap_core::{
  adapter::{Adapter, AdapterBatch, AdapterError},
  country::CountryName,
};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
  Result,
  config::{Aliases, HttpConfig, SourceConfig},
  file::FileListAdapter,
  http::HttpFetcher,
  list::ListAdapter,
  pool::fan_out,
  score::ScoreAdapter,
  sections::SectionsAdapter,
};

/// Any configured adapter.
pub enum SourceAdapter {
  List(ListAdapter),
  Score(ScoreAdapter),
  File(FileListAdapter),
  Sections(SectionsAdapter),
}

impl SourceAdapter {
  /// `run_timeout` bounds the whole run; per-country fan-out stops a little
  /// earlier so partial results still make it back.
  pub fn from_config(
    config: &SourceConfig,
    fetcher: &HttpFetcher,
    http: &HttpConfig,
    aliases: &Aliases,
    run_timeout: Duration,
  ) -> Result<Self> {
    Ok(match config {
      SourceConfig::List(s) => Self::List(ListAdapter::new(s, fetcher.clone(), aliases.clone())),
      SourceConfig::Score(s) => Self::Score(ScoreAdapter::new(
        s,
        fetcher.clone(),
        http.concurrency,
        run_timeout.mul_f64(0.9),
      )?),
      SourceConfig::File(s) => Self::File(FileListAdapter::new(s, aliases.clone())),
      SourceConfig::Sections(s) => Self::Sections(SectionsAdapter::new(
        s,
        fetcher.clone(),
        http.concurrency,
        run_timeout.mul_f64(0.9),
      )?),
    })
  }
}

impl Adapter for SourceAdapter {
  fn name(&self) -> &str {
    match self {
      SourceAdapter::List(a) => a.name(),
      SourceAdapter::Score(a) => a.name(),
      SourceAdapter::File(a) => a.name(),
      SourceAdapter::Sections(a) => a.name(),
    }
  }

  async fn fetch(&self, known: &[CountryName]) -> Result<AdapterBatch, AdapterError> {
    match self {
      SourceAdapter::List(a) => a.fetch(known).await,
      SourceAdapter::Score(a) => a.fetch(known).await,
      SourceAdapter::File(a) => a.fetch(known).await,
      SourceAdapter::Sections(a) => a.fetch(known).await,
    }
  }
}

/// Run every adapter concurrently against `known`, each bounded by the run
/// deadline. Adapters still running at the deadline are aborted and
/// reported as [`AdapterError::Timeout`]. Output order follows `adapters`.
pub async fn collect<A>(
  adapters: Vec<A>,
  known: Vec<CountryName>,
  timeout: Duration,
) -> Vec<(String, Result<AdapterBatch, AdapterError>)>
where
  A: Adapter + 'static,
{
  let deadline = Instant::now() + timeout;
  let known: Arc<[CountryName]> = known.into();
  let adapters: Vec<Arc<A>> = adapters.into_iter().map(Arc::new).collect();
  let width = adapters.len();

  info!(sources = width, countries = known.len(), "fetching sources");
  let results = fan_out(adapters, width, deadline, move |adapter| {
    let known = known.clone();
    async move { adapter.fetch(&known).await }
  })
  .await;

  results
    .into_iter()
    .map(|(adapter, outcome)| {
      let name = adapter.name().to_owned();
      let outcome = outcome.unwrap_or_else(|| {
        warn!(source = %name, "incomplete at the run deadline");
        Err(AdapterError::Timeout(name.clone()))
      });
      (name, outcome)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use riskmap_core::flag::Flag;

  use super::*;

  struct Fixed {
    name:  &'static str,
    delay: Duration,
    fail:  bool,
  }

  impl Adapter for Fixed {
    fn name(&self) -> &str { self.name }

    async fn fetch(&self, known: &[CountryName]) -> Result<AdapterBatch, AdapterError> {
      tokio::time::sleep(self.delay).await;
      if self.fail {
        return Err(AdapterError::Fetch { url: "http://unreachable".into(), reason: "refused".into() });
      }
      Ok(AdapterBatch::new(self.name).with_listed([Flag::UkFinancialSanctions], known.to_vec()))
    }
  }

  #[tokio::test]
  async fn slow_adapters_time_out_without_blocking_others() {
    let adapters = vec![
      Fixed { name: "slow", delay: Duration::from_secs(30), fail: false },
      Fixed { name: "fast", delay: Duration::from_millis(5), fail: false },
      Fixed { name: "broken", delay: Duration::ZERO, fail: true },
    ];
    let known = vec![CountryName::new("Russia").unwrap()];

    let out = collect(adapters, known, Duration::from_millis(300)).await;

    let names: Vec<&str> = out.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["slow", "fast", "broken"]);
    assert!(matches!(out[0].1, Err(AdapterError::Timeout(_))));
    assert!(out[1].1.is_ok());
    assert!(matches!(out[2].1, Err(AdapterError::Fetch { .. })));
  }

  #[test]
  fn adapters_are_built_from_config() {
    let raw = r#"[
      { "kind": "list", "name": "fatf-im", "url": "https://example.org/im",
        "flags": ["FATF_INCREASED_MONITORING"] },
      { "kind": "score", "name": "cpi", "url": "https://example.org/{slug}", "pattern": "(\\d+)" },
      { "kind": "file", "name": "eu-tax", "path": "eu.json", "flags": ["EU_NON_COOPERATIVE"] },
      { "kind": "sections", "name": "fr-treasury", "url": "https://example.org/{slug}",
        "measures": [{ "pattern": "gels? des avoirs", "flags": ["FR_ASSET_FREEZE"] }] }
    ]"#;
    let configs: Vec<SourceConfig> = serde_json::from_str(raw).unwrap();
    let http = HttpConfig::default();
    let fetcher = HttpFetcher::new(&http).unwrap();

    let adapters: Vec<SourceAdapter> = configs
      .iter()
      .map(|c| SourceAdapter::from_config(c, &fetcher, &http, &Aliases::new(), Duration::from_secs(60)))
      .collect::<Result<_>>()
      .unwrap();

    let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
    assert_eq!(names, ["fatf-im", "cpi", "eu-tax", "fr-treasury"]);
    assert!(matches!(adapters[1], SourceAdapter::Score(_)));
    assert!(matches!(adapters[3], SourceAdapter::Sections(_)));
  }

  #[test]
  fn invalid_score_pattern_is_rejected() {
    let config: SourceConfig = serde_json::from_str(
      r#"{ "kind": "score", "name": "cpi", "url": "https://example.org/{slug}", "pattern": "(" }"#,
    )
    .unwrap();
    let http = HttpConfig::default();
    let fetcher = HttpFetcher::new(&http).unwrap();
    let built =
      SourceAdapter::from_config(&config, &fetcher, &http, &Aliases::new(), Duration::from_secs(1));
    assert!(built.is_err());
  }
}
