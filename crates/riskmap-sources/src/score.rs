//! Adapter for per-country score pages such as a corruption perception index.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use regex::Regex;
use riskmap_core::{
  adapter::{Adapter, AdapterBatch, AdapterError},
  country::{CountryName, Score},
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  config::ScoreSource,
  http::HttpFetcher,
  matcher::strip_markup,
  pool::fan_out,
};

pub struct ScoreAdapter {
  name:        String,
  url:         Arc<str>,
  pattern:     Arc<Regex>,
  slugs:       Arc<BTreeMap<CountryName, String>>,
  fetcher:     HttpFetcher,
  concurrency: usize,
  /// How long the per-country fan-out may run before the remaining
  /// countries are reported unresolved.
  budget:      Duration,
}

impl ScoreAdapter {
  pub fn new(
    source: &ScoreSource,
    fetcher: HttpFetcher,
    concurrency: usize,
    budget: Duration,
  ) -> Result<Self> {
    if !source.url.contains("{slug}") {
      return Err(Error::Config(format!("{}: url must contain {{slug}}", source.name)));
    }
    Ok(Self {
      name: source.name.clone(),
      url: source.url.as_str().into(),
      pattern: Arc::new(Regex::new(&source.pattern)?),
      slugs: Arc::new(source.slugs.clone()),
      fetcher,
      concurrency,
      budget,
    })
  }
}

/// `template` with `{slug}` replaced by the override for `country`, or by
/// its derived slug.
pub(crate) fn country_url(
  template: &str,
  slugs: &BTreeMap<CountryName, String>,
  country: &CountryName,
) -> String {
  let slug = slugs.get(country).cloned().unwrap_or_else(|| country.slug());
  template.replace("{slug}", &slug)
}

/// Pull the score out of a page. Uses the group named `score` if the
/// pattern has one, the first group otherwise. A missing or unparseable
/// value is "no score", never an error.
pub fn extract_score(pattern: &Regex, html: &str) -> Option<Score> {
  let text = strip_markup(html);
  let caps = pattern.captures(&text)?;
  let raw = caps.name("score").or_else(|| caps.get(1))?;
  Score::parse(raw.as_str())
}

/// What one country's page said.
#[derive(Debug, PartialEq, Eq)]
enum Lookup {
  Found(Option<Score>),
  Failed(String),
}

impl Adapter for ScoreAdapter {
  fn name(&self) -> &str { &self.name }

  async fn fetch(&self, known: &[CountryName]) -> Result<AdapterBatch, AdapterError> {
    let deadline = Instant::now() + self.budget;
    let fetcher = self.fetcher.clone();
    let url = self.url.clone();
    let pattern = self.pattern.clone();
    let slugs = self.slugs.clone();

    let results = fan_out(known.to_vec(), self.concurrency, deadline, move |country| {
      let fetcher = fetcher.clone();
      let pattern = pattern.clone();
      let url = country_url(&url, &slugs, &country);
      async move {
        match fetcher.get_text(&url).await {
          Ok(Some(body)) => Lookup::Found(extract_score(&pattern, &body)),
          Ok(None) => Lookup::Found(None),
          Err(e) => Lookup::Failed(format!("{url}: {e}")),
        }
      }
    })
    .await;

    let mut batch = AdapterBatch::new(&self.name);
    let mut last_failure = None;
    for (country, lookup) in results {
      match lookup {
        Some(Lookup::Found(score)) => {
          debug!(source = %self.name, %country, ?score, "score");
          batch.scores.insert(country, score);
        }
        Some(Lookup::Failed(reason)) => {
          warn!(source = %self.name, %country, "fetch failed: {reason}");
          last_failure = Some(reason);
          batch.unresolved.insert(country);
        }
        None => {
          warn!(source = %self.name, %country, "not fetched before the deadline");
          batch.unresolved.insert(country);
        }
      }
    }

    // Nothing came back at all: report the source as failed instead of
    // applying an all-unresolved batch.
    if batch.scores.is_empty() && !known.is_empty() {
      return Err(match last_failure {
        Some(reason) => AdapterError::Fetch { url: self.url.to_string(), reason },
        None => AdapterError::Timeout(self.name.clone()),
      });
    }

    info!(
      source = %self.name,
      scored = batch.scores.values().filter(|s| s.is_some()).count(),
      unscored = batch.scores.values().filter(|s| s.is_none()).count(),
      unresolved = batch.unresolved.len(),
      "collected scores"
    );
    Ok(batch)
  }
}
