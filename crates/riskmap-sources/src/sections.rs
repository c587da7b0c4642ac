//! Adapter for per-country pages that list the restrictive measures in force,
//! one section or bullet per measure.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Arc,
  time::Duration,
};

use regex::{Regex, RegexBuilder};
use riskmap_core::{
  adapter::{Adapter, AdapterBatch, AdapterError},
  country::CountryName,
  flag::{Flag, FlagValue},
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  config::SectionsSource,
  http::HttpFetcher,
  matcher::strip_markup,
  pool::fan_out,
  score::country_url,
};

struct MeasureRule {
  pattern: Regex,
  flags:   Vec<Flag>,
}

pub struct SectionsAdapter {
  name:        String,
  url:         Arc<str>,
  rules:       Arc<Vec<MeasureRule>>,
  owned:       BTreeSet<Flag>,
  slugs:       Arc<BTreeMap<CountryName, String>>,
  fetcher:     HttpFetcher,
  concurrency: usize,
  budget:      Duration,
}

impl SectionsAdapter {
  pub fn new(
    source: &SectionsSource,
    fetcher: HttpFetcher,
    concurrency: usize,
    budget: Duration,
  ) -> Result<Self> {
    if !source.url.contains("{slug}") {
      return Err(Error::Config(format!("{}: url must contain {{slug}}", source.name)));
    }
    if source.measures.is_empty() {
      return Err(Error::Config(format!("{}: no measures configured", source.name)));
    }
    let rules = source
      .measures
      .iter()
      .map(|m| {
        let pattern = RegexBuilder::new(&m.pattern).case_insensitive(true).build()?;
        Ok(MeasureRule { pattern, flags: m.flags.clone() })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(Self {
      name: source.name.clone(),
      url: source.url.as_str().into(),
      rules: Arc::new(rules),
      owned: source.owned_flags(),
      slugs: Arc::new(source.slugs.clone()),
      fetcher,
      concurrency,
      budget,
    })
  }
}

/// Flags whose measure pattern appears anywhere in the page text.
fn measures_in(rules: &[MeasureRule], html: &str) -> BTreeSet<Flag> {
  let text = strip_markup(html);
  rules
    .iter()
    .filter(|rule| rule.pattern.is_match(&text))
    .flat_map(|rule| rule.flags.iter().copied())
    .collect()
}

#[derive(Debug)]
enum Page {
  /// Measures found on the country's page; empty when it has no page.
  Measures(BTreeSet<Flag>),
  Failed(String),
}

impl Adapter for SectionsAdapter {
  fn name(&self) -> &str { &self.name }

  async fn fetch(&self, known: &[CountryName]) -> Result<AdapterBatch, AdapterError> {
    let deadline = Instant::now() + self.budget;
    let fetcher = self.fetcher.clone();
    let url = self.url.clone();
    let rules = self.rules.clone();
    let slugs = self.slugs.clone();

    let results = fan_out(known.to_vec(), self.concurrency, deadline, move |country| {
      let fetcher = fetcher.clone();
      let rules = rules.clone();
      let url = country_url(&url, &slugs, &country);
      async move {
        match fetcher.get_text(&url).await {
          Ok(Some(body)) => Page::Measures(measures_in(&rules, &body)),
          // No page: no regime against this country.
          Ok(None) => Page::Measures(BTreeSet::new()),
          Err(e) => Page::Failed(format!("{url}: {e}")),
        }
      }
    })
    .await;

    let mut batch = AdapterBatch::new(&self.name);
    batch.owned_flags = self.owned.clone();
    let mut resolved = 0usize;
    let mut last_failure = None;

    for (country, page) in results {
      match page {
        Some(Page::Measures(flags)) => {
          resolved += 1;
          if !flags.is_empty() {
            debug!(source = %self.name, %country, ?flags, "measures in force");
            batch
              .facts
              .insert(country, flags.into_iter().map(|f| (f, FlagValue::Yes)).collect());
          }
        }
        Some(Page::Failed(reason)) => {
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

    if resolved == 0 && !known.is_empty() {
      return Err(match last_failure {
        Some(reason) => AdapterError::Fetch { url: self.url.to_string(), reason },
        None => AdapterError::Timeout(self.name.clone()),
      });
    }

    info!(
      source = %self.name,
      sanctioned = batch.facts.len(),
      unresolved = batch.unresolved.len(),
      "collected measures"
    );
    Ok(batch)
  }
}
