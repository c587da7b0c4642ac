//! Adapter for pages that name every listed country, such as the FATF
//! "call for action" and "increased monitoring" statements.

use chrono::{Datelike, NaiveDate, Utc};
use riskmap_core::{
  adapter::{Adapter, AdapterBatch, AdapterError},
  country::CountryName,
  flag::Flag,
};
use tracing::info;

use crate::{
  config::{Aliases, ListSource},
  http::HttpFetcher,
  matcher::{CountryMatcher, strip_markup},
};

/// The most recent FATF plenary on or before `date`: February, June or
/// October. January still points at the previous year's October.
pub fn plenary_period(date: NaiveDate) -> (&'static str, i32) {
  match date.month() {
    10.. => ("october", date.year()),
    6.. => ("june", date.year()),
    2.. => ("february", date.year()),
    _ => ("october", date.year() - 1),
  }
}

/// Fill `{plenary_month}` and `{plenary_year}` in `template`.
pub fn resolve_url(template: &str, today: NaiveDate) -> String {
  let (month, year) = plenary_period(today);
  template
    .replace("{plenary_month}", month)
    .replace("{plenary_year}", &year.to_string())
}

pub struct ListAdapter {
  name:     String,
  url:      String,
  flags:    Vec<Flag>,
  fetcher:  HttpFetcher,
  aliases:  Aliases,
}

impl ListAdapter {
  pub fn new(source: &ListSource, fetcher: HttpFetcher, aliases: Aliases) -> Self {
    Self {
      name: source.name.clone(),
      url: source.url.clone(),
      flags: source.flags.clone(),
      fetcher,
      aliases,
    }
  }

  /// Build the batch from an already fetched page.
  pub fn parse(&self, html: &str, known: &[CountryName]) -> Result<AdapterBatch, AdapterError> {
    let matcher = CountryMatcher::new(known, &self.aliases);
    let listed = matcher.find_all(&strip_markup(html));

    // A page with no recognisable country is a layout change, not an empty
    // list; it must not clear every flag.
    if listed.is_empty() {
      return Err(AdapterError::Parse {
        source_name: self.name.clone(),
        reason:      "no known country found on the page".into(),
      });
    }

    info!(source = %self.name, listed = listed.len(), "parsed list");
    Ok(AdapterBatch::new(&self.name).with_listed(self.flags.iter().copied(), listed))
  }
}

impl Adapter for ListAdapter {
  fn name(&self) -> &str { &self.name }

  async fn fetch(&self, known: &[CountryName]) -> Result<AdapterBatch, AdapterError> {
    let url = resolve_url(&self.url, Utc::now().date_naive());
    let body = match self.fetcher.get_text(&url).await {
      Ok(Some(body)) => body,
      Ok(None) => {
        return Err(AdapterError::Fetch { url, reason: "page not published (404)".into() });
      }
      Err(e) => return Err(AdapterError::Fetch { url, reason: e.to_string() }),
    };
    self.parse(&body, known)
  }
}
