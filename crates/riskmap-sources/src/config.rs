//! Serde-facing configuration for sources and the shared HTTP client.

use std::{
  collections::{BTreeMap, BTreeSet},
  path::PathBuf,
  time::Duration,
};

use riskmap_core::{country::CountryName, flag::Flag};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── HTTP ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
  /// Per-request timeout.
  pub timeout_secs: u64,
  /// Extra attempts after the first, for transient failures only.
  pub retries:      u32,
  /// Linear backoff step; attempt `n` waits `n * backoff_ms`.
  pub backoff_ms:   u64,
  /// Concurrent requests per adapter fan-out.
  pub concurrency:  usize,
  pub user_agent:   String,
  /// Honour `HTTP_PROXY` and friends.
  pub system_proxy: bool,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_secs: 30,
      retries:      2,
      backoff_ms:   500,
      concurrency:  10,
      user_agent:   concat!("riskmap/", env!("CARGO_PKG_VERSION")).to_owned(),
      system_proxy: true,
    }
  }
}

impl HttpConfig {
  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }

  pub fn backoff(&self) -> Duration { Duration::from_millis(self.backoff_ms) }
}

// ─── Sources ─────────────────────────────────────────────────────────────────

/// One configured source. Selected by the `kind` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
  List(ListSource),
  Score(ScoreSource),
  File(FileSource),
  Sections(SectionsSource),
}

impl SourceConfig {
  pub fn name(&self) -> &str {
    match self {
      SourceConfig::List(s) => &s.name,
      SourceConfig::Score(s) => &s.name,
      SourceConfig::File(s) => &s.name,
      SourceConfig::Sections(s) => &s.name,
    }
  }

  /// The flag columns this source is the sole writer of.
  pub fn owned_flags(&self) -> BTreeSet<Flag> {
    match self {
      SourceConfig::List(s) => s.flags.iter().copied().collect(),
      SourceConfig::File(s) => s.flags.iter().copied().collect(),
      SourceConfig::Sections(s) => s.owned_flags(),
      SourceConfig::Score(_) => BTreeSet::new(),
    }
  }

  pub fn owns_score(&self) -> bool { matches!(self, SourceConfig::Score(_)) }
}

/// Every flag, and the score, must have at most one owning source.
/// Two writers of one column would undo each other on every run.
pub fn check_ownership(sources: &[SourceConfig]) -> Result<()> {
  let mut names = BTreeSet::new();
  let mut owners: BTreeMap<Flag, &str> = BTreeMap::new();
  let mut score_owner: Option<&str> = None;

  for source in sources {
    let name = source.name();
    if !names.insert(name) {
      return Err(Error::Config(format!("source name {name:?} is used twice")));
    }
    for flag in source.owned_flags() {
      if let Some(other) = owners.insert(flag, name) {
        return Err(Error::Config(format!("{flag} is owned by both {other} and {name}")));
      }
    }
    if source.owns_score() {
      if let Some(other) = score_owner {
        return Err(Error::Config(format!("the score is owned by both {other} and {name}")));
      }
      score_owner = Some(name);
    }
  }
  Ok(())
}

/// A page naming every listed country for a set of flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSource {
  pub name:  String,
  /// May contain `{plenary_month}` and `{plenary_year}`.
  pub url:   String,
  pub flags: Vec<Flag>,
}

/// One page per country carrying a numeric score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSource {
  pub name:    String,
  /// Must contain `{slug}`.
  pub url:     String,
  /// Regex applied to the page text; the first capture group (or the group
  /// named `score`) holds the value.
  pub pattern: String,
  /// Per-country slug overrides for pages that do not follow the name.
  #[serde(default)]
  pub slugs:   BTreeMap<CountryName, String>,
}

/// A hand-maintained JSON document, for lists only published as PDFs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSource {
  pub name:  String,
  pub path:  PathBuf,
  pub flags: Vec<Flag>,
}

/// One page per country whose headings or bullet points name the measures in
/// force. Each measure pattern sets its flags to YES for that country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionsSource {
  pub name:     String,
  /// Must contain `{slug}`.
  pub url:      String,
  #[serde(default)]
  pub slugs:    BTreeMap<CountryName, String>,
  pub measures: Vec<Measure>,
}

impl SectionsSource {
  pub fn owned_flags(&self) -> BTreeSet<Flag> {
    self.measures.iter().flat_map(|m| m.flags.iter().copied()).collect()
  }
}

/// A case-insensitive pattern and the flags it implies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
  pub pattern: String,
  pub flags:   Vec<Flag>,
}

// ─── Aliases ─────────────────────────────────────────────────────────────────

/// Alternate spellings mapped to the canonical stored name, e.g.
/// `"BURMA" = "MYANMAR (BURMA)"`. Both sides are normalized on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aliases(BTreeMap<CountryName, CountryName>);

impl Aliases {
  pub fn new() -> Self { Self::default() }

  pub fn insert(&mut self, alias: CountryName, canonical: CountryName) {
    self.0.insert(alias, canonical);
  }

  /// The canonical name for `name`; `name` itself when no alias applies.
  pub fn resolve(&self, name: CountryName) -> CountryName {
    match self.0.get(&name) {
      Some(canonical) => canonical.clone(),
      None => name,
    }
  }

  pub fn iter(&self) -> impl Iterator<Item = (&CountryName, &CountryName)> { self.0.iter() }
}

impl FromIterator<(CountryName, CountryName)> for Aliases {
  fn from_iter<I: IntoIterator<Item = (CountryName, CountryName)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}
