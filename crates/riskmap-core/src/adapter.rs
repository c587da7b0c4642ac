//! Source adapters: the contract between external lists and the reconciler.

use std::{
  collections::{BTreeMap, BTreeSet},
  future::Future,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
  country::{CountryName, Score},
  flag::{Flag, FlagValue},
};

/// The output of one adapter for one run.
///
/// For every flag in `owned_flags` the batch is a complete statement across
/// all countries: a country absent from `facts` (or present without that
/// flag) is NO, unless it is listed in `unresolved`, in which case its stored
/// values are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterBatch {
  pub source:      String,
  pub owned_flags: BTreeSet<Flag>,
  pub facts:       BTreeMap<CountryName, BTreeMap<Flag, FlagValue>>,
  /// Score observations. `Some(None)` under a key means the source publishes
  /// no score for that country.
  pub scores:      BTreeMap<CountryName, Option<Score>>,
  pub unresolved:  BTreeSet<CountryName>,
}

impl AdapterBatch {
  pub fn new(source: impl Into<String>) -> Self {
    Self { source: source.into(), ..Self::default() }
  }

  /// Declare `flags` as owned and mark every country in `listed` YES.
  pub fn with_listed(
    mut self,
    flags: impl IntoIterator<Item = Flag>,
    listed: impl IntoIterator<Item = CountryName>,
  ) -> Self {
    let flags: Vec<Flag> = flags.into_iter().collect();
    self.owned_flags.extend(flags.iter().copied());
    for country in listed {
      let entry = self.facts.entry(country).or_default();
      for flag in &flags {
        entry.insert(*flag, FlagValue::Yes);
      }
    }
    self
  }

  /// The value this batch asserts for `country` / `flag`, or `None` when the
  /// batch says nothing (flag not owned, or country unresolved).
  pub fn desired(&self, country: &CountryName, flag: Flag) -> Option<FlagValue> {
    if !self.owned_flags.contains(&flag) || self.unresolved.contains(country) {
      return None;
    }
    let value = self
      .facts
      .get(country)
      .and_then(|flags| flags.get(&flag))
      .copied()
      .unwrap_or(FlagValue::No);
    Some(value)
  }

  /// True if the batch would not touch anything.
  pub fn is_empty(&self) -> bool { self.owned_flags.is_empty() && self.scores.is_empty() }
}

#[derive(Debug, Error)]
pub enum AdapterError {
  #[error("fetch failed for {url}: {reason}")]
  Fetch { url: String, reason: String },

  #[error("could not parse {source_name}: {reason}")]
  Parse { source_name: String, reason: String },

  #[error("{0} did not finish before the run deadline")]
  Timeout(String),
}

/// Something that can produce an [`AdapterBatch`].
///
/// `fetch` must be free of side effects on the store; a failure is reported
/// as an error, never as a partially-filled batch.
pub trait Adapter: Send + Sync {
  fn name(&self) -> &str;

  fn fetch<'a>(
    &'a self,
    known: &'a [CountryName],
  ) -> impl Future<Output = Result<AdapterBatch, AdapterError>> + Send + 'a;
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn name(s: &str) -> CountryName { CountryName::new(s).unwrap() }

  #[test]
  fn unnamed_countries_default_to_no_for_owned_flags() {
    let batch = AdapterBatch::new("fatf")
      .with_listed([Flag::FatfHighRiskCallForAction], [name("Iran")]);

    assert_eq!(batch.desired(&name("Iran"), Flag::FatfHighRiskCallForAction), Some(FlagValue::Yes));
    assert_eq!(batch.desired(&name("France"), Flag::FatfHighRiskCallForAction), Some(FlagValue::No));
    assert_eq!(batch.desired(&name("Iran"), Flag::EuInvestments), None);
  }

  #[test]
  fn unresolved_countries_are_left_alone() {
    let mut batch = AdapterBatch::new("fr").with_listed([Flag::FrTravelBans], []);
    batch.unresolved.insert(name("Mali"));
    assert_eq!(batch.desired(&name("Mali"), Flag::FrTravelBans), None);
    assert_eq!(batch.desired(&name("Chad"), Flag::FrTravelBans), Some(FlagValue::No));
  }
}
