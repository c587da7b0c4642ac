//! Country identity and the per-country record held by the flag store.
//!
//! Every adapter and every store backend keys rows by [`CountryName`], so the
//! normalization below is the single place where two spellings of the same
//! jurisdiction are made equal.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::{Error, classify::Classification, flag::FlagSet};

// ─── Name ────────────────────────────────────────────────────────────────────

/// Canonical, normalized country name.
///
/// Construction trims, strips diacritics, folds typographic apostrophes to
/// `'`, uppercases and collapses inner whitespace. `"Côte d’Ivoire"` and
/// `"  COTE D'IVOIRE "` produce the same value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct CountryName(String);

impl CountryName {
  /// Normalize `raw`. Returns `None` if nothing is left afterwards.
  pub fn new(raw: &str) -> Option<Self> {
    let folded: String = raw
      .chars()
      .map(fold_apostrophe)
      .nfkd()
      .filter(|c| !is_combining_mark(*c))
      .collect();

    let name = folded
      .split_whitespace()
      .collect::<Vec<_>>()
      .join(" ")
      .to_uppercase();

    (!name.is_empty()).then_some(Self(name))
  }

  pub fn as_str(&self) -> &str { &self.0 }

  /// URL slug: parenthesised suffixes dropped, ASCII lowercase, words joined
  /// with hyphens. `"MYANMAR (BURMA)"` → `"myanmar"`.
  pub fn slug(&self) -> String {
    let mut base = String::with_capacity(self.0.len());
    let mut depth = 0usize;
    for c in self.0.chars() {
      match c {
        '(' => depth += 1,
        ')' => depth = depth.saturating_sub(1),
        _ if depth == 0 => base.push(c),
        _ => {}
      }
    }
    base
      .split(|c: char| !c.is_ascii_alphanumeric() && c != '\'')
      .filter(|w| !w.is_empty())
      .map(|w| w.replace('\'', "").to_ascii_lowercase())
      .collect::<Vec<_>>()
      .join("-")
  }
}

fn fold_apostrophe(c: char) -> char {
  match c {
    '\u{2019}' | '\u{2018}' | '\u{02BC}' | '\u{00B4}' | '`' => '\'',
    other => other,
  }
}

impl fmt::Display for CountryName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl FromStr for CountryName {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::new(s).ok_or_else(|| Error::InvalidCountryName(s.to_owned()))
  }
}

impl<'de> Deserialize<'de> for CountryName {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    let raw = String::deserialize(de)?;
    Self::new(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid country name: {raw:?}")))
  }
}

// ─── Score ───────────────────────────────────────────────────────────────────

/// A corruption-perception style score in `0..=100`. Higher is cleaner.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct Score(u8);

impl Score {
  pub const MAX: u8 = 100;

  /// Returns `None` when `value` is outside `0..=100`.
  pub fn new(value: i64) -> Option<Self> {
    u8::try_from(value).ok().filter(|v| *v <= Self::MAX).map(Self)
  }

  pub fn value(self) -> u8 { self.0 }

  /// Lenient parse of a published score: `"45"`, `"45/100"`, `"45.0"`.
  /// Anything else degrades to `None` rather than failing.
  pub fn parse(text: &str) -> Option<Self> {
    let head = text.split('/').next()?.trim();
    if let Ok(v) = head.parse::<i64>() {
      return Self::new(v);
    }
    let v = head.parse::<f64>().ok().filter(|v| v.is_finite())?;
    if v.fract() != 0.0 {
      return None;
    }
    Self::new(v as i64)
  }
}

impl TryFrom<i64> for Score {
  type Error = String;

  fn try_from(v: i64) -> Result<Self, Self::Error> {
    Self::new(v).ok_or_else(|| format!("score {v} outside 0..=100"))
  }
}

impl From<Score> for i64 {
  fn from(s: Score) -> Self { i64::from(s.0) }
}

impl fmt::Display for Score {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// One monitored jurisdiction as held by the flag store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryRecord {
  pub name:    CountryName,
  pub score:   Option<Score>,
  pub flags:   FlagSet,
  /// Last persisted classification; `None` until the first reclassification.
  pub derived: Option<Classification>,
}

/// Input row for the initial bulk import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCountry {
  pub name:  CountryName,
  #[serde(default)]
  pub score: Option<Score>,
  #[serde(default)]
  pub flags: FlagSet,
}

impl NewCountry {
  pub fn new(name: CountryName) -> Self {
    Self { name, score: None, flags: FlagSet::default() }
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn name(s: &str) -> CountryName { CountryName::new(s).unwrap() }

  #[test]
  fn normalizes_case_whitespace_and_diacritics() {
    assert_eq!(name("  Côte   d’Ivoire "), name("COTE D'IVOIRE"));
    assert_eq!(name("Türkiye").as_str(), "TURKIYE");
    assert_eq!(name("são tomé and príncipe").as_str(), "SAO TOME AND PRINCIPE");
  }

  #[test]
  fn folds_every_apostrophe_variant() {
    let expected = "DEMOCRATIC PEOPLE'S REPUBLIC OF KOREA";
    for raw in [
      "Democratic People’s Republic of Korea",
      "Democratic People‘s Republic of Korea",
      "Democratic People`s Republic of Korea",
      "Democratic People's Republic of Korea",
    ] {
      assert_eq!(name(raw).as_str(), expected, "{raw}");
    }
  }

  #[test]
  fn blank_name_is_rejected() {
    assert!(CountryName::new("   ").is_none());
    assert!("".parse::<CountryName>().is_err());
  }

  #[test]
  fn deserialize_normalizes() {
    let n: CountryName = serde_json::from_str("\"  iran \"").unwrap();
    assert_eq!(n.as_str(), "IRAN");
  }

  #[test]
  fn slug_drops_parenthesised_suffix() {
    assert_eq!(name("Myanmar (Burma)").slug(), "myanmar");
    assert_eq!(name("Côte d'Ivoire").slug(), "cote-divoire");
    assert_eq!(name("Bosnia and Herzegovina").slug(), "bosnia-and-herzegovina");
  }

  #[test]
  fn score_range_is_enforced() {
    assert_eq!(Score::new(0).map(Score::value), Some(0));
    assert_eq!(Score::new(100).map(Score::value), Some(100));
    assert!(Score::new(101).is_none());
    assert!(Score::new(-1).is_none());
  }

  #[test]
  fn score_parse_is_lenient() {
    assert_eq!(Score::parse("45").map(Score::value), Some(45));
    assert_eq!(Score::parse(" 45/100").map(Score::value), Some(45));
    assert_eq!(Score::parse("45.0").map(Score::value), Some(45));
    assert!(Score::parse("N/A").is_none());
    assert!(Score::parse("45.5").is_none());
    assert!(Score::parse("").is_none());
  }

  #[test]
  fn score_deserialize_rejects_out_of_range() {
    assert!(serde_json::from_str::<Score>("150").is_err());
    assert_eq!(serde_json::from_str::<Score>("72").unwrap().value(), 72);
  }
}
