//! Flags: single named boolean facts about a country, each owned by exactly
//! one source list.

use std::collections::{BTreeMap, btree_map};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{Error, Result};

// ─── Flag ────────────────────────────────────────────────────────────────────

/// Every indicator tracked per country. The string form is the stable column
/// name used in storage, import files and the change log.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Flag {
  // French Treasury restrictive measures.
  FrAssetFreeze,
  FrSectoralEmbargo,
  FrMilitaryEmbargo,
  FrInternalRepressionEquipment,
  FrInternalRepression,
  FrSectoralRestrictions,
  FrFinancialRestrictions,
  FrTravelBans,
  // EU sanctions map.
  EuAssetFreeze,
  EuInvestments,
  EuFinancialMeasures,
  EuAmlHighRisk,
  // Unilateral programmes.
  UsOfacSanctions,
  UkFinancialSanctions,
  // FATF public statements.
  FatfHighRiskCallForAction,
  FatfIncreasedMonitoring,
  // Tax non-cooperative lists.
  EuNonCooperative,
  FrNonCooperative,
}

impl Flag {
  pub fn all() -> impl Iterator<Item = Flag> { Flag::iter() }

  pub fn column(self) -> &'static str { self.into() }
}

// ─── Value ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FlagValue {
  Yes,
  No,
}

impl FlagValue {
  pub fn as_str(self) -> &'static str {
    match self {
      FlagValue::Yes => "YES",
      FlagValue::No => "NO",
    }
  }

  /// Case-insensitive, whitespace-tolerant parse of `"YES"` / `"NO"`.
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim() {
      v if v.eq_ignore_ascii_case("yes") => Some(FlagValue::Yes),
      v if v.eq_ignore_ascii_case("no") => Some(FlagValue::No),
      _ => None,
    }
  }
}

impl From<bool> for FlagValue {
  fn from(b: bool) -> Self { if b { FlagValue::Yes } else { FlagValue::No } }
}

impl std::fmt::Display for FlagValue {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Set ─────────────────────────────────────────────────────────────────────

/// The known flag values for one country. A flag with no entry is unknown
/// and reads as `NO` through [`FlagSet::is_yes`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagSet(BTreeMap<Flag, FlagValue>);

impl FlagSet {
  pub fn new() -> Self { Self::default() }

  /// Build from raw `(name, value)` pairs. Unknown flag names and values that
  /// are neither YES nor NO are skipped with a warning; this never fails.
  pub fn from_raw<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
    let mut set = Self::new();
    for (name, value) in pairs {
      match parse_pair(name, value) {
        Ok((flag, value)) => {
          set.set(flag, value);
        }
        Err(e) => tracing::warn!("ignoring flag input: {e}"),
      }
    }
    set
  }

  pub fn get(&self, flag: Flag) -> Option<FlagValue> { self.0.get(&flag).copied() }

  /// Insert or overwrite; returns the previous value.
  pub fn set(&mut self, flag: Flag, value: FlagValue) -> Option<FlagValue> {
    self.0.insert(flag, value)
  }

  pub fn is_yes(&self, flag: Flag) -> bool { self.get(flag) == Some(FlagValue::Yes) }

  pub fn any_yes(&self, flags: &[Flag]) -> bool { flags.iter().any(|f| self.is_yes(*f)) }

  pub fn none_yes(&self, flags: &[Flag]) -> bool { !self.any_yes(flags) }

  pub fn iter(&self) -> btree_map::Iter<'_, Flag, FlagValue> { self.0.iter() }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl FromIterator<(Flag, FlagValue)> for FlagSet {
  fn from_iter<I: IntoIterator<Item = (Flag, FlagValue)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

fn parse_pair(name: &str, value: &str) -> Result<(Flag, FlagValue)> {
  let flag: Flag =
    name.trim().parse().map_err(|_| Error::UnknownFlag(name.to_owned()))?;
  let value = FlagValue::parse(value)
    .ok_or_else(|| Error::InvalidFlagValue { flag, value: value.to_owned() })?;
  Ok((flag, value))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn column_names_round_trip_through_parse() {
    for flag in Flag::all() {
      assert_eq!(flag.column(), flag.to_string());
      assert_eq!(flag.column().parse::<Flag>().unwrap(), flag);
    }
    assert_eq!(Flag::all().count(), 18);
  }

  #[test]
  fn serde_uses_column_names() {
    let json = serde_json::to_string(&Flag::FatfHighRiskCallForAction).unwrap();
    assert_eq!(json, "\"FATF_HIGH_RISK_CALL_FOR_ACTION\"");
  }

  #[test]
  fn flag_value_parse_is_lenient() {
    assert_eq!(FlagValue::parse(" yes "), Some(FlagValue::Yes));
    assert_eq!(FlagValue::parse("No"), Some(FlagValue::No));
    assert_eq!(FlagValue::parse("maybe"), None);
  }

  #[test]
  fn from_raw_ignores_unknown_names_and_values() {
    let set = FlagSet::from_raw([
      ("EU_INVESTMENTS", "YES"),
      ("fr_travel_bans", "no"),
      ("NOT_A_FLAG", "YES"),
      ("US_OFAC_SANCTIONS", "perhaps"),
    ]);
    assert_eq!(set.len(), 2);
    assert!(set.is_yes(Flag::EuInvestments));
    assert_eq!(set.get(Flag::FrTravelBans), Some(FlagValue::No));
    assert_eq!(set.get(Flag::UsOfacSanctions), None);
  }

  #[test]
  fn unknown_reads_as_no() {
    let set = FlagSet::new();
    assert!(!set.is_yes(Flag::UkFinancialSanctions));
    assert!(set.none_yes(&[Flag::UkFinancialSanctions, Flag::UsOfacSanctions]));
  }
}
