//! The change log: one append-only entry per observed field change.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error,
  classify::Classification,
  country::{CountryName, Score},
  flag::{Flag, FlagValue},
};

// ─── Field ───────────────────────────────────────────────────────────────────

/// A column of the country table that can change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Field {
  Flag(Flag),
  Score,
  RiskLevel,
  VigilanceLevel,
  ListColor,
}

impl Field {
  pub fn name(self) -> &'static str {
    match self {
      Field::Flag(f) => f.column(),
      Field::Score => "SCORE",
      Field::RiskLevel => "RISK_LEVEL",
      Field::VigilanceLevel => "VIGILANCE_LEVEL",
      Field::ListColor => "LIST_COLOR",
    }
  }

  pub fn is_derived(self) -> bool {
    matches!(self, Field::RiskLevel | Field::VigilanceLevel | Field::ListColor)
  }
}

impl fmt::Display for Field {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}

impl FromStr for Field {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_uppercase().as_str() {
      "SCORE" => Ok(Field::Score),
      "RISK_LEVEL" => Ok(Field::RiskLevel),
      "VIGILANCE_LEVEL" => Ok(Field::VigilanceLevel),
      "LIST_COLOR" => Ok(Field::ListColor),
      other => other
        .parse::<Flag>()
        .map(Field::Flag)
        .map_err(|_| Error::UnknownField(s.to_owned())),
    }
  }
}

impl From<Field> for String {
  fn from(f: Field) -> Self { f.name().to_owned() }
}

impl TryFrom<String> for Field {
  type Error = Error;

  fn try_from(s: String) -> Result<Self, Self::Error> { s.parse() }
}

// ─── Writes and diffs ────────────────────────────────────────────────────────

/// A value to be written to a non-derived field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
  Flag(Flag, FlagValue),
  Score(Option<Score>),
}

impl FieldValue {
  pub fn field(self) -> Field {
    match self {
      FieldValue::Flag(f, _) => Field::Flag(f),
      FieldValue::Score(_) => Field::Score,
    }
  }

  pub fn render(self) -> Option<String> {
    match self {
      FieldValue::Flag(_, v) => Some(v.as_str().to_owned()),
      FieldValue::Score(s) => s.map(|s| s.to_string()),
    }
  }
}

/// One row-level write inside a batch transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldWrite {
  pub country: CountryName,
  pub value:   FieldValue,
}

/// An observed `old → new` transition for one field of one country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
  pub country:   CountryName,
  pub field:     Field,
  pub old_value: Option<String>,
  pub new_value: Option<String>,
}

impl FieldChange {
  pub fn into_entry(self, run_id: RunId, recorded_at: DateTime<Utc>) -> ChangeEntry {
    ChangeEntry {
      change_id: Uuid::new_v4(),
      run_id,
      country: self.country,
      field: self.field,
      old_value: self.old_value,
      new_value: self.new_value,
      recorded_at,
    }
  }
}

/// Changes between a previously persisted classification (if any) and a
/// freshly computed one, one per differing label.
pub fn derived_changes(
  country: &CountryName,
  old: Option<&Classification>,
  new: &Classification,
) -> Vec<FieldChange> {
  let pairs = [
    (Field::RiskLevel, old.map(|c| c.risk_level.as_str()), new.risk_level.as_str()),
    (
      Field::VigilanceLevel,
      old.map(|c| c.vigilance_level.as_str()),
      new.vigilance_level.as_str(),
    ),
    (Field::ListColor, old.map(|c| c.list_color.as_str()), new.list_color.as_str()),
  ];

  pairs
    .into_iter()
    .filter(|(_, old, new)| *old != Some(*new))
    .map(|(field, old, new)| FieldChange {
      country: country.clone(),
      field,
      old_value: old.map(str::to_owned),
      new_value: Some(new.to_owned()),
    })
    .collect()
}

// ─── Log entries ─────────────────────────────────────────────────────────────

/// Identifies one reconciliation run; every entry written by the run shares it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
  pub fn new() -> Self { Self(Uuid::new_v4()) }
}

impl Default for RunId {
  fn default() -> Self { Self::new() }
}

impl fmt::Display for RunId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
}

/// A persisted change. Never updated or deleted once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
  pub change_id:   Uuid,
  pub run_id:      RunId,
  pub country:     CountryName,
  pub field:       Field,
  pub old_value:   Option<String>,
  pub new_value:   Option<String>,
  pub recorded_at: DateTime<Utc>,
}

/// Filters for [`ChangesetSink::list_changes`](crate::store::ChangesetSink::list_changes).
#[derive(Debug, Clone, Default)]
pub struct ChangeQuery {
  pub country: Option<CountryName>,
  pub field:   Option<Field>,
  pub run_id:  Option<RunId>,
  /// Newest first; defaults to 100.
  pub limit:   Option<usize>,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
