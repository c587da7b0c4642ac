//! Encoding and decoding helpers between riskmap domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings in UTC with microseconds, UUIDs are
//! hyphenated lowercase strings.
//! Flags, fields and labels use their stable upper-case column names.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use riskmap_core::{
  change::{ChangeEntry, Field, RunId},
  classify::{Classification, ListColor, RiskLevel, Tier, VigilanceLevel},
  country::{CountryName, CountryRecord, Score},
  flag::{Flag, FlagSet, FlagValue},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Fixed-width so that stored timestamps sort lexically.
pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Scalars ─────────────────────────────────────────────────────────────────

fn decode_err(column: &'static str, value: impl Into<String>) -> Error {
  Error::Decode { column, value: value.into() }
}

pub fn decode_name(s: &str) -> Result<CountryName> {
  CountryName::new(s).ok_or_else(|| decode_err("country name", s))
}

pub fn decode_score(v: Option<i64>) -> Result<Option<Score>> {
  v.map(|v| Score::new(v).ok_or_else(|| decode_err("score", v.to_string())))
    .transpose()
}

pub fn decode_flag(s: &str) -> Result<Flag> { s.parse().map_err(|_| decode_err("flag", s)) }

pub fn decode_flag_value(s: &str) -> Result<FlagValue> {
  FlagValue::parse(s).ok_or_else(|| decode_err("flag value", s))
}

pub fn decode_field(s: &str) -> Result<Field> { s.parse().map_err(|_| decode_err("field", s)) }

// ─── Classification ──────────────────────────────────────────────────────────

/// The four label columns as stored.
pub struct EncodedClassification {
  pub risk_level:      &'static str,
  pub vigilance_level: &'static str,
  pub list_color:      &'static str,
  pub tier:            &'static str,
}

pub fn encode_classification(c: &Classification) -> EncodedClassification {
  EncodedClassification {
    risk_level:      c.risk_level.as_str(),
    vigilance_level: c.vigilance_level.as_str(),
    list_color:      c.list_color.as_str(),
    tier:            c.tier.as_str(),
  }
}

fn decode_classification(
  risk_level: Option<String>,
  vigilance_level: Option<String>,
  list_color: Option<String>,
  tier: Option<String>,
) -> Result<Option<Classification>> {
  match (risk_level, vigilance_level, list_color, tier) {
    (None, None, None, None) => Ok(None),
    (Some(r), Some(v), Some(c), Some(t)) => Ok(Some(Classification {
      risk_level:      RiskLevel::parse(&r).ok_or_else(|| decode_err("risk level", r))?,
      vigilance_level: VigilanceLevel::parse(&v).ok_or_else(|| decode_err("vigilance level", v))?,
      list_color:      ListColor::parse(&c).ok_or_else(|| decode_err("list colour", c))?,
      tier:            Tier::parse(&t).ok_or_else(|| decode_err("tier", t))?,
    })),
    _ => Err(decode_err("classification", "partially populated labels")),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `countries` row.
pub struct RawCountry {
  pub name:            String,
  pub score:           Option<i64>,
  pub risk_level:      Option<String>,
  pub vigilance_level: Option<String>,
  pub list_color:      Option<String>,
  pub tier:            Option<String>,
}

pub const COUNTRY_COLUMNS: &str =
  "name, score, risk_level, vigilance_level, list_color, tier";

impl RawCountry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      name:            row.get(0)?,
      score:           row.get(1)?,
      risk_level:      row.get(2)?,
      vigilance_level: row.get(3)?,
      list_color:      row.get(4)?,
      tier:            row.get(5)?,
    })
  }

  /// Combine with the `(flag, value)` rows belonging to this country.
  pub fn into_record(self, flags: Vec<RawFlag>) -> Result<CountryRecord> {
    let flags = flags
      .into_iter()
      .map(|f| Ok((decode_flag(&f.flag)?, decode_flag_value(&f.value)?)))
      .collect::<Result<FlagSet>>()?;

    Ok(CountryRecord {
      name: decode_name(&self.name)?,
      score: decode_score(self.score)?,
      flags,
      derived: decode_classification(
        self.risk_level,
        self.vigilance_level,
        self.list_color,
        self.tier,
      )?,
    })
  }
}

/// Raw values read directly from a `country_flags` row.
pub struct RawFlag {
  pub country: String,
  pub flag:    String,
  pub value:   String,
}

/// Attach flag rows to their country rows, preserving country order.
pub fn assemble_records(countries: Vec<RawCountry>, flags: Vec<RawFlag>) -> Result<Vec<CountryRecord>> {
  let mut by_country: BTreeMap<String, Vec<RawFlag>> = BTreeMap::new();
  for f in flags {
    by_country.entry(f.country.clone()).or_default().push(f);
  }
  countries
    .into_iter()
    .map(|c| {
      let flags = by_country.remove(&c.name).unwrap_or_default();
      c.into_record(flags)
    })
    .collect()
}

/// Raw values read directly from a `changes` row.
pub struct RawChange {
  pub change_id:   String,
  pub run_id:      String,
  pub country:     String,
  pub field:       String,
  pub old_value:   Option<String>,
  pub new_value:   Option<String>,
  pub recorded_at: String,
}

impl RawChange {
  pub fn into_entry(self) -> Result<ChangeEntry> {
    Ok(ChangeEntry {
      change_id:   decode_uuid(&self.change_id)?,
      run_id:      RunId(decode_uuid(&self.run_id)?),
      country:     decode_name(&self.country)?,
      field:       decode_field(&self.field)?,
      old_value:   self.old_value,
      new_value:   self.new_value,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}
