//! The classification engine: flags + score → risk level, vigilance level and
//! list colour.
//!
//! Flags overlap (a country routinely sits on several lists at once), so the
//! engine walks an ordered table of tiers and stops at the first one whose
//! predicate holds. Precedence is the table order and nothing else.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
  country::{CountryName, Score},
  flag::{Flag, FlagSet},
};

// ─── Flag groups ─────────────────────────────────────────────────────────────

/// FATF call-for-action ("black list").
pub const CALL_FOR_ACTION: Flag = Flag::FatfHighRiskCallForAction;

/// AML / monitoring / non-cooperative watchlists.
pub const WATCHLIST_FLAGS: &[Flag] = &[
  Flag::EuAmlHighRisk,
  Flag::FatfIncreasedMonitoring,
  Flag::EuNonCooperative,
  Flag::FrNonCooperative,
];

/// Embargoes, restrictive measures and asset freezes.
pub const SANCTIONS_FLAGS: &[Flag] = &[
  Flag::FrSectoralEmbargo,
  Flag::FrMilitaryEmbargo,
  Flag::FrInternalRepressionEquipment,
  Flag::FrInternalRepression,
  Flag::FrSectoralRestrictions,
  Flag::FrFinancialRestrictions,
  Flag::FrTravelBans,
  Flag::EuAssetFreeze,
  Flag::EuInvestments,
  Flag::FrAssetFreeze,
  Flag::EuFinancialMeasures,
];

/// Single-country UK / US programmes.
pub const UNILATERAL_FLAGS: &[Flag] = &[Flag::UkFinancialSanctions, Flag::UsOfacSanctions];

/// Scores at or above this are clean enough for the standard tier.
pub const STANDARD_SCORE_THRESHOLD: u8 = 50;

// ─── Outputs ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
  Prohibited,
  High,
  Medium,
  Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VigilanceLevel {
  #[serde(rename = "PROHIBITED")]
  Prohibited,
  #[serde(rename = "ENHANCED")]
  Enhanced,
  #[serde(rename = "ENHANCED UK/US")]
  EnhancedUkUs,
  #[serde(rename = "STANDARD")]
  Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListColor {
  Black,
  Grey,
  Red,
  Amber,
  Green,
}

/// Which rule of the cascade produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
  Prohibited,
  Watchlist,
  Sanctions,
  ScoreStandard,
  UnilateralSanctions,
  Default,
}

/// The three derived labels plus the tier that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Classification {
  pub risk_level:      RiskLevel,
  pub vigilance_level: VigilanceLevel,
  pub list_color:      ListColor,
  pub tier:            Tier,
}

impl RiskLevel {
  pub fn as_str(self) -> &'static str {
    match self {
      RiskLevel::Prohibited => "PROHIBITED",
      RiskLevel::High => "HIGH",
      RiskLevel::Medium => "MEDIUM",
      RiskLevel::Standard => "STANDARD",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    [RiskLevel::Prohibited, RiskLevel::High, RiskLevel::Medium, RiskLevel::Standard]
      .into_iter()
      .find(|v| v.as_str() == s)
  }
}

impl VigilanceLevel {
  pub fn as_str(self) -> &'static str {
    match self {
      VigilanceLevel::Prohibited => "PROHIBITED",
      VigilanceLevel::Enhanced => "ENHANCED",
      VigilanceLevel::EnhancedUkUs => "ENHANCED UK/US",
      VigilanceLevel::Standard => "STANDARD",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    [
      VigilanceLevel::Prohibited,
      VigilanceLevel::Enhanced,
      VigilanceLevel::EnhancedUkUs,
      VigilanceLevel::Standard,
    ]
    .into_iter()
    .find(|v| v.as_str() == s)
  }
}

impl ListColor {
  pub fn as_str(self) -> &'static str {
    match self {
      ListColor::Black => "BLACK",
      ListColor::Grey => "GREY",
      ListColor::Red => "RED",
      ListColor::Amber => "AMBER",
      ListColor::Green => "GREEN",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    [ListColor::Black, ListColor::Grey, ListColor::Red, ListColor::Amber, ListColor::Green]
      .into_iter()
      .find(|v| v.as_str() == s)
  }
}

impl Tier {
  pub fn as_str(self) -> &'static str {
    match self {
      Tier::Prohibited => "prohibited",
      Tier::Watchlist => "watchlist",
      Tier::Sanctions => "sanctions",
      Tier::ScoreStandard => "score_standard",
      Tier::UnilateralSanctions => "unilateral_sanctions",
      Tier::Default => "default",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    CASCADE.iter().map(|r| r.tier).chain([Tier::Default]).find(|t| t.as_str() == s)
  }
}

macro_rules! display_via_as_str {
  ($($ty:ty),*) => {$(
    impl fmt::Display for $ty {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
    }
  )*};
}

display_via_as_str!(RiskLevel, VigilanceLevel, ListColor, Tier);

// ─── Scheme ──────────────────────────────────────────────────────────────────

/// How a country with only UK/US programmes (and no stronger tier) is
/// labelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnilateralPolicy {
  /// Own vigilance label: STANDARD / ENHANCED UK/US / GREEN.
  #[default]
  EnhancedUkUs,
  /// Folded into the standard tier: STANDARD / STANDARD / GREEN.
  Standard,
}

/// The configurable parts of the rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationScheme {
  /// Colour for the AML / monitoring / non-cooperative watchlist tier.
  pub watchlist_color:      ListColor,
  pub unilateral_sanctions: UnilateralPolicy,
  /// Keep countries under UK financial sanctions out of the sanctions tier;
  /// they fall through to the score or default tier instead.
  pub sanctions_exclude_uk: bool,
  /// Countries prohibited regardless of any feed.
  pub prohibited_countries: Vec<CountryName>,
}

impl Default for ClassificationScheme {
  fn default() -> Self {
    Self {
      watchlist_color:      ListColor::Grey,
      unilateral_sanctions: UnilateralPolicy::default(),
      sanctions_exclude_uk: true,
      prohibited_countries: CountryName::new("CUBA").into_iter().collect(),
    }
  }
}

impl ClassificationScheme {
  /// The labels assigned to `tier` under this scheme.
  pub fn outcome(&self, tier: Tier) -> Classification {
    use {ListColor as C, RiskLevel as R, VigilanceLevel as V};

    let (risk_level, vigilance_level, list_color) = match tier {
      Tier::Prohibited => (R::Prohibited, V::Prohibited, C::Black),
      Tier::Watchlist => (R::High, V::Enhanced, self.watchlist_color),
      Tier::Sanctions => (R::High, V::Enhanced, C::Red),
      Tier::ScoreStandard => (R::Standard, V::Standard, C::Green),
      Tier::UnilateralSanctions => match self.unilateral_sanctions {
        UnilateralPolicy::EnhancedUkUs => (R::Standard, V::EnhancedUkUs, C::Green),
        UnilateralPolicy::Standard => (R::Standard, V::Standard, C::Green),
      },
      Tier::Default => (R::Medium, V::Enhanced, C::Amber),
    };

    Classification { risk_level, vigilance_level, list_color, tier }
  }
}

// ─── Cascade ─────────────────────────────────────────────────────────────────

/// Everything a rule may look at.
#[derive(Debug, Clone, Copy)]
pub struct ClassifyInput<'a> {
  pub flags:   &'a FlagSet,
  pub score:   Option<Score>,
  pub country: &'a CountryName,
}

struct Rule {
  tier:    Tier,
  matches: fn(&ClassifyInput<'_>, &ClassificationScheme) -> bool,
}

/// Evaluated top to bottom; the first match wins. [`Tier::Default`] applies
/// when nothing matches.
const CASCADE: &[Rule] = &[
  Rule { tier: Tier::Prohibited, matches: prohibited },
  Rule { tier: Tier::Watchlist, matches: watchlist },
  Rule { tier: Tier::Sanctions, matches: sanctions },
  Rule { tier: Tier::ScoreStandard, matches: score_standard },
  Rule { tier: Tier::UnilateralSanctions, matches: unilateral_only },
];

fn prohibited(input: &ClassifyInput<'_>, scheme: &ClassificationScheme) -> bool {
  input.flags.is_yes(CALL_FOR_ACTION) || scheme.prohibited_countries.contains(input.country)
}

fn watchlist(input: &ClassifyInput<'_>, _: &ClassificationScheme) -> bool {
  input.flags.any_yes(WATCHLIST_FLAGS) && !input.flags.is_yes(CALL_FOR_ACTION)
}

fn sanctions(input: &ClassifyInput<'_>, scheme: &ClassificationScheme) -> bool {
  input.flags.any_yes(SANCTIONS_FLAGS)
    && input.flags.none_yes(WATCHLIST_FLAGS)
    && !(scheme.sanctions_exclude_uk && input.flags.is_yes(Flag::UkFinancialSanctions))
}

fn score_standard(input: &ClassifyInput<'_>, _: &ClassificationScheme) -> bool {
  input.score.is_some_and(|s| s.value() >= STANDARD_SCORE_THRESHOLD)
}

fn unilateral_only(input: &ClassifyInput<'_>, _: &ClassificationScheme) -> bool {
  input.flags.any_yes(UNILATERAL_FLAGS)
    && input.flags.none_yes(WATCHLIST_FLAGS)
    && input.flags.none_yes(SANCTIONS_FLAGS)
}

/// Applies a [`ClassificationScheme`] through the cascade.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
  scheme: ClassificationScheme,
}

impl Classifier {
  pub fn new(scheme: ClassificationScheme) -> Self { Self { scheme } }

  pub fn scheme(&self) -> &ClassificationScheme { &self.scheme }

  /// Total and pure: every input yields exactly one tier's labels.
  pub fn classify(
    &self,
    flags: &FlagSet,
    score: Option<Score>,
    country: &CountryName,
  ) -> Classification {
    let input = ClassifyInput { flags, score, country };
    let tier = CASCADE
      .iter()
      .find(|rule| (rule.matches)(&input, &self.scheme))
      .map_or(Tier::Default, |rule| rule.tier);
    self.scheme.outcome(tier)
  }
}

/// Classify with the default scheme.
pub fn classify(flags: &FlagSet, score: Option<Score>, country: &CountryName) -> Classification {
  Classifier::default().classify(flags, score, country)
}

// ─── Tests ────────────────────────────────────────────────────────────────────
