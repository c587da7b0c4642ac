//! The `FlagStore` and `ChangesetSink` traits.
//!
//! Both are implemented by storage backends (e.g. `riskmap-store-sqlite`).
//! The reconciler and the binaries depend on these abstractions, not on any
//! concrete backend.

use std::future::Future;

use crate::{
  change::{ChangeEntry, ChangeQuery, FieldWrite},
  classify::Classification,
  country::{CountryName, CountryRecord, NewCountry, Score},
  flag::{Flag, FlagValue},
};

/// The per-country flag table.
///
/// Records are created once by [`insert_countries`](FlagStore::insert_countries)
/// and never deleted. Derived labels are only ever written by the reconciler
/// through [`set_derived`](FlagStore::set_derived).
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait FlagStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Every known country, sorted by name.
  fn list_countries(
    &self,
  ) -> impl Future<Output = Result<Vec<CountryName>, Self::Error>> + Send + '_;

  /// Every record with flags, score and derived labels, sorted by name.
  fn list_records(
    &self,
  ) -> impl Future<Output = Result<Vec<CountryRecord>, Self::Error>> + Send + '_;

  /// A single record. Returns `None` if the country is unknown.
  fn get_record<'a>(
    &'a self,
    country: &'a CountryName,
  ) -> impl Future<Output = Result<Option<CountryRecord>, Self::Error>> + Send + 'a;

  /// The stored value of one flag; `None` when it has never been set.
  /// Errors if the country is unknown.
  fn get_flag<'a>(
    &'a self,
    country: &'a CountryName,
    flag: Flag,
  ) -> impl Future<Output = Result<Option<FlagValue>, Self::Error>> + Send + 'a;

  /// The stored score; `None` when absent. Errors if the country is unknown.
  fn get_score<'a>(
    &'a self,
    country: &'a CountryName,
  ) -> impl Future<Output = Result<Option<Score>, Self::Error>> + Send + 'a;

  /// Set a single flag outside of a batch.
  fn set_flag<'a>(
    &'a self,
    country: &'a CountryName,
    flag: Flag,
    value: FlagValue,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Persist the derived labels for one country.
  fn set_derived<'a>(
    &'a self,
    country: &'a CountryName,
    classification: &'a Classification,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Apply every write of one adapter batch in a single transaction: either
  /// all of them land or none do.
  fn apply_writes(
    &self,
    writes: Vec<FieldWrite>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Bulk import. Runs in one transaction and fails if any name exists.
  fn insert_countries(
    &self,
    countries: Vec<NewCountry>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;
}

/// Append-only destination for [`ChangeEntry`] rows.
pub trait ChangesetSink: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn record_changes(
    &self,
    entries: Vec<ChangeEntry>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Entries matching `query`, newest first.
  fn list_changes<'a>(
    &'a self,
    query: &'a ChangeQuery,
  ) -> impl Future<Output = Result<Vec<ChangeEntry>, Self::Error>> + Send + 'a;
}
