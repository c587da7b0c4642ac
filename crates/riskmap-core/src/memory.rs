//! In-memory `FlagStore` + `ChangesetSink` used by the reconciler tests.

use std::{
  collections::BTreeMap,
  sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use thiserror::Error;

use crate::{
  change::{ChangeEntry, ChangeQuery, FieldValue, FieldWrite},
  classify::Classification,
  country::{CountryName, CountryRecord, NewCountry, Score},
  flag::{Flag, FlagValue},
  store::{ChangesetSink, FlagStore},
};

#[derive(Debug, Error)]
pub enum MemoryError {
  #[error("country not found: {0}")]
  NotFound(CountryName),
  #[error("country already exists: {0}")]
  Exists(CountryName),
  #[error("injected failure")]
  Injected,
}

pub struct MemoryStore {
  records:        Mutex<BTreeMap<CountryName, CountryRecord>>,
  changes:        Mutex<Vec<ChangeEntry>>,
  fail_writes:    AtomicBool,
  fail_audit:     AtomicBool,
  /// `set_derived` calls allowed before it starts failing.
  derived_budget: AtomicUsize,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self {
      records:        Mutex::default(),
      changes:        Mutex::default(),
      fail_writes:    AtomicBool::new(false),
      fail_audit:     AtomicBool::new(false),
      derived_budget: AtomicUsize::new(usize::MAX),
    }
  }
}

impl MemoryStore {
  pub fn with_countries(names: &[&str]) -> Self {
    let store = Self::default();
    {
      let mut records = store.records.lock().unwrap();
      for n in names {
        let name = CountryName::new(n).unwrap();
        records.insert(name.clone(), CountryRecord {
          name,
          score: None,
          flags: Default::default(),
          derived: None,
        });
      }
    }
    store
  }

  pub fn fail_writes(&self, on: bool) { self.fail_writes.store(on, Ordering::SeqCst) }

  pub fn fail_audit(&self, on: bool) { self.fail_audit.store(on, Ordering::SeqCst) }

  pub fn fail_derived_after(&self, calls: usize) {
    self.derived_budget.store(calls, Ordering::SeqCst)
  }

  pub fn record(&self, name: &CountryName) -> CountryRecord {
    self.records.lock().unwrap()[name].clone()
  }

  pub fn flag(&self, name: &CountryName, flag: Flag) -> Option<FlagValue> {
    self.record(name).flags.get(flag)
  }

  pub fn change_count(&self) -> usize { self.changes.lock().unwrap().len() }

  pub fn list_changes_sync(&self, query: &ChangeQuery) -> Vec<ChangeEntry> {
    self
      .changes
      .lock()
      .unwrap()
      .iter()
      .rev()
      .filter(|e| query.run_id.is_none_or(|r| e.run_id == r))
      .filter(|e| query.country.as_ref().is_none_or(|c| &e.country == c))
      .filter(|e| query.field.is_none_or(|f| e.field == f))
      .take(query.limit.unwrap_or(100))
      .cloned()
      .collect()
  }

  fn with_record<T>(
    &self,
    name: &CountryName,
    f: impl FnOnce(&mut CountryRecord) -> T,
  ) -> Result<T, MemoryError> {
    let mut records = self.records.lock().unwrap();
    let record = records.get_mut(name).ok_or_else(|| MemoryError::NotFound(name.clone()))?;
    Ok(f(record))
  }
}

impl FlagStore for MemoryStore {
  type Error = MemoryError;

  async fn list_countries(&self) -> Result<Vec<CountryName>, MemoryError> {
    Ok(self.records.lock().unwrap().keys().cloned().collect())
  }

  async fn list_records(&self) -> Result<Vec<CountryRecord>, MemoryError> {
    Ok(self.records.lock().unwrap().values().cloned().collect())
  }

  async fn get_record(&self, country: &CountryName) -> Result<Option<CountryRecord>, MemoryError> {
    Ok(self.records.lock().unwrap().get(country).cloned())
  }

  async fn get_flag(&self, country: &CountryName, flag: Flag) -> Result<Option<FlagValue>, MemoryError> {
    self.with_record(country, |r| r.flags.get(flag))
  }

  async fn get_score(&self, country: &CountryName) -> Result<Option<Score>, MemoryError> {
    self.with_record(country, |r| r.score)
  }

  async fn set_flag(
    &self,
    country: &CountryName,
    flag: Flag,
    value: FlagValue,
  ) -> Result<(), MemoryError> {
    self.with_record(country, |r| {
      r.flags.set(flag, value);
    })
  }

  async fn set_derived(
    &self,
    country: &CountryName,
    classification: &Classification,
  ) -> Result<(), MemoryError> {
    let budget = self.derived_budget.load(Ordering::SeqCst);
    if budget == 0 {
      return Err(MemoryError::Injected);
    }
    if budget != usize::MAX {
      self.derived_budget.store(budget - 1, Ordering::SeqCst);
    }
    self.with_record(country, |r| r.derived = Some(*classification))
  }

  async fn apply_writes(&self, writes: Vec<FieldWrite>) -> Result<(), MemoryError> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(MemoryError::Injected);
    }
    let mut records = self.records.lock().unwrap();
    // Stage on a copy so a missing row leaves nothing half-applied.
    let mut staged = records.clone();
    for write in writes {
      let record = staged
        .get_mut(&write.country)
        .ok_or_else(|| MemoryError::NotFound(write.country.clone()))?;
      match write.value {
        FieldValue::Flag(flag, value) => {
          record.flags.set(flag, value);
        }
        FieldValue::Score(score) => record.score = score,
      }
    }
    *records = staged;
    Ok(())
  }

  async fn insert_countries(&self, countries: Vec<NewCountry>) -> Result<usize, MemoryError> {
    let mut records = self.records.lock().unwrap();
    let mut staged = records.clone();
    let count = countries.len();
    for c in countries {
      if staged.contains_key(&c.name) {
        return Err(MemoryError::Exists(c.name));
      }
      staged.insert(c.name.clone(), CountryRecord {
        name:    c.name,
        score:   c.score,
        flags:   c.flags,
        derived: None,
      });
    }
    *records = staged;
    Ok(count)
  }
}

impl ChangesetSink for MemoryStore {
  type Error = MemoryError;

  async fn record_changes(&self, entries: Vec<ChangeEntry>) -> Result<(), MemoryError> {
    if self.fail_audit.load(Ordering::SeqCst) {
      return Err(MemoryError::Injected);
    }
    self.changes.lock().unwrap().extend(entries);
    Ok(())
  }

  async fn list_changes(&self, query: &ChangeQuery) -> Result<Vec<ChangeEntry>, MemoryError> {
    Ok(self.list_changes_sync(query))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn new_country(n: &str) -> NewCountry {
    NewCountry::new(CountryName::new(n).unwrap())
  }

  #[tokio::test]
  async fn duplicate_import_keeps_nothing() {
    let store = MemoryStore::with_countries(&["France"]);

    let err = store
      .insert_countries(vec![new_country("Chad"), new_country("France")])
      .await
      .unwrap_err();

    assert!(matches!(err, MemoryError::Exists(_)));
    assert_eq!(store.list_countries().await.unwrap(), vec![CountryName::new("France").unwrap()]);
  }
}
