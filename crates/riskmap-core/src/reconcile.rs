//! Reconciler: applies adapter batches to a [`FlagStore`], records every
//! observed change in a [`ChangesetSink`], and recomputes derived labels for
//! the countries that changed.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::Arc,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};

use crate::{
  Error, Result,
  adapter::{AdapterBatch, AdapterError},
  change::{ChangeEntry, Field, FieldChange, FieldValue, FieldWrite, RunId, derived_changes},
  classify::Classifier,
  country::{CountryName, CountryRecord},
  flag::Flag,
  store::{ChangesetSink, FlagStore},
};

// ─── Diff ────────────────────────────────────────────────────────────────────

/// The writes needed to bring stored records in line with a batch, and the
/// change-log rows describing them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDiff {
  pub writes:  Vec<FieldWrite>,
  pub changes: Vec<FieldChange>,
  /// Names the batch mentions that the store does not know.
  pub ignored: BTreeSet<CountryName>,
}

impl BatchDiff {
  fn push(&mut self, record: &CountryRecord, value: FieldValue, old_value: Option<String>) {
    self.changes.push(FieldChange {
      country: record.name.clone(),
      field: value.field(),
      old_value,
      new_value: value.render(),
    });
    self.writes.push(FieldWrite { country: record.name.clone(), value });
  }
}

/// Compare `records` against what `batch` asserts. Pure; touches nothing.
///
/// Every owned flag is resolved for every known country, so a country the
/// adapter did not name is driven to NO. Unresolved countries keep their
/// stored values.
pub fn diff_batch(records: &[CountryRecord], batch: &AdapterBatch) -> BatchDiff {
  let mut diff = BatchDiff::default();

  let known: BTreeSet<&CountryName> = records.iter().map(|r| &r.name).collect();
  diff.ignored = batch
    .facts
    .keys()
    .chain(batch.scores.keys())
    .chain(batch.unresolved.iter())
    .filter(|name| !known.contains(name))
    .cloned()
    .collect();

  for record in records {
    for flag in &batch.owned_flags {
      let Some(desired) = batch.desired(&record.name, *flag) else { continue };
      let current = record.flags.get(*flag);
      if current != Some(desired) {
        diff.push(record, FieldValue::Flag(*flag, desired), current.map(|v| v.as_str().to_owned()));
      }
    }

    if batch.unresolved.contains(&record.name) {
      continue;
    }
    if let Some(score) = batch.scores.get(&record.name)
      && record.score != *score
    {
      diff.push(record, FieldValue::Score(*score), record.score.map(|s| s.to_string()));
    }
  }

  diff
}

// ─── Reports ─────────────────────────────────────────────────────────────────

/// What happened to one source during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
  Applied { changes: usize, unresolved: usize, ignored: usize },
  FetchFailed { reason: String },
  StoreFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceReport {
  pub source: String,
  #[serde(flatten)]
  pub status: SourceStatus,
}

/// Result of applying one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
  pub changes:      Vec<FieldChange>,
  pub unresolved:   usize,
  pub ignored:      usize,
  /// The change log could not be written; the flag writes still stand.
  pub audit_failed: bool,
}

/// Result of a reclassification pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReclassifyOutcome {
  pub changes:      Vec<FieldChange>,
  pub audit_failed: bool,
}

/// Summary of a full run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
  pub run_id:         RunId,
  pub started_at:     DateTime<Utc>,
  pub sources:        Vec<SourceReport>,
  pub changes:        Vec<FieldChange>,
  pub audit_failures: usize,
  /// Set when the final reclassification hit a store error.
  pub reclassify_error: Option<String>,
}

impl RunReport {
  pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
    self.sources.iter().filter(|s| !matches!(s.status, SourceStatus::Applied { .. }))
  }
}

// ─── Reconciler ──────────────────────────────────────────────────────────────

/// Applies batches and keeps derived labels current.
///
/// Writers to the same column are serialized through a per-column lock;
/// batches touching disjoint columns may be applied concurrently.
pub struct Reconciler<S, K> {
  store:      Arc<S>,
  sink:       Arc<K>,
  classifier: Classifier,
  locks:      BTreeMap<Field, Mutex<()>>,
}

impl<S, K> Reconciler<S, K>
where
  S: FlagStore,
  K: ChangesetSink,
{
  pub fn new(store: Arc<S>, sink: Arc<K>, classifier: Classifier) -> Self {
    let locks = Flag::all()
      .map(Field::Flag)
      .chain([Field::Score])
      .map(|f| (f, Mutex::new(())))
      .collect();
    Self { store, sink, classifier, locks }
  }

  pub fn classifier(&self) -> &Classifier { &self.classifier }

  /// Lock every column `batch` may write, in a fixed order.
  async fn lock_columns(&self, batch: &AdapterBatch) -> Vec<MutexGuard<'_, ()>> {
    let mut guards = Vec::new();
    for (field, lock) in &self.locks {
      let wanted = match field {
        Field::Flag(flag) => batch.owned_flags.contains(flag),
        Field::Score => !batch.scores.is_empty(),
        _ => false,
      };
      if wanted {
        guards.push(lock.lock().await);
      }
    }
    guards
  }

  /// Apply one adapter batch in a single store transaction.
  ///
  /// A store failure aborts the batch (the backend rolls it back) and is
  /// returned. A change-log failure is logged and reported in the outcome;
  /// the writes are kept.
  pub async fn apply_batch(&self, run_id: RunId, batch: &AdapterBatch) -> Result<BatchOutcome> {
    let _guards = self.lock_columns(batch).await;

    let records = self.store.list_records().await.map_err(store_err)?;
    let diff = diff_batch(&records, batch);

    for name in &diff.ignored {
      warn!(source = %batch.source, country = %name, "ignoring unknown country");
    }
    for name in &batch.unresolved {
      warn!(source = %batch.source, country = %name, "no data; leaving stored values untouched");
    }

    if !diff.writes.is_empty() {
      self.store.apply_writes(diff.writes).await.map_err(store_err)?;
    }
    for change in &diff.changes {
      info!(
        source = %batch.source,
        country = %change.country,
        field = %change.field,
        old = change.old_value.as_deref().unwrap_or("-"),
        new = change.new_value.as_deref().unwrap_or("-"),
        "changed"
      );
    }

    let audit_failed = !self.record(run_id, &diff.changes).await;

    Ok(BatchOutcome {
      changes: diff.changes,
      unresolved: batch.unresolved.len(),
      ignored: diff.ignored.len(),
      audit_failed,
    })
  }

  /// Recompute and persist derived labels for `countries`. Only labels that
  /// actually change are written and logged.
  ///
  /// On a store error the labels already written are still logged before
  /// the error is returned, so the change log never lags the store.
  pub async fn reclassify(
    &self,
    run_id: RunId,
    countries: &BTreeSet<CountryName>,
  ) -> Result<ReclassifyOutcome> {
    let mut changes = Vec::new();
    let derived = self.derive(countries, &mut changes).await;
    let audit_failed = !self.record(run_id, &changes).await;
    derived?;
    Ok(ReclassifyOutcome { changes, audit_failed })
  }

  async fn derive(
    &self,
    countries: &BTreeSet<CountryName>,
    changes: &mut Vec<FieldChange>,
  ) -> Result<()> {
    for name in countries {
      let Some(record) = self.store.get_record(name).await.map_err(store_err)? else {
        warn!(country = %name, "cannot reclassify unknown country");
        continue;
      };

      let next = self.classifier.classify(&record.flags, record.score, &record.name);
      if record.derived.as_ref() == Some(&next) {
        continue;
      }

      self.store.set_derived(&record.name, &next).await.map_err(store_err)?;
      changes.extend(derived_changes(&record.name, record.derived.as_ref(), &next));
    }
    Ok(())
  }

  /// Reclassify every known country.
  pub async fn reclassify_all(&self, run_id: RunId) -> Result<ReclassifyOutcome> {
    let all: BTreeSet<CountryName> =
      self.store.list_countries().await.map_err(store_err)?.into_iter().collect();
    self.reclassify(run_id, &all).await
  }

  /// Apply every fetched batch, skipping sources that failed, then
  /// reclassify every country whose inputs changed.
  pub async fn run(
    &self,
    outcomes: Vec<(String, std::result::Result<AdapterBatch, AdapterError>)>,
  ) -> RunReport {
    let run_id = RunId::new();
    let started_at = Utc::now();
    info!(%run_id, sources = outcomes.len(), "reconciliation started");

    let mut sources = Vec::with_capacity(outcomes.len());
    let mut changes = Vec::new();
    let mut audit_failures = 0;

    for (source, outcome) in outcomes {
      let status = match outcome {
        Err(e) => {
          error!(%source, "source skipped: {e}");
          SourceStatus::FetchFailed { reason: e.to_string() }
        }
        Ok(batch) => match self.apply_batch(run_id, &batch).await {
          Ok(applied) => {
            audit_failures += usize::from(applied.audit_failed);
            let status = SourceStatus::Applied {
              changes:    applied.changes.len(),
              unresolved: applied.unresolved,
              ignored:    applied.ignored,
            };
            changes.extend(applied.changes);
            status
          }
          Err(e) => {
            error!(%source, "batch rolled back: {e}");
            SourceStatus::StoreFailed { reason: e.to_string() }
          }
        },
      };
      sources.push(SourceReport { source, status });
    }

    let dirty: BTreeSet<CountryName> = changes.iter().map(|c| c.country.clone()).collect();
    let reclassify_error = match self.reclassify(run_id, &dirty).await {
      Ok(outcome) => {
        audit_failures += usize::from(outcome.audit_failed);
        changes.extend(outcome.changes);
        None
      }
      Err(e) => {
        error!(%run_id, "reclassification failed: {e}");
        Some(e.to_string())
      }
    };

    if changes.is_empty() {
      info!(%run_id, "no changes detected");
    } else {
      info!(%run_id, changes = changes.len(), dirty = dirty.len(), "reconciliation finished");
    }

    RunReport { run_id, started_at, sources, changes, audit_failures, reclassify_error }
  }

  /// Write `changes` to the sink. Returns `false` if the sink failed.
  async fn record(&self, run_id: RunId, changes: &[FieldChange]) -> bool {
    if changes.is_empty() {
      return true;
    }
    let now = Utc::now();
    let entries: Vec<ChangeEntry> =
      changes.iter().cloned().map(|c| c.into_entry(run_id, now)).collect();

    match self.sink.record_changes(entries).await {
      Ok(()) => true,
      Err(e) => {
        error!(%run_id, count = changes.len(), "failed to record changes: {e}");
        false
      }
    }
  }
}

fn store_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
  Error::Store(Box::new(e))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use crate::{
    change::ChangeQuery,
    classify::{ListColor, Tier},
    country::Score,
    flag::FlagValue,
    memory::MemoryStore,
  };

  use super::*;

  fn name(s: &str) -> CountryName { CountryName::new(s).unwrap() }

  async fn setup(names: &[&str]) -> (Arc<MemoryStore>, Reconciler<MemoryStore, MemoryStore>) {
    let store = Arc::new(MemoryStore::with_countries(names));
    let reconciler = Reconciler::new(store.clone(), store.clone(), Classifier::default());
    reconciler.reclassify_all(RunId::new()).await.unwrap();
    (store, reconciler)
  }

  fn cfa_batch(listed: &[&str]) -> AdapterBatch {
    AdapterBatch::new("fatf-cfa")
      .with_listed([Flag::FatfHighRiskCallForAction], listed.iter().map(|n| name(n)))
  }

  #[tokio::test]
  async fn listed_countries_yes_everyone_else_no() {
    let (store, rec) = setup(&["Iran", "France", "Japan"]).await;

    rec.apply_batch(RunId::new(), &cfa_batch(&["Iran"])).await.unwrap();

    let flag = Flag::FatfHighRiskCallForAction;
    assert_eq!(store.flag(&name("Iran"), flag), Some(FlagValue::Yes));
    assert_eq!(store.flag(&name("France"), flag), Some(FlagValue::No));
    assert_eq!(store.flag(&name("Japan"), flag), Some(FlagValue::No));
  }

  #[tokio::test]
  async fn second_identical_batch_records_nothing() {
    let (store, rec) = setup(&["Iran", "France"]).await;
    let batch = cfa_batch(&["Iran"]);

    let first = rec.run(vec![("fatf-cfa".into(), Ok(batch.clone()))]).await;
    assert!(!first.changes.is_empty());
    let logged = store.change_count();

    let second = rec.run(vec![("fatf-cfa".into(), Ok(batch))]).await;
    assert!(second.changes.is_empty());
    assert_eq!(store.change_count(), logged);
  }

  #[tokio::test]
  async fn delisting_flips_back_to_no() {
    let (store, rec) = setup(&["Iran", "France"]).await;
    rec.apply_batch(RunId::new(), &cfa_batch(&["Iran"])).await.unwrap();

    let outcome = rec.apply_batch(RunId::new(), &cfa_batch(&[])).await.unwrap();
    assert_eq!(outcome.changes.len(), 1);
    assert_eq!(outcome.changes[0].old_value.as_deref(), Some("YES"));
    assert_eq!(outcome.changes[0].new_value.as_deref(), Some("NO"));
    assert_eq!(store.flag(&name("Iran"), Flag::FatfHighRiskCallForAction), Some(FlagValue::No));
  }

  #[tokio::test]
  async fn run_reclassifies_dirty_countries() {
    let (store, rec) = setup(&["Iran", "France"]).await;

    let report = rec.run(vec![("fatf-cfa".into(), Ok(cfa_batch(&["Iran"])))]).await;

    let iran = store.record(&name("Iran")).derived.unwrap();
    assert_eq!(iran.tier, Tier::Prohibited);
    assert_eq!(iran.list_color, ListColor::Black);
    assert!(report.changes.iter().any(|c| c.field == Field::ListColor));

    let log = store.list_changes_sync(&ChangeQuery { run_id: Some(report.run_id), ..Default::default() });
    assert_eq!(log.len(), report.changes.len());
  }

  #[tokio::test]
  async fn unresolved_country_keeps_stored_values() {
    let (store, rec) = setup(&["Iran", "Mali"]).await;
    rec.apply_batch(RunId::new(), &cfa_batch(&["Mali"])).await.unwrap();

    let mut batch = cfa_batch(&[]);
    batch.unresolved.insert(name("Mali"));
    batch.scores.insert(name("Mali"), Score::new(10));
    rec.apply_batch(RunId::new(), &batch).await.unwrap();

    assert_eq!(store.flag(&name("Mali"), Flag::FatfHighRiskCallForAction), Some(FlagValue::Yes));
    assert_eq!(store.record(&name("Mali")).score, None);
  }

  #[tokio::test]
  async fn score_observations_are_applied() {
    let (store, rec) = setup(&["Denmark", "Chad"]).await;

    let mut batch = AdapterBatch::new("cpi");
    batch.scores.insert(name("Denmark"), Score::new(90));
    batch.scores.insert(name("Chad"), None);
    let report = rec.run(vec![("cpi".into(), Ok(batch))]).await;

    assert_eq!(store.record(&name("Denmark")).score, Score::new(90));
    assert_eq!(store.record(&name("Denmark")).derived.unwrap().tier, Tier::ScoreStandard);
    // Chad had no score and still has none: nothing to change.
    assert!(report.changes.iter().all(|c| c.country != name("Chad")));
  }

  #[tokio::test]
  async fn unknown_countries_are_ignored() {
    let (_store, rec) = setup(&["France"]).await;
    let outcome = rec.apply_batch(RunId::new(), &cfa_batch(&["Narnia"])).await.unwrap();
    assert_eq!(outcome.ignored, 1);
    assert_eq!(outcome.changes.len(), 1);
  }

  #[tokio::test]
  async fn failed_source_does_not_block_others() {
    let (store, rec) = setup(&["Iran"]).await;

    let report = rec
      .run(vec![
        (
          "broken".into(),
          Err(AdapterError::Fetch { url: "http://x".into(), reason: "refused".into() }),
        ),
        ("fatf-cfa".into(), Ok(cfa_batch(&["Iran"]))),
      ])
      .await;

    assert_eq!(report.failed_sources().count(), 1);
    assert_eq!(store.flag(&name("Iran"), Flag::FatfHighRiskCallForAction), Some(FlagValue::Yes));
  }

  #[tokio::test]
  async fn store_failure_rolls_back_the_whole_batch() {
    let (store, rec) = setup(&["Iran", "Syria"]).await;
    store.fail_writes(true);

    let batch = AdapterBatch::new("multi").with_listed(
      [Flag::FatfHighRiskCallForAction, Flag::EuAssetFreeze],
      [name("Iran"), name("Syria")],
    );
    let report = rec.run(vec![("multi".into(), Ok(batch))]).await;

    assert!(matches!(report.sources[0].status, SourceStatus::StoreFailed { .. }));
    assert_eq!(store.flag(&name("Iran"), Flag::FatfHighRiskCallForAction), None);
    assert_eq!(store.flag(&name("Syria"), Flag::EuAssetFreeze), None);
  }

  #[tokio::test]
  async fn audit_failure_keeps_the_flag_change() {
    let (store, rec) = setup(&["Iran"]).await;
    store.fail_audit(true);

    let outcome = rec.apply_batch(RunId::new(), &cfa_batch(&["Iran"])).await.unwrap();

    assert!(outcome.audit_failed);
    assert_eq!(store.flag(&name("Iran"), Flag::FatfHighRiskCallForAction), Some(FlagValue::Yes));
  }

  #[tokio::test]
  async fn disjoint_batches_can_apply_concurrently() {
    let (store, rec) = setup(&["Iran", "Russia"]).await;
    let a = cfa_batch(&["Iran"]);
    let b = AdapterBatch::new("eu").with_listed([Flag::EuAssetFreeze], [name("Russia")]);

    let (ra, rb) = tokio::join!(rec.apply_batch(RunId::new(), &a), rec.apply_batch(RunId::new(), &b));
    ra.unwrap();
    rb.unwrap();

    assert_eq!(store.flag(&name("Russia"), Flag::EuAssetFreeze), Some(FlagValue::Yes));
    assert_eq!(store.flag(&name("Iran"), Flag::FatfHighRiskCallForAction), Some(FlagValue::Yes));
  }

  #[tokio::test]
  async fn labels_written_before_a_store_error_are_still_logged() {
    let (store, rec) = setup(&["Iran", "Syria"]).await;
    rec.apply_batch(RunId::new(), &cfa_batch(&["Iran", "Syria"])).await.unwrap();
    store.fail_derived_after(1);

    let run_id = RunId::new();
    let targets: BTreeSet<CountryName> = [name("Iran"), name("Syria")].into();
    assert!(rec.reclassify(run_id, &targets).await.is_err());

    let iran = store.record(&name("Iran")).derived.unwrap();
    assert_eq!(iran.tier, Tier::Prohibited);
    let logged = store.list_changes_sync(&ChangeQuery {
      country: Some(name("Iran")),
      field: Some(Field::ListColor),
      run_id: Some(run_id),
      limit: None,
    });
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].new_value.as_deref(), Some("BLACK"));
    assert!(store.record(&name("Syria")).derived.is_some_and(|c| c.tier != Tier::Prohibited));
  }

  #[tokio::test]
  async fn reclassify_skips_unchanged_labels() {
    let (_store, rec) = setup(&["France"]).await;
    let outcome = rec.reclassify_all(RunId::new()).await.unwrap();
    assert!(outcome.changes.is_empty());
  }

  #[test]
  fn diff_is_complete_over_known_countries() {
    let records: Vec<CountryRecord> = ["A", "B", "C", "D"]
      .iter()
      .map(|n| CountryRecord {
        name:    name(n),
        score:   None,
        flags:   Default::default(),
        derived: None,
      })
      .collect();
    let batch = AdapterBatch::new("x").with_listed([Flag::UkFinancialSanctions], [name("B")]);

    let diff = diff_batch(&records, &batch);
    assert_eq!(diff.writes.len(), 4);
    let yes: Vec<_> = diff
      .writes
      .iter()
      .filter(|w| w.value == FieldValue::Flag(Flag::UkFinancialSanctions, FlagValue::Yes))
      .map(|w| w.country.as_str())
      .collect();
    assert_eq!(yes, ["B"]);
  }
}
