//! Subcommand implementations.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use anyhow::{Context as _, bail};
use riskmap_core::{
  adapter::Adapter,
  change::{ChangeQuery, Field, RunId},
  classify::Classifier,
  country::{CountryName, NewCountry, Score},
  flag::{Flag, FlagSet, FlagValue},
  reconcile::Reconciler,
  store::{ChangesetSink, FlagStore},
};
use riskmap_sources::{HttpFetcher, SourceAdapter, collect};
use riskmap_store_sqlite::SqliteStore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AppConfig;

type SqliteReconciler = Reconciler<SqliteStore, SqliteStore>;

async fn open(cfg: &AppConfig) -> anyhow::Result<(Arc<SqliteStore>, SqliteReconciler)> {
  let path = cfg.store_path();
  if let Some(dir) = path.parent()
    && !dir.as_os_str().is_empty()
  {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
  }
  let store = SqliteStore::open(&path)
    .await
    .with_context(|| format!("failed to open store at {path:?}"))?;
  let store = Arc::new(store);
  let classifier = Classifier::new(cfg.classification.clone());
  let reconciler = Reconciler::new(store.clone(), store.clone(), classifier);
  Ok((store, reconciler))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

// ─── import ──────────────────────────────────────────────────────────────────

/// One row of an import file. Lenient about spelling: flag names and
/// YES/NO values are case-insensitive, unknown flags are skipped with a
/// warning, and the score may be a number or a string such as `"45/100"`.
#[derive(Debug, Deserialize)]
pub struct ImportRow {
  pub name:  String,
  #[serde(default)]
  pub score: Option<serde_json::Value>,
  #[serde(default)]
  pub flags: BTreeMap<String, String>,
}

impl ImportRow {
  pub fn into_new_country(self) -> anyhow::Result<NewCountry> {
    let name: CountryName = self.name.parse()?;
    let score = match &self.score {
      None | Some(serde_json::Value::Null) => None,
      Some(serde_json::Value::Number(n)) => n.as_i64().and_then(Score::new),
      Some(serde_json::Value::String(s)) => Score::parse(s),
      Some(other) => {
        warn!(country = %name, "ignoring score {other}");
        None
      }
    };
    let flags = FlagSet::from_raw(self.flags.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    Ok(NewCountry { name, score, flags })
  }
}

pub async fn import(cfg: &AppConfig, file: &Path) -> anyhow::Result<()> {
  let raw = std::fs::read_to_string(file)
    .with_context(|| format!("reading import file {}", file.display()))?;
  let rows: Vec<ImportRow> = serde_json::from_str(&raw).context("parsing import file")?;
  let countries = rows
    .into_iter()
    .map(ImportRow::into_new_country)
    .collect::<anyhow::Result<Vec<_>>>()?;

  let (store, reconciler) = open(cfg).await?;
  let inserted = store.insert_countries(countries).await.context("import failed")?;
  info!(inserted, "imported countries");

  let outcome = reconciler.reclassify_all(RunId::new()).await?;
  info!(changes = outcome.changes.len(), "initial classification done");
  Ok(())
}

// ─── run ─────────────────────────────────────────────────────────────────────

pub async fn run(cfg: &AppConfig, only: &[String]) -> anyhow::Result<()> {
  for name in only {
    if !cfg.sources.iter().any(|s| s.name() == name) {
      bail!("no source named {name:?} in the configuration");
    }
  }

  let fetcher = HttpFetcher::new(&cfg.http).context("failed to build HTTP client")?;
  let adapters = cfg
    .sources
    .iter()
    .filter(|s| only.is_empty() || only.iter().any(|n| n == s.name()))
    .map(|s| SourceAdapter::from_config(s, &fetcher, &cfg.http, &cfg.aliases, cfg.run_timeout()))
    .collect::<Result<Vec<_>, _>>()
    .context("invalid source configuration")?;
  if adapters.is_empty() {
    bail!("no sources configured");
  }

  let (store, reconciler) = open(cfg).await?;
  let known = store.list_countries().await?;
  if known.is_empty() {
    warn!("the store holds no countries; run `riskmap import` first");
  }

  let names: Vec<&str> = adapters.iter().map(|a| a.name()).collect();
  info!(sources = ?names, "starting run");
  let outcomes = collect(adapters, known, cfg.run_timeout()).await;
  let report = reconciler.run(outcomes).await;
  print_json(&report)?;

  let failed = report.failed_sources().count();
  if failed > 0 || report.reclassify_error.is_some() {
    bail!("run {} finished with {failed} failed source(s)", report.run_id);
  }
  Ok(())
}

// ─── reclassify / show / classify ────────────────────────────────────────────

pub async fn reclassify(cfg: &AppConfig) -> anyhow::Result<()> {
  let (_store, reconciler) = open(cfg).await?;
  let outcome = reconciler.reclassify_all(RunId::new()).await?;
  if outcome.changes.is_empty() {
    info!("no changes detected");
  }
  print_json(&outcome)
}

#[derive(Serialize)]
struct ShowOutput {
  #[serde(flatten)]
  record:   riskmap_core::country::CountryRecord,
  /// What the current rules would assign; differs from `derived` only if
  /// the configuration changed since the last reclassification.
  computed: riskmap_core::classify::Classification,
}

pub async fn show(cfg: &AppConfig, country: &CountryName) -> anyhow::Result<()> {
  let (store, reconciler) = open(cfg).await?;
  let Some(record) = store.get_record(country).await? else {
    bail!("unknown country {country}");
  };
  let computed = reconciler.classifier().classify(&record.flags, record.score, &record.name);
  print_json(&ShowOutput { record, computed })
}

/// Dry run of the engine; touches no store.
pub fn classify(
  cfg: &AppConfig,
  score: Option<i64>,
  flags: &[Flag],
  country: Option<CountryName>,
) -> anyhow::Result<()> {
  let score = match score {
    Some(v) => Some(Score::new(v).with_context(|| format!("score {v} outside 0..=100"))?),
    None => None,
  };
  let flags: FlagSet = flags.iter().map(|f| (*f, FlagValue::Yes)).collect();
  let country = match country {
    Some(c) => c,
    None => "UNSPECIFIED".parse()?,
  };
  let classification = Classifier::new(cfg.classification.clone()).classify(&flags, score, &country);
  print_json(&classification)
}

// ─── audit ───────────────────────────────────────────────────────────────────

pub async fn audit(cfg: &AppConfig, query: ChangeQuery) -> anyhow::Result<()> {
  let (store, _reconciler) = open(cfg).await?;
  let entries = store.list_changes(&query).await?;
  for e in &entries {
    println!(
      "{}  {}  {:<40}  {:<34}  {} -> {}",
      e.recorded_at.format("%Y-%m-%d %H:%M:%S"),
      e.run_id,
      e.country.as_str(),
      e.field.name(),
      e.old_value.as_deref().unwrap_or("-"),
      e.new_value.as_deref().unwrap_or("-"),
    );
  }
  Ok(())
}

/// Build a change query from CLI filters.
pub fn change_query(
  country: Option<CountryName>,
  field: Option<Field>,
  run: Option<uuid::Uuid>,
  limit: usize,
) -> ChangeQuery {
  ChangeQuery { country, field, run_id: run.map(RunId), limit: Some(limit) }
}
