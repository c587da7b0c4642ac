//! Adapter for hand-maintained list documents.
//!
//! Some lists (tax non-cooperative jurisdictions, for instance) are only
//! published as PDFs or decrees. They are transcribed into a small JSON file:
//!
//! ```json
//! { "countries": ["Panama", "Anguilla"] }
//! ```

use std::path::PathBuf;

use riskmap_core::{
  adapter::{Adapter, AdapterBatch, AdapterError},
  country::CountryName,
  flag::Flag,
};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
  Error, Result,
  config::{Aliases, FileSource},
};

#[derive(Debug, Deserialize)]
struct ListDocument {
  countries: Vec<String>,
}

pub struct FileListAdapter {
  name:    String,
  path:    PathBuf,
  flags:   Vec<Flag>,
  aliases: Aliases,
}

impl FileListAdapter {
  pub fn new(source: &FileSource, aliases: Aliases) -> Self {
    Self {
      name: source.name.clone(),
      path: source.path.clone(),
      flags: source.flags.clone(),
      aliases,
    }
  }

  async fn read(&self) -> Result<Vec<CountryName>> {
    let raw = tokio::fs::read_to_string(&self.path)
      .await
      .map_err(|source| Error::Io { path: self.path.clone(), source })?;
    let doc: ListDocument = serde_json::from_str(&raw)?;

    let mut names = Vec::with_capacity(doc.countries.len());
    for entry in doc.countries {
      match CountryName::new(&entry) {
        Some(name) => names.push(self.aliases.resolve(name)),
        None => warn!(source = %self.name, "skipping blank entry"),
      }
    }
    Ok(names)
  }
}

impl Adapter for FileListAdapter {
  fn name(&self) -> &str { &self.name }

  /// The file is the complete list: every known country it does not name is
  /// NO. Names the store does not know are passed on and ignored downstream.
  async fn fetch(&self, _known: &[CountryName]) -> Result<AdapterBatch, AdapterError> {
    let listed = self.read().await.map_err(|e| AdapterError::Parse {
      source_name: self.name.clone(),
      reason:      e.to_string(),
    })?;
    info!(source = %self.name, listed = listed.len(), path = %self.path.display(), "read list");
    Ok(AdapterBatch::new(&self.name).with_listed(self.flags.iter().copied(), listed))
  }
}

#[cfg(test)]
mod tests {
  use riskmap_core::flag::FlagValue;

  use super::*;

  fn write_temp(contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!(
      "riskmap-list-{}-{}.json",
      std::process::id(),
      contents.len()
    ));
    std::fs::write(&path, contents).unwrap();
    path
  }

  fn adapter(path: PathBuf) -> FileListAdapter {
    let source = FileSource { name: "fr-tax".into(), path, flags: vec![Flag::FrNonCooperative] };
    let aliases = [(CountryName::new("BVI").unwrap(), CountryName::new("British Virgin Islands").unwrap())]
      .into_iter()
      .collect();
    FileListAdapter::new(&source, aliases)
  }

  #[tokio::test]
  async fn reads_listed_countries_through_aliases() {
    let path = write_temp(r#"{ "countries": ["Panama", "bvi", "  "] }"#);
    let known: Vec<CountryName> = ["Panama", "British Virgin Islands", "France"]
      .iter()
      .map(|n| CountryName::new(n).unwrap())
      .collect();

    let batch = adapter(path.clone()).fetch(&known).await.unwrap();
    let _ = std::fs::remove_file(path);

    assert_eq!(batch.desired(&known[0], Flag::FrNonCooperative), Some(FlagValue::Yes));
    assert_eq!(batch.desired(&known[1], Flag::FrNonCooperative), Some(FlagValue::Yes));
    assert_eq!(batch.desired(&known[2], Flag::FrNonCooperative), Some(FlagValue::No));
  }

  #[tokio::test]
  async fn malformed_file_is_a_parse_error() {
    let path = write_temp("{ not json at all, promise }");
    let err = adapter(path.clone()).fetch(&[]).await.unwrap_err();
    let _ = std::fs::remove_file(path);
    assert!(matches!(err, AdapterError::Parse { .. }));
  }

  #[tokio::test]
  async fn missing_file_is_a_parse_error() {
    let err = adapter(PathBuf::from("/nonexistent/riskmap/list.json")).fetch(&[]).await.unwrap_err();
    assert!(matches!(err, AdapterError::Parse { .. }));
  }
}
