//! [`SqliteStore`]: the SQLite implementation of [`FlagStore`] and
//! [`ChangesetSink`].

use std::path::Path;

use chrono::Utc;
use rusqlite::OptionalExtension as _;

use riskmap_core::{
  change::{ChangeEntry, ChangeQuery, FieldValue, FieldWrite},
  classify::Classification,
  country::{CountryName, CountryRecord, NewCountry, Score},
  flag::{Flag, FlagValue},
  store::{ChangesetSink, FlagStore},
};

use crate::{
  Error, Result,
  encode::{
    COUNTRY_COLUMNS, RawChange, RawCountry, RawFlag, assemble_records, decode_flag_value,
    decode_name, decode_score, encode_classification, encode_dt, encode_uuid,
  },
  schema::{PRAGMAS, SCHEMA, SCHEMA_VERSION},
};

const UPSERT_FLAG: &str = "INSERT INTO country_flags (country, flag, value) VALUES (?1, ?2, ?3)
   ON CONFLICT (country, flag) DO UPDATE SET value = excluded.value";

const TOUCH_COUNTRY: &str = "UPDATE countries SET updated_at = ?2 WHERE name = ?1";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A riskmap store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mostly for tests and dry runs.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    let newer = self
      .conn
      .call(|conn| {
        conn.execute_batch(PRAGMAS)?;
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
          return Ok(Some(version));
        }
        if version < SCHEMA_VERSION {
          conn.execute_batch(SCHEMA)?;
        }
        Ok(None)
      })
      .await?;

    match newer {
      Some(found) => Err(Error::UnsupportedSchema { found, supported: SCHEMA_VERSION }),
      None => Ok(()),
    }
  }

  /// Stored value of one flag plus whether the country exists at all.
  async fn flag_lookup(&self, country: &CountryName, flag: Flag) -> Result<(bool, Option<String>)> {
    let name = country.as_str().to_owned();
    let flag = flag.column();

    let found = self
      .conn
      .call(move |conn| {
        let exists = conn
          .query_row("SELECT 1 FROM countries WHERE name = ?1", [&name], |_| Ok(true))
          .optional()?
          .unwrap_or(false);
        if !exists {
          return Ok((false, None));
        }
        let value: Option<String> = conn
          .query_row(
            "SELECT value FROM country_flags WHERE country = ?1 AND flag = ?2",
            rusqlite::params![name, flag],
            |r| r.get(0),
          )
          .optional()?;
        Ok((true, value))
      })
      .await?;
    Ok(found)
  }
}

// ─── FlagStore impl ──────────────────────────────────────────────────────────

impl FlagStore for SqliteStore {
  type Error = Error;

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn list_countries(&self) -> Result<Vec<CountryName>> {
    let names: Vec<String> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare("SELECT name FROM countries ORDER BY name")?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    names.iter().map(|n| decode_name(n)).collect()
  }

  async fn list_records(&self) -> Result<Vec<CountryRecord>> {
    let (countries, flags) = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {COUNTRY_COLUMNS} FROM countries ORDER BY name"))?;
        let countries = stmt
          .query_map([], RawCountry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare("SELECT country, flag, value FROM country_flags")?;
        let flags = stmt
          .query_map([], |row| {
            Ok(RawFlag { country: row.get(0)?, flag: row.get(1)?, value: row.get(2)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok((countries, flags))
      })
      .await?;

    assemble_records(countries, flags)
  }

  async fn get_record(&self, country: &CountryName) -> Result<Option<CountryRecord>> {
    let name = country.as_str().to_owned();

    let raw = self
      .conn
      .call(move |conn| {
        let Some(country) = conn
          .query_row(
            &format!("SELECT {COUNTRY_COLUMNS} FROM countries WHERE name = ?1"),
            [&name],
            RawCountry::from_row,
          )
          .optional()?
        else {
          return Ok(None);
        };

        let mut stmt =
          conn.prepare("SELECT country, flag, value FROM country_flags WHERE country = ?1")?;
        let flags = stmt
          .query_map([&name], |row| {
            Ok(RawFlag { country: row.get(0)?, flag: row.get(1)?, value: row.get(2)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some((country, flags)))
      })
      .await?;

    raw.map(|(country, flags)| country.into_record(flags)).transpose()
  }

  async fn get_flag(&self, country: &CountryName, flag: Flag) -> Result<Option<FlagValue>> {
    let (exists, value) = self.flag_lookup(country, flag).await?;
    if !exists {
      return Err(Error::CountryNotFound(country.clone()));
    }
    value.as_deref().map(decode_flag_value).transpose()
  }

  async fn get_score(&self, country: &CountryName) -> Result<Option<Score>> {
    let name = country.as_str().to_owned();

    let row: Option<Option<i64>> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row("SELECT score FROM countries WHERE name = ?1", [&name], |r| r.get(0))
            .optional()?,
        )
      })
      .await?;

    match row {
      Some(score) => decode_score(score),
      None => Err(Error::CountryNotFound(country.clone())),
    }
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn set_flag(&self, country: &CountryName, flag: Flag, value: FlagValue) -> Result<()> {
    let name = country.as_str().to_owned();
    let flag = flag.column();
    let value = value.as_str();
    let now = encode_dt(Utc::now());

    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if tx.execute(TOUCH_COUNTRY, rusqlite::params![name, now])? == 0 {
          return Ok(false);
        }
        tx.execute(UPSERT_FLAG, rusqlite::params![name, flag, value])?;
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !found {
      return Err(Error::CountryNotFound(country.clone()));
    }
    Ok(())
  }

  async fn set_derived(&self, country: &CountryName, classification: &Classification) -> Result<()> {
    let name = country.as_str().to_owned();
    let labels = encode_classification(classification);
    let now = encode_dt(Utc::now());

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE countries
             SET risk_level = ?2, vigilance_level = ?3, list_color = ?4, tier = ?5,
                 updated_at = ?6
           WHERE name = ?1",
          rusqlite::params![
            name,
            labels.risk_level,
            labels.vigilance_level,
            labels.list_color,
            labels.tier,
            now,
          ],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(Error::CountryNotFound(country.clone()));
    }
    Ok(())
  }

  async fn apply_writes(&self, writes: Vec<FieldWrite>) -> Result<()> {
    let now = encode_dt(Utc::now());

    // Returns the first unknown country; the transaction is dropped, and
    // therefore rolled back, before anything is committed.
    let missing: Option<CountryName> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        for write in writes {
          let name = write.country.as_str();
          let touched = match write.value {
            FieldValue::Flag(flag, value) => {
              let n = tx.execute(TOUCH_COUNTRY, rusqlite::params![name, now])?;
              if n > 0 {
                tx.execute(UPSERT_FLAG, rusqlite::params![name, flag.column(), value.as_str()])?;
              }
              n
            }
            FieldValue::Score(score) => tx.execute(
              "UPDATE countries SET score = ?2, updated_at = ?3 WHERE name = ?1",
              rusqlite::params![name, score.map(i64::from), now],
            )?,
          };
          if touched == 0 {
            return Ok(Some(write.country));
          }
        }
        tx.commit()?;
        Ok(None)
      })
      .await?;

    match missing {
      Some(country) => Err(Error::CountryNotFound(country)),
      None => Ok(()),
    }
  }

  async fn insert_countries(&self, countries: Vec<NewCountry>) -> Result<usize> {
    let now = encode_dt(Utc::now());

    let outcome: std::result::Result<usize, CountryName> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for country in countries {
          let name = country.name.as_str();
          let exists = tx
            .query_row("SELECT 1 FROM countries WHERE name = ?1", [name], |_| Ok(true))
            .optional()?
            .unwrap_or(false);
          if exists {
            return Ok(Err(country.name));
          }

          tx.execute(
            "INSERT INTO countries (name, score, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
            rusqlite::params![name, country.score.map(i64::from), now],
          )?;
          for (flag, value) in country.flags.iter() {
            tx.execute(UPSERT_FLAG, rusqlite::params![name, flag.column(), value.as_str()])?;
          }
          inserted += 1;
        }
        tx.commit()?;
        Ok(Ok(inserted))
      })
      .await?;

    outcome.map_err(Error::CountryExists)
  }
}

// ─── ChangesetSink impl ──────────────────────────────────────────────────────

impl ChangesetSink for SqliteStore {
  type Error = Error;

  async fn record_changes(&self, entries: Vec<ChangeEntry>) -> Result<()> {
    let rows: Vec<_> = entries
      .into_iter()
      .map(|e| {
        (
          encode_uuid(e.change_id),
          encode_uuid(e.run_id.0),
          e.country.as_str().to_owned(),
          e.field.name(),
          e.old_value,
          e.new_value,
          encode_dt(e.recorded_at),
        )
      })
      .collect();

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO changes (
               change_id, run_id, country, field, old_value, new_value, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          )?;
          for (change_id, run_id, country, field, old, new, at) in rows {
            stmt.execute(rusqlite::params![change_id, run_id, country, field, old, new, at])?;
          }
        }
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn list_changes(&self, query: &ChangeQuery) -> Result<Vec<ChangeEntry>> {
    let country = query.country.as_ref().map(|c| c.as_str().to_owned());
    let field = query.field.map(|f| f.name());
    let run_id = query.run_id.map(|r| encode_uuid(r.0));
    let limit = i64::try_from(query.limit.unwrap_or(100)).unwrap_or(i64::MAX);

    let raws: Vec<RawChange> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT change_id, run_id, country, field, old_value, new_value, recorded_at
           FROM changes
           WHERE (?1 IS NULL OR country = ?1)
             AND (?2 IS NULL OR field   = ?2)
             AND (?3 IS NULL OR run_id  = ?3)
           ORDER BY recorded_at DESC, rowid DESC
           LIMIT ?4",
        )?;

        let rows = stmt
          .query_map(rusqlite::params![country, field, run_id, limit], |row| {
            Ok(RawChange {
              change_id:   row.get(0)?,
              run_id:      row.get(1)?,
              country:     row.get(2)?,
              field:       row.get(3)?,
              old_value:   row.get(4)?,
              new_value:   row.get(5)?,
              recorded_at: row.get(6)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawChange::into_entry).collect()
  }
}
