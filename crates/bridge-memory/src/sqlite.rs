//! `SQLite`-backed [`MemoryStore`].

use std::collections::BTreeSet;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::database::Database;
use crate::errors::{MemoryError, Result};
use crate::store::MemoryStore;
use crate::types::{MemoryPatch, MemoryRecord, SetField};

/// Memory store persisted in a local `SQLite` file.
///
/// Each call takes the connection lock inside a transaction, so merges and
/// appends are atomic per key.
#[derive(Clone)]
pub struct SqliteMemoryStore {
    db: Database,
}

impl SqliteMemoryStore {
    /// Wrap an opened database.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        Database::open(path).map(Self::new)
    }

    /// In-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        Database::in_memory().map(Self::new)
    }

    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f)).await?
    }
}

fn read_record(conn: &Connection, key: &str) -> Result<Option<MemoryRecord>> {
    let row = conn
        .query_row(
            "SELECT summary, user_name, updated_at FROM memory_records WHERE key = ?1",
            [key],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        )
        .optional()?;

    let mut stmt = conn.prepare("SELECT rule FROM memory_rules WHERE key = ?1")?;
    let rules = stmt
        .query_map([key], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<BTreeSet<String>>>()?;

    let Some((summary, user_name, updated_at)) = row else {
        return Ok((!rules.is_empty()).then(|| MemoryRecord {
            rules,
            ..MemoryRecord::default()
        }));
    };

    Ok(Some(MemoryRecord {
        summary,
        user_name,
        rules,
        updated_at: updated_at.as_deref().map(parse_timestamp).transpose()?,
    }))
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| MemoryError::Serialization(format!("updated_at {raw:?}: {e}")))
}

fn write_record(conn: &Connection, key: &str, record: &MemoryRecord, rules: bool) -> Result<()> {
    let _ = conn.execute(
        "INSERT INTO memory_records (key, summary, user_name, updated_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(key) DO UPDATE SET
             summary = excluded.summary,
             user_name = excluded.user_name,
             updated_at = excluded.updated_at",
        params![
            key,
            record.summary,
            record.user_name,
            record.updated_at.map(|ts| ts.to_rfc3339()),
        ],
    )?;

    if rules {
        let _ = conn.execute("DELETE FROM memory_rules WHERE key = ?1", [key])?;
        let now = Utc::now().to_rfc3339();
        let mut stmt = conn.prepare(
            "INSERT OR IGNORE INTO memory_rules (key, rule, created_at) VALUES (?1, ?2, ?3)",
        )?;
        for rule in &record.rules {
            let _ = stmt.execute(params![key, rule, now])?;
        }
    }
    Ok(())
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<MemoryRecord>> {
        let key = key.to_owned();
        self.run(move |conn| read_record(conn, &key)).await
    }

    async fn set(&self, key: &str, patch: MemoryPatch, merge: bool) -> Result<()> {
        let key = key.to_owned();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let base = if merge { read_record(&tx, &key)? } else { None };
            let replace_rules = !merge || patch.rules.is_some();
            let record = patch.apply(base, merge);
            write_record(&tx, &key, &record, replace_rules)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn append_to_set(&self, key: &str, field: SetField, value: &str) -> Result<()> {
        let key = key.to_owned();
        let value = value.to_owned();
        self.run(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn.transaction()?;
            match field {
                SetField::Rules => {
                    let _ = tx.execute(
                        "INSERT OR IGNORE INTO memory_rules (key, rule, created_at) VALUES (?1, ?2, ?3)",
                        params![key, value, now],
                    )?;
                }
            }
            let _ = tx.execute(
                "INSERT INTO memory_records (key, updated_at) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET updated_at = excluded.updated_at",
                params![key, now],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }
}
