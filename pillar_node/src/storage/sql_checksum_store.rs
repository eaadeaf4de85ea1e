use super::{ChecksumEntry, ChecksumStore};
use crate::error::{PillarError, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use tracing::debug;

/// SQLite-based checksum cache
///
/// Survives restarts, which matters most for a checksum pillar: there the
/// database is the only record of which files the pillar holds. Every
/// operation opens its own connection on a blocking task.
pub struct SqliteChecksumStore {
    /// Path to the SQLite database file
    db_path: PathBuf,
}

impl SqliteChecksumStore {
    /// Open the store, creating the database and its schema when missing.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self {
            db_path: db_path.into(),
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        debug!("Initializing checksum database at {:?}", self.db_path);

        if let Some(parent) = self.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&self.db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS checksums (
                collection_id TEXT NOT NULL,
                file_id TEXT NOT NULL,
                checksum TEXT NOT NULL,
                calculation_date INTEGER NOT NULL,
                PRIMARY KEY (collection_id, file_id)
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_checksums_date ON checksums(collection_id, calculation_date)",
            [],
        )?;
        Ok(())
    }

    async fn with_connection<T, F>(&self, operation: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            operation(&conn)
        })
        .await?
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| PillarError::Database(format!("Invalid timestamp {}", millis)))
}

fn read_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn to_entry((collection_id, file_id, checksum, millis): (String, String, String, i64)) -> Result<ChecksumEntry> {
    Ok(ChecksumEntry {
        collection_id,
        file_id,
        checksum,
        calculation_date: from_millis(millis)?,
    })
}

#[async_trait]
impl ChecksumStore for SqliteChecksumStore {
    async fn get_entry(&self, collection_id: &str, file_id: &str) -> Result<Option<ChecksumEntry>> {
        let collection_id = collection_id.to_string();
        let file_id = file_id.to_string();
        self.with_connection(move |conn| {
            let row = conn
                .query_row(
                    "SELECT collection_id, file_id, checksum, calculation_date
                     FROM checksums WHERE collection_id = ? AND file_id = ?",
                    params![collection_id, file_id],
                    read_entry,
                )
                .optional()?;
            row.map(to_entry).transpose()
        })
        .await
    }

    async fn put_entry(&self, entry: ChecksumEntry) -> Result<()> {
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO checksums (collection_id, file_id, checksum, calculation_date)
                 VALUES (?, ?, ?, ?)",
                params![
                    entry.collection_id,
                    entry.file_id,
                    entry.checksum,
                    entry.calculation_date.timestamp_millis()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_entry(&self, collection_id: &str, file_id: &str) -> Result<bool> {
        let collection_id = collection_id.to_string();
        let file_id = file_id.to_string();
        self.with_connection(move |conn| {
            let count = conn.execute(
                "DELETE FROM checksums WHERE collection_id = ? AND file_id = ?",
                params![collection_id, file_id],
            )?;
            Ok(count > 0)
        })
        .await
    }

    async fn list_entries(&self, collection_id: &str) -> Result<Vec<ChecksumEntry>> {
        let collection_id = collection_id.to_string();
        self.with_connection(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT collection_id, file_id, checksum, calculation_date
                 FROM checksums WHERE collection_id = ?
                 ORDER BY calculation_date, file_id",
            )?;
            let rows = stmt.query_map(params![collection_id], read_entry)?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(to_entry(row?)?);
            }
            Ok(entries)
        })
        .await
    }
}
