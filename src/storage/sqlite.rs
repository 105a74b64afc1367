//! SQLite storage backend for classification metadata

use super::traits::{
    MetadataRecord, MetadataStore, OpenStore, Restriction, StorageError, StorageResult,
    UpsertOutcome,
};
use crate::classify::Label;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed metadata store
///
/// Uses a single database file with a `metadata` table keyed by record id and
/// an append-only `restrictions` ledger. Thread-safe via internal mutex on
/// the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order.
fn ts(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(format!("{}: {}", value, e)))
}

fn parse_label(value: &str) -> StorageResult<Label> {
    value.parse().map_err(|_| StorageError::Label(value.to_string()))
}

/// Raw column values before label/timestamp/json decoding
struct RecordRow {
    id: String,
    file_path: String,
    file_url: String,
    file_size: i64,
    classification: String,
    confidence: f64,
    details_json: String,
    analysis_timestamp: String,
    last_updated: String,
}

impl RecordRow {
    const COLUMNS: &'static str = "id, file_path, file_url, file_size, classification, confidence, \
         details_json, analysis_timestamp, last_updated";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            file_path: row.get(1)?,
            file_url: row.get(2)?,
            file_size: row.get(3)?,
            classification: row.get(4)?,
            confidence: row.get(5)?,
            details_json: row.get(6)?,
            analysis_timestamp: row.get(7)?,
            last_updated: row.get(8)?,
        })
    }

    fn decode(self) -> StorageResult<MetadataRecord> {
        Ok(MetadataRecord {
            id: self.id,
            file_path: self.file_path,
            file_url: self.file_url,
            file_size: u64::try_from(self.file_size).map_err(|_| StorageError::OutOfRange {
                field: "file_size",
                value: self.file_size.to_string(),
            })?,
            classification: parse_label(&self.classification)?,
            confidence: self.confidence,
            detection_details: serde_json::from_str(&self.details_json)?,
            analysis_timestamp: parse_ts(&self.analysis_timestamp)?,
            last_updated: parse_ts(&self.last_updated)?,
        })
    }
}

impl SqliteStore {
    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS metadata (
                id TEXT PRIMARY KEY,
                file_path TEXT NOT NULL,
                file_url TEXT NOT NULL,
                file_size INTEGER NOT NULL,
                classification TEXT NOT NULL,
                confidence REAL NOT NULL,
                details_json TEXT NOT NULL,
                analysis_timestamp TEXT NOT NULL,
                last_updated TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_metadata_classification
                ON metadata(classification);
            CREATE INDEX IF NOT EXISTS idx_metadata_last_updated
                ON metadata(last_updated);

            CREATE TABLE IF NOT EXISTS restrictions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                file_path TEXT NOT NULL,
                directory TEXT NOT NULL,
                classification TEXT NOT NULL,
                restricted_at TEXT NOT NULL
            );

            -- Concurrent reads while the sink writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl MetadataStore for SqliteStore {
    fn upsert(&self, record: &MetadataRecord) -> StorageResult<UpsertOutcome> {
        let file_size = i64::try_from(record.file_size).map_err(|_| StorageError::OutOfRange {
            field: "file_size",
            value: record.file_size.to_string(),
        })?;
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let stored: Option<String> = tx
            .query_row(
                "SELECT analysis_timestamp FROM metadata WHERE id = ?1",
                params![record.id],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match stored.as_deref().map(parse_ts).transpose()? {
            None => UpsertOutcome::Inserted,
            Some(existing) if existing > record.analysis_timestamp => {
                return Ok(UpsertOutcome::Stale);
            }
            Some(_) => UpsertOutcome::Updated,
        };

        tx.execute(
            "INSERT INTO metadata (id, file_path, file_url, file_size, classification, confidence,
                                   details_json, analysis_timestamp, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                file_path = excluded.file_path,
                file_url = excluded.file_url,
                file_size = excluded.file_size,
                classification = excluded.classification,
                confidence = excluded.confidence,
                details_json = excluded.details_json,
                analysis_timestamp = excluded.analysis_timestamp,
                last_updated = excluded.last_updated",
            params![
                record.id,
                record.file_path,
                record.file_url,
                file_size,
                record.classification.as_str(),
                record.confidence,
                serde_json::to_string(&record.detection_details)?,
                ts(&record.analysis_timestamp),
                ts(&record.last_updated),
            ],
        )?;
        tx.commit()?;

        Ok(outcome)
    }

    fn load(&self, file_path: &str) -> StorageResult<Option<MetadataRecord>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {} FROM metadata WHERE id = ?1", RecordRow::COLUMNS);
        let row = conn
            .query_row(&sql, params![super::record_id(file_path)], RecordRow::from_row)
            .optional()?;
        row.map(RecordRow::decode).transpose()
    }

    fn list(&self, limit: Option<usize>) -> StorageResult<Vec<MetadataRecord>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {} FROM metadata ORDER BY last_updated DESC, id LIMIT ?1",
            RecordRow::COLUMNS
        );
        // SQLite treats a negative LIMIT as unbounded
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], RecordRow::from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.decode()?);
        }
        Ok(records)
    }

    fn count(&self) -> StorageResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM metadata", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn record_restriction(&self, restriction: &Restriction) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO restrictions (file_path, directory, classification, restricted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                restriction.file_path,
                restriction.directory,
                restriction.classification.as_str(),
                ts(&restriction.restricted_at),
            ],
        )?;
        Ok(())
    }

    fn restrictions(&self) -> StorageResult<Vec<Restriction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT file_path, directory, classification, restricted_at
             FROM restrictions ORDER BY seq",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut restrictions = Vec::new();
        for row in rows {
            let (file_path, directory, classification, restricted_at) = row?;
            restrictions.push(Restriction {
                file_path,
                directory,
                classification: parse_label(&classification)?,
                restricted_at: parse_ts(&restricted_at)?,
            });
        }
        Ok(restrictions)
    }
}
