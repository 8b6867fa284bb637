//! SQLite-backed store implementation.
//!
//! Single connection behind a mutex; every write is a single-row statement,
//! so no multi-statement transactions are needed. Sequence allocation uses
//! an upsert with `RETURNING` so increment-and-read is one atomic statement.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use driftwire_core::{EventRecord, EventType};
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{Result, StoreError};
use crate::traits::{Checkpoint, CheckpointStore, OutboxEntry, OutboxStore, SequenceAllocator};

/// Row id of the singleton sequence counter.
const SEQUENCE_ROW_ID: &str = "event_sequence";

/// SQLite implementation of [`OutboxStore`], [`SequenceAllocator`], and
/// [`CheckpointStore`].
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).map_err(unavailable)?;
        Self::from_connection(conn)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(unavailable)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS outbox_events (
                 seq              INTEGER PRIMARY KEY,
                 event_id         TEXT NOT NULL,
                 event_type       TEXT NOT NULL,
                 event_data       TEXT NOT NULL,
                 target_client_id TEXT,
                 created_at       TEXT NOT NULL,
                 ttl              TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_outbox_created_at ON outbox_events (created_at);
             CREATE INDEX IF NOT EXISTS idx_outbox_ttl ON outbox_events (ttl);
             CREATE TABLE IF NOT EXISTS event_sequence (
                 id            TEXT PRIMARY KEY,
                 current_value INTEGER NOT NULL,
                 updated_at    TEXT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS client_checkpoints (
                 client_id     TEXT PRIMARY KEY,
                 last_seq      INTEGER NOT NULL,
                 last_event_id TEXT,
                 created_at    TEXT NOT NULL,
                 updated_at    TEXT NOT NULL
             );",
        )
        .map_err(unavailable)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> std::result::Result<OutboxEntry, StoreError> {
        let event_type: String = row.get(2).map_err(unavailable)?;
        let event_type: EventType = event_type
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("outbox row: {e}")))?;
        let created_at: String = row.get(5).map_err(unavailable)?;
        let ttl: String = row.get(6).map_err(unavailable)?;

        Ok(OutboxEntry {
            record: EventRecord {
                seq: row.get(0).map_err(unavailable)?,
                id: row.get(1).map_err(unavailable)?,
                event_type,
                data: row.get(3).map_err(unavailable)?,
                target: row.get(4).map_err(unavailable)?,
            },
            created_at: parse_timestamp(&created_at)?,
            ttl: parse_timestamp(&ttl)?,
        })
    }
}

fn parse_timestamp(raw: &str) -> std::result::Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp {raw:?}: {e}")))
}

fn unavailable(e: rusqlite::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

#[async_trait]
impl OutboxStore for SqliteStore {
    async fn insert(&self, entry: &OutboxEntry) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let result = conn.execute(
            "INSERT INTO outbox_events
                 (seq, event_id, event_type, event_data, target_client_id, created_at, ttl)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.record.seq,
                entry.record.id,
                entry.record.event_type.as_str(),
                entry.record.data,
                entry.record.target,
                entry.created_at.to_rfc3339(),
                entry.ttl.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::DuplicateSequence(entry.record.seq))
            }
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn read_after(&self, from_seq: i64, limit: usize) -> Result<Vec<OutboxEntry>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT seq, event_id, event_type, event_data, target_client_id, created_at, ttl
                 FROM outbox_events
                 WHERE seq > ?1
                 ORDER BY seq ASC
                 LIMIT ?2",
            )
            .map_err(unavailable)?;

        let rows = stmt
            .query_map(params![from_seq, limit as i64], |row| {
                Ok(Self::row_to_entry(row))
            })
            .map_err(unavailable)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(unavailable)??);
        }
        Ok(entries)
    }

    async fn latest(&self) -> Result<Option<OutboxEntry>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            "SELECT seq, event_id, event_type, event_data, target_client_id, created_at, ttl
             FROM outbox_events
             ORDER BY seq DESC
             LIMIT 1",
            [],
            |row| Ok(Self::row_to_entry(row)),
        )
        .optional()
        .map_err(unavailable)?
        .transpose()
    }

    async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let reaped = conn
            .execute(
                "DELETE FROM outbox_events WHERE ttl < ?1",
                params![now.to_rfc3339()],
            )
            .map_err(unavailable)?;
        Ok(reaped as u64)
    }
}

#[async_trait]
impl SequenceAllocator for SqliteStore {
    async fn next(&self) -> Result<i64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            "INSERT INTO event_sequence (id, current_value, updated_at)
             VALUES (?1, 1, ?2)
             ON CONFLICT (id) DO UPDATE
                 SET current_value = current_value + 1, updated_at = ?2
             RETURNING current_value",
            params![SEQUENCE_ROW_ID, Utc::now().to_rfc3339()],
            |row| row.get(0),
        )
        .map_err(unavailable)
    }
}

#[async_trait]
impl CheckpointStore for SqliteStore {
    async fn get(&self, client_id: &str) -> Result<Option<Checkpoint>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.query_row(
            "SELECT client_id, last_seq, last_event_id, updated_at
             FROM client_checkpoints
             WHERE client_id = ?1",
            params![client_id],
            |row| {
                let updated_at: String = row.get(3)?;
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    updated_at,
                ))
            },
        )
        .optional()
        .map_err(unavailable)?
        .map(|(client_id, last_seq, last_event_id, updated_at)| {
            Ok(Checkpoint {
                client_id,
                last_seq,
                last_event_id,
                updated_at: parse_timestamp(&updated_at)?,
            })
        })
        .transpose()
    }

    async fn advance(&self, client_id: &str, seq: i64, event_id: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO client_checkpoints
                 (client_id, last_seq, last_event_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (client_id) DO UPDATE SET
                 last_seq = MAX(last_seq, excluded.last_seq),
                 last_event_id = CASE
                     WHEN excluded.last_seq > last_seq THEN excluded.last_event_id
                     ELSE last_event_id
                 END,
                 updated_at = excluded.updated_at",
            params![client_id, seq, event_id, now],
        )
        .map_err(unavailable)?;
        Ok(())
    }
}
