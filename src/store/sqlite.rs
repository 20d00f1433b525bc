//! SQLite telemetry store: WAL-mode database, one append-only table.
//!
//! The connection sits behind a mutex; `append` runs the "read last
//! received_at, insert, read rowid" sequence inside one transaction so ids and
//! times are assigned atomically.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::errors::{Result, ThError};
use crate::store::{
    TelemetryEntry, TelemetryStore, format_received_at, next_received_at, parse_received_at,
    validate_payload,
};

/// Telemetry store persisted to a SQLite database file.
pub struct SqliteTelemetryStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteTelemetryStore {
    /// Open (or create) the database at `path`, applying schema and PRAGMAs.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|source| ThError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn, true)?;
        apply_schema(&conn)?;
        debug!(path = %path.display(), "opened telemetry database");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Private in-memory database (tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn, false)?;
        apply_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Path to the database file (`None` for in-memory).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Check that WAL mode is active (for diagnostics).
    pub fn is_wal_mode(&self) -> bool {
        self.conn
            .lock()
            .query_row("PRAGMA journal_mode", [], |row| row.get::<_, String>(0))
            .map(|mode| mode.eq_ignore_ascii_case("wal"))
            .unwrap_or(false)
    }
}

impl TelemetryStore for SqliteTelemetryStore {
    fn append(&self, payload: Value) -> Result<TelemetryEntry> {
        validate_payload(&payload)?;
        let text = serde_json::to_string(&payload)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let last: Option<String> = tx
            .query_row(
                "SELECT received_at FROM telemetry_entries ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        let last = last.as_deref().map(parse_received_at).transpose()?;
        let received_at = next_received_at(last);

        tx.execute(
            "INSERT INTO telemetry_entries (received_at, payload) VALUES (?1, ?2)",
            params![format_received_at(received_at), text],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(TelemetryEntry {
            id,
            received_at,
            payload,
        })
    }

    fn list_all(&self) -> Result<Vec<TelemetryEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT id, received_at, payload FROM telemetry_entries ORDER BY id ASC")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, at, payload)| decode_row(id, &at, &payload))
            .collect()
    }

    fn most_recent(&self) -> Result<TelemetryEntry> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT id, received_at, payload FROM telemetry_entries
                 ORDER BY received_at DESC, id DESC LIMIT 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((id, at, payload)) => decode_row(id, &at, &payload),
            None => Err(ThError::NotFound {
                what: "telemetry entry",
            }),
        }
    }

    fn len(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM telemetry_entries", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|err| ThError::Storage {
            context: "count",
            details: err.to_string(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

fn decode_row(id: i64, received_at: &str, payload: &str) -> Result<TelemetryEntry> {
    let payload = serde_json::from_str(payload).map_err(|err| ThError::PayloadDecode {
        context: "stored payload",
        details: err.to_string(),
    })?;
    Ok(TelemetryEntry {
        id,
        received_at: parse_received_at(received_at)?,
        payload,
    })
}

fn apply_pragmas(conn: &Connection, file_backed: bool) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;
         PRAGMA busy_timeout = 5000;",
    )?;
    if file_backed {
        let mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if !mode.eq_ignore_ascii_case("wal") {
            warn!("requested WAL mode but got '{mode}'");
        }
    }
    Ok(())
}

fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS telemetry_entries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            received_at TEXT NOT NULL,
            payload TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_telemetry_received_at
            ON telemetry_entries(received_at);",
    )?;
    Ok(())
}

// ──────────────────── tests ────────────────────
