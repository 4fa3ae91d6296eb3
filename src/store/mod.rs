//! SQLite-backed store for series metadata and observations.
//!
//! A `Store` owns one connection. Every unit of work (one series of an
//! ingestion run, one backfill batch, one log update) goes through
//! `Store::with_transaction`: the closure's `Ok` commits, and any other exit
//! (an `Err`, a panic, an early return through `?`) drops the rusqlite
//! `Transaction`, which rolls it back.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Transaction};
use tracing::{debug, info};

use crate::error::IngestError;

pub mod ingestion_log;
pub mod schema;
pub mod series;

pub use ingestion_log::{IngestionLogEntry, RunStatus};
pub use series::{list_series, upsert_observations, upsert_series};

/// Result of `Store::verify`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHealth {
    pub sqlite_version: String,
    pub tables: Vec<String>,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database file and apply the schema.
    ///
    /// Any failure here is a configuration problem: no unit of work can run.
    pub fn open(path: &Path) -> Result<Self, IngestError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    IngestError::config(format!("failed to create database directory '{}': {e}", parent.display()))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| IngestError::config(format!("failed to open database '{}': {e}", path.display())))?;
        let journal_mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| IngestError::config(format!("failed to enable WAL: {e}")))?;
        debug!(journal_mode = %journal_mode, "database_journal_mode");

        let store = Self::init(conn)?;
        info!(path = %path.display(), "database_opened");
        Ok(store)
    }

    /// Private in-memory database, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self, IngestError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| IngestError::config(format!("failed to open in-memory database: {e}")))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, IngestError> {
        conn.busy_timeout(Duration::from_secs(5))
            .and_then(|_| conn.pragma_update(None, "foreign_keys", "ON"))
            .and_then(|_| schema::apply(&conn))
            .map_err(|e| IngestError::config(format!("failed to initialize schema: {e}")))?;
        Ok(Self { conn })
    }

    /// Run `f` inside one transaction; commit on `Ok`, roll back otherwise.
    pub fn with_transaction<T>(
        &mut self,
        f: impl FnOnce(&Transaction<'_>) -> Result<T, IngestError>,
    ) -> Result<T, IngestError> {
        let tx = self.conn.transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                // Dropping `tx` rolls back; make it explicit so a rollback failure is visible.
                if let Err(rollback_err) = tx.rollback() {
                    debug!(error = %rollback_err, "session_rollback_failed");
                }
                debug!(error_kind = err.kind(), error = %err, "session_rollback");
                Err(err)
            }
        }
    }

    /// Read-only access for queries outside a unit of work.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// `source_id` of a registered source.
    pub fn source_id(&self, source_name: &str) -> Result<i64, IngestError> {
        self.conn
            .query_row(
                "SELECT source_id FROM data_sources WHERE source_name = ?1",
                [source_name],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| IngestError::config(format!("source '{source_name}' not found in data_sources")))
    }

    /// Check connectivity and that every required relation exists.
    pub fn verify(&self) -> Result<StoreHealth, IngestError> {
        let sqlite_version: String = self.conn.query_row("SELECT sqlite_version()", [], |row| row.get(0))?;

        let mut stmt = self
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
        let tables = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let missing: Vec<&str> = schema::REQUIRED_TABLES
            .iter()
            .copied()
            .filter(|t| !tables.iter().any(|have| have == t))
            .collect();
        if !missing.is_empty() {
            return Err(IngestError::config(format!("database is missing tables: {}", missing.join(", "))));
        }

        info!(sqlite_version = %sqlite_version, "database_connection_verified");
        Ok(StoreHealth { sqlite_version, tables })
    }
}
