//! Audit rows for ingestion runs.

use std::fmt;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::IngestError;
use crate::store::series::now_timestamp;

/// Lifecycle of one `ingestion_log` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    /// Every requested series was persisted.
    Success,
    /// Some series were persisted, some failed.
    Partial,
    /// No series was persisted.
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        [
            RunStatus::Running,
            RunStatus::Success,
            RunStatus::Partial,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ]
        .into_iter()
        .find(|status| status.as_str() == s)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestionLogEntry {
    pub log_id: i64,
    pub source_id: i64,
    pub ingestion_start: String,
    pub ingestion_end: Option<String>,
    pub status: RunStatus,
    pub series_count: u64,
    pub records_inserted: u64,
    pub error_message: Option<String>,
}

/// Open a `running` entry and return its id.
pub fn start(conn: &Connection, source_id: i64, series_count: usize) -> Result<i64, IngestError> {
    conn.execute(
        "INSERT INTO ingestion_log (source_id, ingestion_start, status, series_count)
         VALUES (?1, ?2, ?3, ?4)",
        params![source_id, now_timestamp(), RunStatus::Running.as_str(), series_count as i64],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Close an entry with its final status and totals.
pub fn finish(
    conn: &Connection,
    log_id: i64,
    status: RunStatus,
    records_inserted: usize,
    error_message: Option<&str>,
) -> Result<(), IngestError> {
    let updated = conn.execute(
        "UPDATE ingestion_log
         SET ingestion_end = ?2, status = ?3, records_inserted = ?4, error_message = ?5
         WHERE log_id = ?1",
        params![log_id, now_timestamp(), status.as_str(), records_inserted as i64, error_message],
    )?;
    if updated == 0 {
        return Err(IngestError::Persistence(format!("ingestion_log entry {log_id} not found")));
    }
    Ok(())
}

pub fn get(conn: &Connection, log_id: i64) -> Result<Option<IngestionLogEntry>, IngestError> {
    let row = conn
        .query_row(
            "SELECT log_id, source_id, ingestion_start, ingestion_end, status, series_count,
                    records_inserted, error_message
             FROM ingestion_log WHERE log_id = ?1",
            [log_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, Option<String>>(7)?,
                ))
            },
        )
        .optional()?;

    let Some((log_id, source_id, ingestion_start, ingestion_end, status, series_count, records, error_message)) = row
    else {
        return Ok(None);
    };
    let status = RunStatus::parse(&status)
        .ok_or_else(|| IngestError::Persistence(format!("unknown ingestion status '{status}'")))?;

    Ok(Some(IngestionLogEntry {
        log_id,
        source_id,
        ingestion_start,
        ingestion_end,
        status,
        series_count: series_count.max(0) as u64,
        records_inserted: records.max(0) as u64,
        error_message,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[test]
    fn entry_moves_from_running_to_final_status() {
        let store = Store::open_in_memory().unwrap();
        let source_id = store.source_id("FRED").unwrap();
        let conn = store.conn();

        let log_id = start(conn, source_id, 3).unwrap();
        let entry = get(conn, log_id).unwrap().unwrap();
        assert_eq!(entry.status, RunStatus::Running);
        assert_eq!(entry.series_count, 3);
        assert!(entry.ingestion_end.is_none());

        finish(conn, log_id, RunStatus::Partial, 42, Some("B: not found")).unwrap();
        let entry = get(conn, log_id).unwrap().unwrap();
        assert_eq!(entry.status, RunStatus::Partial);
        assert_eq!(entry.records_inserted, 42);
        assert_eq!(entry.error_message.as_deref(), Some("B: not found"));
        assert!(entry.ingestion_end.is_some());
    }

    #[test]
    fn finishing_an_unknown_entry_fails() {
        let store = Store::open_in_memory().unwrap();
        let err = finish(store.conn(), 999, RunStatus::Success, 0, None).unwrap_err();
        assert_eq!(err.kind(), "persistence");
        assert!(get(store.conn(), 999).unwrap().is_none());
    }
}
