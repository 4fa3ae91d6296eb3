//! Relational schema for the shared store.

use rusqlite::{Connection, params};

use crate::domain::SourceKind;

pub const SCHEMA_VERSION: i64 = 1;

/// Relations that must exist for the store to be usable.
pub const REQUIRED_TABLES: [&str; 4] = [
    "data_sources",
    "series_metadata",
    "economic_observations",
    "ingestion_log",
];

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS data_sources (
    source_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    source_name TEXT NOT NULL UNIQUE,
    base_url    TEXT
);

CREATE TABLE IF NOT EXISTS series_metadata (
    series_id             TEXT PRIMARY KEY,
    source_id             INTEGER NOT NULL REFERENCES data_sources(source_id),
    source_series_id      TEXT NOT NULL,
    series_name           TEXT NOT NULL,
    series_description    TEXT,
    frequency             TEXT,
    units                 TEXT,
    seasonal_adjustment   TEXT,
    geography             TEXT,
    description_embedding BLOB,
    embedding_model       TEXT,
    is_active             INTEGER NOT NULL DEFAULT 1,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL,
    UNIQUE (source_id, source_series_id)
);

-- Work queue of the embedding backfill.
CREATE INDEX IF NOT EXISTS idx_series_metadata_pending_embedding
    ON series_metadata (series_id)
    WHERE series_description IS NOT NULL AND description_embedding IS NULL;

CREATE TABLE IF NOT EXISTS economic_observations (
    series_id           TEXT NOT NULL REFERENCES series_metadata(series_id),
    observation_date    TEXT NOT NULL,
    value               REAL NOT NULL,
    source_id           INTEGER NOT NULL REFERENCES data_sources(source_id),
    ingestion_timestamp TEXT NOT NULL,
    PRIMARY KEY (series_id, observation_date)
);

CREATE TABLE IF NOT EXISTS ingestion_log (
    log_id           INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id        INTEGER NOT NULL REFERENCES data_sources(source_id),
    ingestion_start  TEXT NOT NULL,
    ingestion_end    TEXT,
    status           TEXT NOT NULL,
    series_count     INTEGER NOT NULL,
    records_inserted INTEGER NOT NULL DEFAULT 0,
    error_message    TEXT
);
";

/// Create missing relations and register the known sources. Idempotent.
pub fn apply(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    let mut seed = conn.prepare("INSERT OR IGNORE INTO data_sources (source_name, base_url) VALUES (?1, ?2)")?;
    for kind in SourceKind::ALL {
        seed.execute(params![kind.source_name(), kind.base_url()])?;
    }

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}
