//! Keyed writes for series metadata and observations, plus the listing query.

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::domain::{NewSeries, Observation, StoredSeries};
use crate::error::IngestError;

pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// The embedding columns are listed before `series_description`; every RHS sees
// the pre-update row regardless, so the comparison is against the old text.
const UPSERT_SERIES_SQL: &str = "
INSERT INTO series_metadata (
    series_id, source_id, source_series_id, series_name, series_description,
    frequency, units, seasonal_adjustment, geography, created_at, updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
ON CONFLICT (source_id, source_series_id) DO UPDATE SET
    description_embedding = CASE
        WHEN series_metadata.series_description IS excluded.series_description
        THEN series_metadata.description_embedding ELSE NULL END,
    embedding_model = CASE
        WHEN series_metadata.series_description IS excluded.series_description
        THEN series_metadata.embedding_model ELSE NULL END,
    series_name = excluded.series_name,
    series_description = excluded.series_description,
    frequency = excluded.frequency,
    units = excluded.units,
    seasonal_adjustment = excluded.seasonal_adjustment,
    geography = excluded.geography,
    updated_at = excluded.updated_at
RETURNING series_id
";

/// Insert or update one series keyed on `(source_id, source_series_id)`.
///
/// Returns the internal `series_id`, which is minted once and then stable.
/// `is_active` and `created_at` are never touched on update. A changed
/// description clears the stored embedding so the backfill picks it up again.
pub fn upsert_series(conn: &Connection, source_id: i64, series: &NewSeries) -> Result<String, IngestError> {
    let candidate_id = Uuid::new_v4().to_string();
    let series_id = conn.query_row(
        UPSERT_SERIES_SQL,
        params![
            candidate_id,
            source_id,
            series.source_series_id,
            series.series_name,
            series.series_description,
            series.frequency,
            series.units,
            series.seasonal_adjustment,
            series.geography,
            now_timestamp(),
        ],
        |row| row.get(0),
    )?;
    Ok(series_id)
}

/// Insert or overwrite observations keyed on `(series_id, observation_date)`.
///
/// Returns the number of rows written (inserted or overwritten).
pub fn upsert_observations(
    conn: &Connection,
    series_id: &str,
    source_id: i64,
    observations: &[Observation],
) -> Result<usize, IngestError> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO economic_observations (series_id, observation_date, value, source_id, ingestion_timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (series_id, observation_date) DO UPDATE SET
             value = excluded.value,
             ingestion_timestamp = excluded.ingestion_timestamp",
    )?;

    let stamp = now_timestamp();
    let mut written = 0;
    for obs in observations {
        written += stmt.execute(params![series_id, obs.date, obs.value, source_id, stamp])?;
    }
    Ok(written)
}

/// Registered series with observation counts and date coverage.
pub fn list_series(conn: &Connection, source_name: Option<&str>) -> Result<Vec<StoredSeries>, IngestError> {
    let mut stmt = conn.prepare(
        "SELECT m.series_id, s.source_name, m.source_series_id, m.series_name, m.frequency,
                m.is_active, m.description_embedding IS NOT NULL,
                COUNT(o.observation_date), MIN(o.observation_date), MAX(o.observation_date)
         FROM series_metadata m
         JOIN data_sources s ON s.source_id = m.source_id
         LEFT JOIN economic_observations o ON o.series_id = m.series_id
         WHERE ?1 IS NULL OR s.source_name = ?1 COLLATE NOCASE
         GROUP BY m.series_id
         ORDER BY s.source_name, m.source_series_id",
    )?;

    let rows = stmt.query_map([source_name], |row| {
        Ok(StoredSeries {
            series_id: row.get(0)?,
            source_name: row.get(1)?,
            source_series_id: row.get(2)?,
            series_name: row.get(3)?,
            frequency: row.get(4)?,
            is_active: row.get(5)?,
            has_embedding: row.get(6)?,
            observation_count: row.get::<_, i64>(7)?.max(0) as u64,
            first_date: row.get(8)?,
            last_date: row.get(9)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::store::Store;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn series(id: &str, name: &str, description: Option<&str>) -> NewSeries {
        NewSeries {
            source_series_id: id.to_string(),
            series_name: name.to_string(),
            series_description: description.map(str::to_string),
            frequency: Some("M".into()),
            units: None,
            seasonal_adjustment: None,
            geography: Some("CAN".into()),
        }
    }

    fn valet_store() -> (Store, i64) {
        let store = Store::open_in_memory().unwrap();
        let source_id = store.source_id("VALET").unwrap();
        (store, source_id)
    }

    fn observation_rows(conn: &Connection, series_id: &str) -> Vec<(NaiveDate, f64)> {
        let mut stmt = conn
            .prepare("SELECT observation_date, value FROM economic_observations WHERE series_id = ?1 ORDER BY observation_date")
            .unwrap();
        stmt.query_map([series_id], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn metadata_upsert_is_idempotent() {
        let (store, source_id) = valet_store();
        let conn = store.conn();

        let first = upsert_series(conn, source_id, &series("FXUSDCAD", "USD/CAD", Some("old"))).unwrap();
        let revised = NewSeries {
            source_series_id: "FXUSDCAD".into(),
            series_name: "US dollar to Canadian dollar".into(),
            series_description: Some("daily average exchange rate".into()),
            frequency: Some("D".into()),
            units: Some("CAD per USD".into()),
            seasonal_adjustment: Some("NSA".into()),
            geography: Some("CA".into()),
        };
        let second = upsert_series(conn, source_id, &revised).unwrap();
        assert_eq!(first, second);

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM series_metadata WHERE source_series_id = 'FXUSDCAD'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);

        let stored = conn
            .query_row(
                "SELECT source_series_id, series_name, series_description, frequency, units,
                        seasonal_adjustment, geography
                 FROM series_metadata WHERE series_id = ?1",
                [&second],
                |row| {
                    Ok(NewSeries {
                        source_series_id: row.get(0)?,
                        series_name: row.get(1)?,
                        series_description: row.get(2)?,
                        frequency: row.get(3)?,
                        units: row.get(4)?,
                        seasonal_adjustment: row.get(5)?,
                        geography: row.get(6)?,
                    })
                },
            )
            .unwrap();
        assert_eq!(stored, revised);
    }

    #[test]
    fn metadata_upsert_preserves_is_active() {
        let (store, source_id) = valet_store();
        let conn = store.conn();
        let id = upsert_series(conn, source_id, &series("V1", "one", None)).unwrap();
        conn.execute("UPDATE series_metadata SET is_active = 0 WHERE series_id = ?1", [&id])
            .unwrap();

        upsert_series(conn, source_id, &series("V1", "one again", None)).unwrap();
        let active: bool = conn
            .query_row("SELECT is_active FROM series_metadata WHERE series_id = ?1", [&id], |row| row.get(0))
            .unwrap();
        assert!(!active);
    }

    #[test]
    fn description_change_clears_embedding() {
        let (store, source_id) = valet_store();
        let conn = store.conn();
        let id = upsert_series(conn, source_id, &series("V1", "one", Some("alpha"))).unwrap();
        let set_embedding = || {
            conn.execute(
                "UPDATE series_metadata SET description_embedding = x'00000000', embedding_model = 'm' WHERE series_id = ?1",
                [&id],
            )
            .unwrap();
        };
        let has_embedding = || -> bool {
            conn.query_row(
                "SELECT description_embedding IS NOT NULL AND embedding_model IS NOT NULL FROM series_metadata WHERE series_id = ?1",
                [&id],
                |row| row.get(0),
            )
            .unwrap()
        };

        set_embedding();
        upsert_series(conn, source_id, &series("V1", "renamed", Some("alpha"))).unwrap();
        assert!(has_embedding(), "same description keeps the embedding");

        upsert_series(conn, source_id, &series("V1", "renamed", Some("beta"))).unwrap();
        assert!(!has_embedding(), "changed description clears it");

        set_embedding();
        upsert_series(conn, source_id, &series("V1", "renamed", None)).unwrap();
        assert!(!has_embedding(), "description removed clears it");
    }

    #[test]
    fn overlapping_windows_overwrite_without_duplicates() {
        let (store, source_id) = valet_store();
        let conn = store.conn();
        let id = upsert_series(conn, source_id, &series("V1", "one", None)).unwrap();

        let first = [
            Observation::new(d(2024, 1, 1), 1.0),
            Observation::new(d(2024, 1, 2), 2.0),
            Observation::new(d(2024, 1, 3), 3.0),
        ];
        let second = [
            Observation::new(d(2024, 1, 2), 20.0),
            Observation::new(d(2024, 1, 3), 30.0),
            Observation::new(d(2024, 1, 4), 40.0),
        ];
        assert_eq!(upsert_observations(conn, &id, source_id, &first).unwrap(), 3);
        assert_eq!(upsert_observations(conn, &id, source_id, &second).unwrap(), 3);

        assert_eq!(
            observation_rows(conn, &id),
            vec![
                (d(2024, 1, 1), 1.0),
                (d(2024, 1, 2), 20.0),
                (d(2024, 1, 3), 30.0),
                (d(2024, 1, 4), 40.0),
            ]
        );
    }

    #[test]
    fn listing_reports_coverage_per_series() {
        let (store, valet_id) = valet_store();
        let fred_id = store.source_id("FRED").unwrap();
        let conn = store.conn();

        let v1 = upsert_series(conn, valet_id, &series("V1", "one", None)).unwrap();
        upsert_series(conn, fred_id, &series("GDP", "gdp", None)).unwrap();
        upsert_observations(
            conn,
            &v1,
            valet_id,
            &[Observation::new(d(2024, 3, 1), 1.0), Observation::new(d(2024, 1, 1), 2.0)],
        )
        .unwrap();

        let all = list_series(conn, None).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].source_name, "FRED");
        assert_eq!(all[0].observation_count, 0);
        assert_eq!(all[0].first_date, None);

        let valet = list_series(conn, Some("valet")).unwrap();
        assert_eq!(valet.len(), 1);
        assert_eq!(valet[0].observation_count, 2);
        assert_eq!(valet[0].first_date, Some(d(2024, 1, 1)));
        assert_eq!(valet[0].last_date, Some(d(2024, 3, 1)));
        assert!(valet[0].is_active);
        assert!(!valet[0].has_embedding);
    }
}
