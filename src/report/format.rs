//! Formatted terminal output.
//!
//! Formatting lives here so pipeline code returns data and output changes stay
//! localized.

use crate::domain::StoredSeries;
use crate::embed::BackfillReport;
use crate::ingest::{IngestReport, SeriesOutcome};
use crate::store::StoreHealth;

/// One line per series plus a totals line.
pub fn format_ingest_summary(report: &IngestReport) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "=== chronos ingest: {} (log #{}) ===\n",
        report.source, report.log_id
    ));
    for outcome in &report.outcomes {
        let line = match outcome {
            SeriesOutcome::Stored {
                source_series_id,
                observations,
                ..
            } => format!("  ok        {:<24} {observations} observations", truncate(source_series_id, 24)),
            SeriesOutcome::Failed {
                source_series_id,
                stage,
                error,
            } => format!("  failed    {:<24} [{stage}] {error}", truncate(source_series_id, 24)),
            SeriesOutcome::Cancelled { source_series_id } => {
                format!("  cancelled {}", truncate(source_series_id, 24))
            }
        };
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out.push_str(&format!(
        "Status: {} | series stored: {}/{} | observations written: {}\n",
        report.status,
        report.stored_count(),
        report.outcomes.len(),
        report.observations_written()
    ));

    out
}

pub fn format_series_table(rows: &[StoredSeries]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<6} {:<20} {:<32} {:<4} {:>8} {:<10} {:<10} {:<5}\n",
            "source", "series", "name", "freq", "obs", "first", "last", "emb"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<6} {:-<20} {:-<32} {:-<4} {:-<8} {:-<10} {:-<10} {:-<5}\n",
            "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for r in rows {
        let date = |d: Option<chrono::NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "-".into());
        let mut name = truncate(&r.series_name, 32);
        if !r.is_active {
            name = truncate(&format!("{name} (inactive)"), 32);
        }
        out.push_str(
            format!(
                "{:<6} {:<20} {:<32} {:<4} {:>8} {:<10} {:<10} {:<5}\n",
                r.source_name,
                truncate(&r.source_series_id, 20),
                name,
                r.frequency.as_deref().unwrap_or("-"),
                r.observation_count,
                date(r.first_date),
                date(r.last_date),
                if r.has_embedding { "yes" } else { "no" },
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out.push_str(&format!("{} series\n", rows.len()));

    out
}

pub fn format_store_health(health: &StoreHealth) -> String {
    format!(
        "Database OK (SQLite {})\nTables: {}\n",
        health.sqlite_version,
        health.tables.join(", ")
    )
}

pub fn format_backfill(report: &BackfillReport) -> String {
    match &report.model {
        None => "No descriptions pending embedding.\n".to_string(),
        Some(model) => format!(
            "Embedded {}/{} descriptions with {model}.\n",
            report.embedded, report.selected
        ),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::domain::SourceKind;
    use crate::error::IngestError;
    use crate::ingest::Stage;
    use crate::store::RunStatus;

    #[test]
    fn ingest_summary_lists_each_outcome() {
        let report = IngestReport {
            source: SourceKind::Valet,
            log_id: 7,
            status: RunStatus::Partial,
            outcomes: vec![
                SeriesOutcome::Stored {
                    source_series_id: "FXUSDCAD".into(),
                    series_id: "uuid".into(),
                    observations: 12,
                },
                SeriesOutcome::Failed {
                    source_series_id: "NOPE".into(),
                    stage: Stage::Metadata,
                    error: IngestError::transient("VALET", Some(404), "HTTP 404"),
                },
            ],
        };

        let text = format_ingest_summary(&report);
        assert!(text.contains("VALET (log #7)"));
        assert!(text.contains("FXUSDCAD"));
        assert!(text.contains("[metadata]"));
        assert!(text.contains("Status: partial | series stored: 1/2 | observations written: 12"));
    }

    #[test]
    fn series_table_shows_coverage() {
        let rows = vec![StoredSeries {
            series_id: "id".into(),
            source_name: "FRED".into(),
            source_series_id: "UNRATE".into(),
            series_name: "Unemployment Rate".into(),
            frequency: Some("M".into()),
            is_active: true,
            has_embedding: false,
            observation_count: 3,
            first_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            last_date: NaiveDate::from_ymd_opt(2024, 3, 1),
        }];
        let text = format_series_table(&rows);
        assert!(text.contains("UNRATE"));
        assert!(text.contains("2024-01-01"));
        assert!(text.ends_with("1 series\n"));
    }

    #[test]
    fn truncate_marks_cut_text() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdefgh", 5), "abcd.");
    }

    #[test]
    fn backfill_message_without_work() {
        assert_eq!(format_backfill(&BackfillReport::default()), "No descriptions pending embedding.\n");
    }
}
