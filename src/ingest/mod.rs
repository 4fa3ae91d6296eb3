//! Ingestion coordinator.
//!
//! One run, for one source:
//! identifiers -> metadata batch -> normalization -> observation fetches on a
//! bounded worker pool -> one transaction per series -> ingestion log.
//!
//! Network work happens in parallel; writes are sequential on the store's single
//! connection. A failure in any stage is contained to its series.

use std::collections::HashSet;
use std::fmt;

use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::cancel::CancelFlag;
use crate::data::{IntoSeriesMetadata, SourceAdapter};
use crate::domain::{DateWindow, NewSeries, Observation, SourceKind};
use crate::error::IngestError;
use crate::store::{RunStatus, Store, ingestion_log, upsert_observations, upsert_series};

/// Longest error summary stored in `ingestion_log.error_message`.
const ERROR_SUMMARY_MAX: usize = 2_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    pub window: DateWindow,
    pub max_concurrency: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            window: DateWindow::full(),
            max_concurrency: 4,
        }
    }
}

/// Where a series failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Metadata,
    Observations,
    Persist,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Metadata => "metadata",
            Stage::Observations => "observations",
            Stage::Persist => "persist",
        })
    }
}

#[derive(Debug, Clone)]
pub enum SeriesOutcome {
    Stored {
        source_series_id: String,
        series_id: String,
        observations: usize,
    },
    Failed {
        source_series_id: String,
        stage: Stage,
        error: IngestError,
    },
    /// Not persisted because the run was cancelled first.
    Cancelled { source_series_id: String },
}

impl SeriesOutcome {
    pub fn source_series_id(&self) -> &str {
        match self {
            SeriesOutcome::Stored { source_series_id, .. }
            | SeriesOutcome::Failed { source_series_id, .. }
            | SeriesOutcome::Cancelled { source_series_id } => source_series_id,
        }
    }

    pub fn is_stored(&self) -> bool {
        matches!(self, SeriesOutcome::Stored { .. })
    }
}

/// Summary of one run.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub source: SourceKind,
    pub log_id: i64,
    pub status: RunStatus,
    /// In input order.
    pub outcomes: Vec<SeriesOutcome>,
}

impl IngestReport {
    pub fn stored_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_stored()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, SeriesOutcome::Failed { .. }))
            .count()
    }

    pub fn observations_written(&self) -> usize {
        self.outcomes
            .iter()
            .map(|o| match o {
                SeriesOutcome::Stored { observations, .. } => *observations,
                _ => 0,
            })
            .sum()
    }
}

/// Trim, drop blanks and duplicates, keep first-seen order.
pub fn dedupe_series_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

/// Ingest `series_ids` from `adapter` into `store`.
///
/// Only run-level problems are returned as `Err`: an empty id list, an
/// unregistered source, a worker pool that cannot be built, or an ingestion log
/// that cannot be written. Per-series failures are reported in the outcomes.
pub fn ingest<A: SourceAdapter>(
    adapter: &A,
    store: &mut Store,
    series_ids: &[String],
    options: &IngestOptions,
    cancel: &CancelFlag,
) -> Result<IngestReport, IngestError> {
    let source = adapter.kind();
    let ids = dedupe_series_ids(series_ids);
    if ids.is_empty() {
        return Err(IngestError::config("no series identifiers given"));
    }

    let source_id = store.source_id(source.source_name())?;
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.max_concurrency.max(1))
        .thread_name(|i| format!("chronos-fetch-{i}"))
        .build()
        .map_err(|e| IngestError::config(format!("failed to build fetch pool: {e}")))?;

    let log_id = store.with_transaction(|tx| ingestion_log::start(tx, source_id, ids.len()))?;
    info!(
        source = %source,
        log_id,
        series_count = ids.len(),
        window = %options.window,
        max_concurrency = options.max_concurrency,
        "ingestion_started"
    );

    let outcomes = if cancel.is_cancelled() {
        ids.iter()
            .map(|id| SeriesOutcome::Cancelled {
                source_series_id: id.clone(),
            })
            .collect()
    } else {
        run_series(adapter, store, source_id, &ids, options, cancel, &pool)
    };

    let status = run_status(&outcomes);
    let records: usize = outcomes
        .iter()
        .map(|o| match o {
            SeriesOutcome::Stored { observations, .. } => *observations,
            _ => 0,
        })
        .sum();
    let summary = error_summary(&outcomes);
    store.with_transaction(|tx| ingestion_log::finish(tx, log_id, status, records, summary.as_deref()))?;

    info!(
        source = %source,
        log_id,
        status = %status,
        stored = outcomes.iter().filter(|o| o.is_stored()).count(),
        records,
        "ingestion_finished"
    );

    Ok(IngestReport {
        source,
        log_id,
        status,
        outcomes,
    })
}

fn run_series<A: SourceAdapter>(
    adapter: &A,
    store: &mut Store,
    source_id: i64,
    ids: &[String],
    options: &IngestOptions,
    cancel: &CancelFlag,
    pool: &rayon::ThreadPool,
) -> Vec<SeriesOutcome> {
    let source = adapter.kind();
    let mut outcomes = Vec::with_capacity(ids.len());
    let mut series: Vec<NewSeries> = Vec::with_capacity(ids.len());

    // One identifier per call so an interrupt stops the metadata pass between requests.
    for (i, id) in ids.iter().enumerate() {
        if cancel.is_cancelled() {
            warn!(source = %source, remaining = ids.len() - i, "metadata_fetch_cancelled");
            outcomes.extend(ids[i..].iter().map(|id| SeriesOutcome::Cancelled {
                source_series_id: id.clone(),
            }));
            break;
        }
        let batch = adapter.fetch_series_metadata(std::slice::from_ref(id));
        outcomes.extend(batch.failed.into_iter().map(|failure| SeriesOutcome::Failed {
            source_series_id: failure.series_id,
            stage: Stage::Metadata,
            error: failure.error,
        }));
        series.extend(batch.fetched.into_iter().map(IntoSeriesMetadata::into_series_metadata));
    }

    let window = options.window;
    let fetched: Vec<(NewSeries, Result<Vec<Observation>, IngestError>)> = pool.install(|| {
        series
            .into_par_iter()
            .map(|s| {
                if cancel.is_cancelled() {
                    return (s, Err(IngestError::Cancelled));
                }
                let result = adapter.fetch_observations(&s.source_series_id, &window);
                (s, result)
            })
            .collect()
    });

    for (series, observations) in fetched {
        outcomes.push(persist_series(store, source, source_id, series, observations, cancel));
    }

    let position = |id: &str| ids.iter().position(|i| i == id).unwrap_or(usize::MAX);
    outcomes.sort_by_key(|o| position(o.source_series_id()));
    outcomes
}

/// Write one series (metadata, then observations) as a single unit of work.
///
/// When the observation fetch failed, the metadata is still stored so the series
/// is registered, and the series is reported as failed at that stage.
fn persist_series(
    store: &mut Store,
    source: SourceKind,
    source_id: i64,
    series: NewSeries,
    observations: Result<Vec<Observation>, IngestError>,
    cancel: &CancelFlag,
) -> SeriesOutcome {
    let source_series_id = series.source_series_id.clone();
    if cancel.is_cancelled() || matches!(observations, Err(IngestError::Cancelled)) {
        warn!(source = %source, series_id = %source_series_id, "series_skipped_cancelled");
        return SeriesOutcome::Cancelled { source_series_id };
    }

    let rows: &[Observation] = observations.as_deref().unwrap_or(&[]);
    let written = store.with_transaction(|tx| {
        let series_id = upsert_series(tx, source_id, &series)?;
        let count = upsert_observations(tx, &series_id, source_id, rows)?;
        cancel.check()?;
        Ok((series_id, count))
    });

    match (written, observations) {
        (Ok((series_id, count)), Ok(_)) => {
            info!(
                source = %source,
                series_id = %source_series_id,
                internal_id = %series_id,
                observations = count,
                "series_persisted"
            );
            SeriesOutcome::Stored {
                source_series_id,
                series_id,
                observations: count,
            }
        }
        (Ok(_), Err(error)) => SeriesOutcome::Failed {
            source_series_id,
            stage: Stage::Observations,
            error,
        },
        (Err(IngestError::Cancelled), _) => {
            warn!(source = %source, series_id = %source_series_id, "series_rolled_back_cancelled");
            SeriesOutcome::Cancelled { source_series_id }
        }
        (Err(error), _) => {
            error!(
                source = %source,
                series_id = %source_series_id,
                stage = %Stage::Persist,
                error_kind = error.kind(),
                error = %error,
                "series_persist_failed"
            );
            SeriesOutcome::Failed {
                source_series_id,
                stage: Stage::Persist,
                error,
            }
        }
    }
}

fn run_status(outcomes: &[SeriesOutcome]) -> RunStatus {
    let stored = outcomes.iter().filter(|o| o.is_stored()).count();
    if outcomes
        .iter()
        .any(|o| matches!(o, SeriesOutcome::Cancelled { .. }))
    {
        RunStatus::Cancelled
    } else if stored == 0 {
        RunStatus::Failed
    } else if stored < outcomes.len() {
        RunStatus::Partial
    } else {
        RunStatus::Success
    }
}

fn error_summary(outcomes: &[SeriesOutcome]) -> Option<String> {
    let parts: Vec<String> = outcomes
        .iter()
        .filter_map(|o| match o {
            SeriesOutcome::Failed {
                source_series_id,
                stage,
                error,
            } => Some(format!("{source_series_id} ({stage}): {error}")),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return None;
    }

    let mut summary = parts.join("; ");
    if summary.len() > ERROR_SUMMARY_MAX {
        let mut cut = ERROR_SUMMARY_MAX;
        while !summary.is_char_boundary(cut) {
            cut -= 1;
        }
        summary.truncate(cut);
        summary.push_str("...");
    }
    Some(summary)
}
