//! The contract every data source implements.

use tracing::{error, info};

use crate::data::normalize::IntoSeriesMetadata;
use crate::domain::{DateWindow, Observation, SourceKind};
use crate::error::IngestError;

/// Source-specific fetcher for series metadata and observations.
///
/// Adapters do network I/O only. They never touch the store, and they classify
/// their failures as `IngestError` instead of leaking transport errors.
pub trait SourceAdapter: Send + Sync {
    /// Raw metadata record as the source describes a series.
    type Raw: IntoSeriesMetadata + Send;

    fn kind(&self) -> SourceKind;

    /// Fetch metadata for each identifier independently.
    ///
    /// One failing identifier is logged and reported in `failed`; it never fails
    /// the rest of the batch.
    fn fetch_series_metadata(&self, series_ids: &[String]) -> MetadataBatch<Self::Raw>;

    /// Fetch observations within the inclusive window (full history when open).
    fn fetch_observations(&self, series_id: &str, window: &DateWindow) -> Result<Vec<Observation>, IngestError>;
}

/// A metadata fetch whose identifiers either succeeded or failed individually.
#[derive(Debug)]
pub struct MetadataBatch<R> {
    pub fetched: Vec<R>,
    pub failed: Vec<FetchFailure>,
}

impl<R> Default for MetadataBatch<R> {
    fn default() -> Self {
        Self {
            fetched: Vec::new(),
            failed: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub series_id: String,
    pub error: IngestError,
}

/// Run `fetch_one` for every identifier, logging each outcome.
pub(crate) fn collect_metadata<R>(
    source: SourceKind,
    series_ids: &[String],
    fetch_one: impl Fn(&str) -> Result<R, IngestError>,
) -> MetadataBatch<R> {
    let mut batch = MetadataBatch::default();
    for series_id in series_ids {
        match fetch_one(series_id) {
            Ok(raw) => {
                info!(source = %source, series_id = %series_id, "series_metadata_fetched");
                batch.fetched.push(raw);
            }
            Err(err) => {
                error!(
                    source = %source,
                    series_id = %series_id,
                    error_kind = err.kind(),
                    error = %err,
                    "series_metadata_fetch_failed"
                );
                batch.failed.push(FetchFailure {
                    series_id: series_id.clone(),
                    error: err,
                });
            }
        }
    }
    batch
}

/// Log the outcome of an observation fetch and pass it through.
pub(crate) fn log_observations(
    source: SourceKind,
    series_id: &str,
    result: Result<Vec<Observation>, IngestError>,
) -> Result<Vec<Observation>, IngestError> {
    match &result {
        Ok(obs) => {
            let date_range = match (obs.first(), obs.last()) {
                (Some(first), Some(last)) => format!("{} to {}", first.date, last.date),
                _ => "empty".to_string(),
            };
            info!(
                source = %source,
                series_id,
                count = obs.len(),
                date_range = %date_range,
                "observations_fetched"
            );
        }
        Err(err) => {
            error!(
                source = %source,
                series_id,
                error_kind = err.kind(),
                error = %err,
                "observations_fetch_failed"
            );
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_failing_identifier_does_not_fail_the_batch() {
        let ids: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let batch = collect_metadata(SourceKind::Valet, &ids, |id| {
            if id == "B" {
                Err(IngestError::transient("VALET", None, "connection reset"))
            } else {
                Ok(id.to_lowercase())
            }
        });

        assert_eq!(batch.fetched, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.failed[0].series_id, "B");
        assert!(batch.failed[0].error.is_transient());
    }
}
