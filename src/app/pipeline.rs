//! Wiring between settings and the library pipeline.
//!
//! Builds the concrete transport and adapter for a source, so `app` only deals
//! with arguments and output:
//! settings -> HTTP transport -> adapter -> ingest coordinator

use crate::cancel::CancelFlag;
use crate::config::Settings;
use crate::data::{FredAdapter, HttpOptions, ReqwestFetcher, ValetAdapter};
use crate::domain::SourceKind;
use crate::embed::{BackfillReport, HashEmbedder, backfill};
use crate::error::IngestError;
use crate::ingest::{IngestOptions, IngestReport, ingest};
use crate::store::Store;

/// HTTP settings for one source.
pub fn http_options(settings: &Settings, source: SourceKind) -> HttpOptions {
    HttpOptions {
        timeout: settings.http_timeout,
        max_retries: settings.http_max_retries,
        requests_per_minute: settings.rate_limit_for(source),
        ..HttpOptions::default()
    }
}

/// Run one ingestion against the live API of `source`.
pub fn run_ingest(
    settings: &Settings,
    store: &mut Store,
    source: SourceKind,
    series_ids: &[String],
    options: &IngestOptions,
    cancel: &CancelFlag,
) -> Result<IngestReport, IngestError> {
    // Credentials first: a missing key must fail before any request.
    let fred_key = match source {
        SourceKind::Fred => Some(settings.require_fred_api_key()?.to_string()),
        SourceKind::Valet => None,
    };
    let http = ReqwestFetcher::new(source.source_name(), http_options(settings, source))?;

    match fred_key {
        Some(key) => ingest(&FredAdapter::new(http, key), store, series_ids, options, cancel),
        None => ingest(&ValetAdapter::new(http), store, series_ids, options, cancel),
    }
}

/// Embed pending descriptions with the built-in hashing vectorizer.
pub fn run_backfill(settings: &Settings, store: &mut Store, batch_size: Option<usize>) -> Result<BackfillReport, IngestError> {
    let dimension = settings.embedding_dimension;
    backfill(store, batch_size, || HashEmbedder::new(dimension))
}
