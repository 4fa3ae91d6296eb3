//! FRED API adapter (Federal Reserve Bank of St. Louis).
//!
//! Metadata comes from `/series`, observations from `/series/observations`.
//! FRED accepts `observation_start`/`observation_end`, so windows are applied
//! server-side; missing values are published as `"."`.

use chrono::NaiveDate;
use serde::Deserialize;
use tracing::warn;

use crate::data::adapter::{MetadataBatch, SourceAdapter, collect_metadata, log_observations};
use crate::data::http::HttpFetch;
use crate::data::normalize::{IntoSeriesMetadata, clean_text, map_frequency, parse_value_str};
use crate::domain::{DateWindow, NewSeries, Observation, SourceKind};
use crate::error::IngestError;

const ORIGIN: &str = "FRED";
const OBS_LIMIT: usize = 100_000;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Series metadata as FRED reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct FredSeries {
    pub series_id: String,
    pub title: Option<String>,
    pub notes: Option<String>,
    pub frequency_short: Option<String>,
    pub units: Option<String>,
    pub seasonal_adjustment_short: Option<String>,
}

impl IntoSeriesMetadata for FredSeries {
    fn into_series_metadata(self) -> NewSeries {
        let series_name = clean_text(self.title).unwrap_or_else(|| self.series_id.clone());
        NewSeries {
            series_name,
            series_description: clean_text(self.notes),
            frequency: clean_text(self.frequency_short).map(|f| map_frequency(&f)),
            units: clean_text(self.units),
            seasonal_adjustment: clean_text(self.seasonal_adjustment_short),
            geography: Some(SourceKind::Fred.geography().to_string()),
            source_series_id: self.series_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    #[serde(default)]
    seriess: Vec<SeriesInfo>,
}

#[derive(Debug, Deserialize)]
struct SeriesInfo {
    title: Option<String>,
    notes: Option<String>,
    frequency_short: Option<String>,
    units: Option<String>,
    seasonal_adjustment_short: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    count: Option<usize>,
    observations: Vec<RawObservation>,
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    date: String,
    value: String,
}

pub struct FredAdapter<F> {
    http: F,
    api_key: String,
    base_url: String,
}

impl<F: HttpFetch> FredAdapter<F> {
    pub fn new(http: F, api_key: impl Into<String>) -> Self {
        Self::with_base_url(http, api_key, SourceKind::Fred.base_url())
    }

    pub fn with_base_url(http: F, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn request<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, IngestError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let mut query: Vec<(&str, &str)> = params.to_vec();
        query.push(("api_key", self.api_key.as_str()));
        query.push(("file_type", "json"));

        let body = self.http.get_json(&url, &query)?;
        serde_json::from_value(body).map_err(|e| IngestError::malformed(ORIGIN, format!("{endpoint}: {e}")))
    }

    fn fetch_one_metadata(&self, series_id: &str) -> Result<FredSeries, IngestError> {
        let resp: SeriesResponse = self.request("series", &[("series_id", series_id)])?;
        let info = resp
            .seriess
            .into_iter()
            .next()
            .ok_or_else(|| IngestError::malformed(ORIGIN, format!("no series entry for {series_id}")))?;
        Ok(FredSeries {
            series_id: series_id.to_string(),
            title: info.title,
            notes: info.notes,
            frequency_short: info.frequency_short,
            units: info.units,
            seasonal_adjustment_short: info.seasonal_adjustment_short,
        })
    }

    fn fetch_series(&self, series_id: &str, window: &DateWindow) -> Result<Vec<Observation>, IngestError> {
        let start = window.start.map(|d| d.format(DATE_FORMAT).to_string());
        let end = window.end.map(|d| d.format(DATE_FORMAT).to_string());
        let limit = OBS_LIMIT.to_string();

        let mut out = Vec::new();
        let mut offset = 0usize;
        loop {
            let offset_str = offset.to_string();
            let mut params = vec![
                ("series_id", series_id),
                ("sort_order", "asc"),
                ("limit", limit.as_str()),
                ("offset", offset_str.as_str()),
            ];
            if let Some(start) = &start {
                params.push(("observation_start", start.as_str()));
            }
            if let Some(end) = &end {
                params.push(("observation_end", end.as_str()));
            }

            let page: ObservationsResponse = self.request("series/observations", &params)?;
            let page_len = page.observations.len();
            parse_page(series_id, page.observations, window, &mut out);

            offset += page_len;
            let total = page.count.unwrap_or(offset);
            if page_len == 0 || offset >= total {
                break;
            }
        }
        Ok(out)
    }
}

/// Append parsed observations, skipping missing values and bad records.
fn parse_page(series_id: &str, raw: Vec<RawObservation>, window: &DateWindow, out: &mut Vec<Observation>) {
    for obs in raw {
        let value = match parse_value_str(&obs.value) {
            Ok(Some(v)) => v,
            Ok(None) => continue,
            Err(message) => {
                warn!(source = ORIGIN, series_id, raw_date = %obs.date, error = %message, "observation_value_unparseable");
                continue;
            }
        };
        let date = match NaiveDate::parse_from_str(&obs.date, DATE_FORMAT) {
            Ok(date) => date,
            Err(e) => {
                warn!(source = ORIGIN, series_id, raw_date = %obs.date, error = %e, "observation_date_unparseable");
                continue;
            }
        };
        // FRED already filters by window; this guards against a lax server.
        if window.contains(date) {
            out.push(Observation::new(date, value));
        }
    }
}

impl<F: HttpFetch> SourceAdapter for FredAdapter<F> {
    type Raw = FredSeries;

    fn kind(&self) -> SourceKind {
        SourceKind::Fred
    }

    fn fetch_series_metadata(&self, series_ids: &[String]) -> MetadataBatch<FredSeries> {
        collect_metadata(SourceKind::Fred, series_ids, |id| self.fetch_one_metadata(id))
    }

    fn fetch_observations(&self, series_id: &str, window: &DateWindow) -> Result<Vec<Observation>, IngestError> {
        log_observations(SourceKind::Fred, series_id, self.fetch_series(series_id, window))
    }
}
