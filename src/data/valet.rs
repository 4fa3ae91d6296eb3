//! Bank of Canada Valet API adapter.
//!
//! Valet has no batch metadata endpoint: descriptive fields come from
//! `seriesDetail` in a one-observation (`recent=1`) response per series.
//! Observation records are keyed dynamically, e.g.
//!
//! ```json
//! { "d": "2024-01-02", "FXUSDCAD": { "v": "1.3316" } }
//! ```
//!
//! and the API does not take date bounds, so windows are applied after fetch.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

use crate::data::adapter::{MetadataBatch, SourceAdapter, collect_metadata, log_observations};
use crate::data::http::HttpFetch;
use crate::data::normalize::{IntoSeriesMetadata, clean_text, map_frequency, parse_value};
use crate::domain::{DateWindow, NewSeries, Observation, SourceKind};
use crate::error::IngestError;

const ORIGIN: &str = "VALET";
const DATE_KEY: &str = "d";
const GENERIC_VALUE_KEY: &str = "v";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Where an observation's value may live, in lookup order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ValueRule {
    /// `{ "<series_id>": { "v": .. } }`
    SeriesKeyNested,
    /// `{ "<series_id>": .. }`
    SeriesKeyScalar,
    /// `{ "v": .. }`
    GenericKey,
}

const VALUE_RULES: [ValueRule; 3] = [
    ValueRule::SeriesKeyNested,
    ValueRule::SeriesKeyScalar,
    ValueRule::GenericKey,
];

impl ValueRule {
    fn lookup<'a>(self, record: &'a Map<String, Value>, series_id: &str) -> Option<&'a Value> {
        let candidate = match self {
            ValueRule::SeriesKeyNested => record.get(series_id)?.as_object()?.get(GENERIC_VALUE_KEY)?,
            ValueRule::SeriesKeyScalar => match record.get(series_id)? {
                Value::Object(_) => return None,
                v => v,
            },
            ValueRule::GenericKey => record.get(GENERIC_VALUE_KEY)?,
        };
        (!is_blank(candidate)).then_some(candidate)
    }
}

fn is_blank(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// First present value under the rule chain.
fn extract_value<'a>(record: &'a Map<String, Value>, series_id: &str) -> Option<&'a Value> {
    VALUE_RULES.iter().find_map(|rule| rule.lookup(record, series_id))
}

/// Series metadata as Valet reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValetSeries {
    pub series_id: String,
    pub label: Option<String>,
    pub description: Option<String>,
    pub frequency: Option<String>,
}

impl IntoSeriesMetadata for ValetSeries {
    fn into_series_metadata(self) -> NewSeries {
        let series_name = clean_text(self.label).unwrap_or_else(|| self.series_id.clone());
        NewSeries {
            series_name,
            series_description: clean_text(self.description),
            frequency: clean_text(self.frequency).map(|f| map_frequency(&f)),
            // Valet does not publish units or seasonal adjustment.
            units: None,
            seasonal_adjustment: None,
            geography: Some(SourceKind::Valet.geography().to_string()),
            source_series_id: self.series_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(rename = "seriesDetail", default)]
    series_detail: HashMap<String, SeriesDetail>,
    #[serde(default)]
    observations: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct SeriesDetail {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    frequency: Option<String>,
}

pub struct ValetAdapter<F> {
    http: F,
    base_url: String,
}

impl<F: HttpFetch> ValetAdapter<F> {
    pub fn new(http: F) -> Self {
        Self::with_base_url(http, SourceKind::Valet.base_url())
    }

    pub fn with_base_url(http: F, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn observations_url(&self, series_id: &str) -> String {
        format!("{}/observations/{series_id}/json", self.base_url)
    }

    fn get_observations(&self, series_id: &str, query: &[(&str, &str)]) -> Result<ObservationsResponse, IngestError> {
        let body = self.http.get_json(&self.observations_url(series_id), query)?;
        serde_json::from_value(body).map_err(|e| IngestError::malformed(ORIGIN, format!("{series_id}: {e}")))
    }

    fn fetch_one_metadata(&self, series_id: &str) -> Result<ValetSeries, IngestError> {
        let mut resp = self.get_observations(series_id, &[("recent", "1")])?;
        let detail = resp.series_detail.remove(series_id).ok_or_else(|| {
            IngestError::malformed(ORIGIN, format!("seriesDetail has no entry for {series_id}"))
        })?;
        Ok(ValetSeries {
            series_id: series_id.to_string(),
            label: detail.label,
            description: detail.description,
            frequency: detail.frequency,
        })
    }

    fn fetch_history(&self, series_id: &str, window: &DateWindow) -> Result<Vec<Observation>, IngestError> {
        let resp = self.get_observations(series_id, &[])?;
        Ok(parse_observations(series_id, &resp.observations, window))
    }
}

/// Turn raw records into observations inside `window`.
///
/// Records with an unparseable date or value are skipped with a warning; records
/// with no published value are dropped silently.
fn parse_observations(series_id: &str, records: &[Value], window: &DateWindow) -> Vec<Observation> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let Some(record) = record.as_object() else {
            warn!(source = ORIGIN, series_id, "observation_record_not_an_object");
            continue;
        };

        let Some(raw_date) = record.get(DATE_KEY).and_then(Value::as_str) else {
            warn!(source = ORIGIN, series_id, "observation_record_missing_date");
            continue;
        };
        let date = match NaiveDate::parse_from_str(raw_date, DATE_FORMAT) {
            Ok(date) => date,
            Err(e) => {
                warn!(source = ORIGIN, series_id, raw_date, error = %e, "observation_date_unparseable");
                continue;
            }
        };
        if !window.contains(date) {
            continue;
        }

        let Some(raw_value) = extract_value(record, series_id) else {
            continue;
        };
        match parse_value(raw_value) {
            Ok(Some(value)) => out.push(Observation::new(date, value)),
            Ok(None) => {}
            Err(message) => {
                warn!(source = ORIGIN, series_id, %date, error = %message, "observation_value_unparseable");
            }
        }
    }
    out.sort_by_key(|o| o.date);
    out
}

impl<F: HttpFetch> SourceAdapter for ValetAdapter<F> {
    type Raw = ValetSeries;

    fn kind(&self) -> SourceKind {
        SourceKind::Valet
    }

    fn fetch_series_metadata(&self, series_ids: &[String]) -> MetadataBatch<ValetSeries> {
        collect_metadata(SourceKind::Valet, series_ids, |id| self.fetch_one_metadata(id))
    }

    fn fetch_observations(&self, series_id: &str, window: &DateWindow) -> Result<Vec<Observation>, IngestError> {
        log_observations(SourceKind::Valet, series_id, self.fetch_history(series_id, window))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::data::http::testing::ScriptedFetcher;

    const BASE: &str = "https://valet.test";

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn adapter(fetcher: ScriptedFetcher) -> ValetAdapter<ScriptedFetcher> {
        ValetAdapter::with_base_url(fetcher, BASE)
    }

    fn url(id: &str) -> String {
        format!("{BASE}/observations/{id}/json")
    }

    fn detail_body(id: &str, label: &str) -> Value {
        json!({
            "seriesDetail": { id: { "label": label, "description": format!("{label} daily rate"), "dimension": {"key": "d"} } },
            "observations": [ { "d": "2024-01-02", id: { "v": "1.3316" } } ]
        })
    }

    #[test]
    fn series_specific_key_matches_generic_key() {
        let nested = json!({ "d": "2024-01-02", "FXUSDCAD": { "v": "1.25" } });
        let scalar = json!({ "d": "2024-01-02", "FXUSDCAD": "1.25" });
        let generic = json!({ "d": "2024-01-02", "v": "1.25" });

        let parse = |rec: Value| parse_observations("FXUSDCAD", &[rec], &DateWindow::full());
        let expected = vec![Observation::new(d(2024, 1, 2), 1.25)];
        assert_eq!(parse(nested), expected);
        assert_eq!(parse(scalar), expected);
        assert_eq!(parse(generic), expected);
    }

    #[test]
    fn blank_series_key_falls_back_to_generic_key() {
        let rec = json!({ "d": "2024-01-02", "FXUSDCAD": "", "v": "1.40" });
        let obs = parse_observations("FXUSDCAD", &[rec], &DateWindow::full());
        assert_eq!(obs, vec![Observation::new(d(2024, 1, 2), 1.40)]);
    }

    #[test]
    fn empty_values_are_dropped_but_zero_is_kept() {
        let records = vec![
            json!({ "d": "2024-01-01", "X": { "v": "" } }),
            json!({ "d": "2024-01-02", "X": { "v": "0" } }),
            json!({ "d": "2024-01-03" }),
            json!({ "d": "2024-01-04", "X": { "v": null } }),
        ];
        let obs = parse_observations("X", &records, &DateWindow::full());
        assert_eq!(obs, vec![Observation::new(d(2024, 1, 2), 0.0)]);
    }

    #[test]
    fn bad_records_are_skipped_not_fatal() {
        let records = vec![
            json!({ "d": "02/01/2024", "X": { "v": "1.0" } }),
            json!({ "X": { "v": "1.0" } }),
            json!({ "d": "2024-01-05", "X": { "v": "n.a.x" } }),
            json!("garbage"),
            json!({ "d": "2024-01-06", "X": { "v": "2.0" } }),
        ];
        let obs = parse_observations("X", &records, &DateWindow::full());
        assert_eq!(obs, vec![Observation::new(d(2024, 1, 6), 2.0)]);
    }

    #[test]
    fn window_is_applied_client_side_inclusively() {
        let body = json!({
            "observations": [
                { "d": "2024-01-01", "X": { "v": "1" } },
                { "d": "2024-01-02", "X": { "v": "2" } },
                { "d": "2024-01-03", "X": { "v": "3" } },
                { "d": "2024-01-04", "X": { "v": "4" } }
            ]
        });
        let fetcher = ScriptedFetcher::new().with_json(&url("X"), body);
        let valet = adapter(fetcher);
        let window = DateWindow::new(Some(d(2024, 1, 2)), Some(d(2024, 1, 3))).unwrap();

        let obs = valet.fetch_observations("X", &window).unwrap();
        assert_eq!(
            obs,
            vec![Observation::new(d(2024, 1, 2), 2.0), Observation::new(d(2024, 1, 3), 3.0)]
        );
        // No range parameters are sent to Valet.
        assert!(valet.http.calls()[0].1.is_empty());
    }

    #[test]
    fn metadata_uses_recent_sample_and_assigns_geography() {
        let fetcher = ScriptedFetcher::new().with_json(&url("FXUSDCAD"), detail_body("FXUSDCAD", "USD/CAD"));
        let valet = adapter(fetcher);

        let batch = valet.fetch_series_metadata(&["FXUSDCAD".to_string()]);
        assert!(batch.failed.is_empty());
        let series = batch.fetched.into_iter().next().unwrap().into_series_metadata();
        assert_eq!(series.source_series_id, "FXUSDCAD");
        assert_eq!(series.series_name, "USD/CAD");
        assert_eq!(series.series_description.as_deref(), Some("USD/CAD daily rate"));
        assert_eq!(series.geography.as_deref(), Some("CAN"));
        assert_eq!(series.units, None);
        assert_eq!(series.seasonal_adjustment, None);

        let calls = valet.http.calls();
        assert_eq!(calls[0].1, vec![("recent".to_string(), "1".to_string())]);
    }

    #[test]
    fn partial_batch_keeps_healthy_identifiers() {
        let fetcher = ScriptedFetcher::new()
            .with_json(&url("A"), detail_body("A", "Series A"))
            .with_error(&url("B"), IngestError::transient(ORIGIN, None, "timed out"))
            .with_json(&url("C"), detail_body("C", "Series C"));
        let valet = adapter(fetcher);

        let ids: Vec<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        let batch = valet.fetch_series_metadata(&ids);

        let fetched: Vec<&str> = batch.fetched.iter().map(|s| s.series_id.as_str()).collect();
        assert_eq!(fetched, vec!["A", "C"]);
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.failed[0].series_id, "B");
        assert!(batch.failed[0].error.is_transient());
    }

    #[test]
    fn missing_series_detail_is_malformed() {
        let fetcher = ScriptedFetcher::new().with_json(&url("X"), json!({ "seriesDetail": {} }));
        let batch = adapter(fetcher).fetch_series_metadata(&["X".to_string()]);
        assert!(batch.fetched.is_empty());
        assert_eq!(batch.failed[0].error.kind(), "malformed_response");
    }

    #[test]
    fn label_falls_back_to_identifier() {
        let raw = ValetSeries {
            series_id: "V39079".into(),
            label: Some("  ".into()),
            description: None,
            frequency: Some("Daily".into()),
        };
        let series = raw.into_series_metadata();
        assert_eq!(series.series_name, "V39079");
        assert_eq!(series.frequency.as_deref(), Some("D"));
    }
}
