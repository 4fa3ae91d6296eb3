//! Shared domain types.
//!
//! These are the canonical shapes every source is normalized into before they
//! reach the store:
//!
//! - `NewSeries`: descriptive metadata for one source series
//! - `Observation`: one dated value
//! - `DateWindow`: optional inclusive bounds for incremental fetches

use std::fmt;

use chrono::NaiveDate;
use clap::ValueEnum;

use crate::error::IngestError;

/// Statistical APIs the crate can ingest from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum SourceKind {
    /// Federal Reserve Economic Data (St. Louis Fed).
    Fred,
    /// Bank of Canada Valet API.
    Valet,
}

impl SourceKind {
    pub const ALL: [SourceKind; 2] = [SourceKind::Fred, SourceKind::Valet];

    /// Name registered in the `data_sources` relation.
    pub fn source_name(self) -> &'static str {
        match self {
            SourceKind::Fred => "FRED",
            SourceKind::Valet => "VALET",
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            SourceKind::Fred => "https://api.stlouisfed.org/fred",
            SourceKind::Valet => "https://www.bankofcanada.ca/valet",
        }
    }

    /// Jurisdiction assigned to every series of this source.
    ///
    /// Neither API reports geography, so it is fixed per source.
    pub fn geography(self) -> &'static str {
        match self {
            SourceKind::Fred => "USA",
            SourceKind::Valet => "CAN",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_name())
    }
}

/// Canonical series metadata, ready for upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSeries {
    pub source_series_id: String,
    pub series_name: String,
    pub series_description: Option<String>,
    pub frequency: Option<String>,
    pub units: Option<String>,
    pub seasonal_adjustment: Option<String>,
    pub geography: Option<String>,
}

/// One `(date, value)` data point. Missing values never become observations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub value: f64,
}

impl Observation {
    pub fn new(date: NaiveDate, value: f64) -> Self {
        Self { date, value }
    }
}

/// Inclusive `[start, end]` bounds; either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateWindow {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Result<Self, IngestError> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(IngestError::config(format!(
                    "start date {s} is after end date {e}"
                )));
            }
        }
        Ok(Self { start, end })
    }

    /// No bounds: full history as offered by the source.
    pub fn full() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fmt_bound = |d: Option<NaiveDate>| d.map(|d| d.to_string()).unwrap_or_else(|| "..".into());
        write!(f, "[{}, {}]", fmt_bound(self.start), fmt_bound(self.end))
    }
}

/// A registered series with its coverage, as listed by `chronos series`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSeries {
    pub series_id: String,
    pub source_name: String,
    pub source_series_id: String,
    pub series_name: String,
    pub frequency: Option<String>,
    pub is_active: bool,
    pub has_embedding: bool,
    pub observation_count: u64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}
