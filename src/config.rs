//! Runtime settings loaded from the environment (and `.env`).
//!
//! Values are read through a lookup function so tests can supply a map instead
//! of mutating the process environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::SourceKind;
use crate::error::IngestError;
use crate::logging::LogFormat;

const PLACEHOLDER_FRED_KEY: &str = "your_fred_api_key_here";

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_path: PathBuf,
    pub fred_api_key: Option<String>,
    /// Requests per minute allowed against FRED.
    pub fred_rate_limit: u32,
    /// Requests per minute allowed against Valet.
    pub valet_rate_limit: u32,
    pub http_timeout: Duration,
    pub http_max_retries: u32,
    pub max_concurrency: usize,
    pub log_level: String,
    pub log_format: LogFormat,
    pub embedding_dimension: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("chronos.db"),
            fred_api_key: None,
            fred_rate_limit: 120,
            valet_rate_limit: 60,
            http_timeout: Duration::from_secs(30),
            http_max_retries: 3,
            max_concurrency: 4,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            embedding_dimension: 384,
        }
    }
}

impl Settings {
    /// Load `.env` (if present) and read settings from the process environment.
    pub fn from_env() -> Result<Self, IngestError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IngestError> {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let log_format = match get("CHRONOS_LOG_FORMAT") {
            None => defaults.log_format,
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|_| IngestError::config(format!("CHRONOS_LOG_FORMAT must be 'text' or 'json', got '{raw}'")))?,
        };

        let settings = Self {
            database_path: get("CHRONOS_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            fred_api_key: get("FRED_API_KEY"),
            fred_rate_limit: parse_or(&get, "FRED_RATE_LIMIT", defaults.fred_rate_limit)?,
            valet_rate_limit: parse_or(&get, "VALET_RATE_LIMIT", defaults.valet_rate_limit)?,
            http_timeout: Duration::from_secs(parse_or(
                &get,
                "CHRONOS_HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )?),
            http_max_retries: parse_or(&get, "CHRONOS_HTTP_MAX_RETRIES", defaults.http_max_retries)?,
            max_concurrency: parse_or(&get, "CHRONOS_MAX_CONCURRENCY", defaults.max_concurrency)?,
            log_level: get("CHRONOS_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            embedding_dimension: parse_or(
                &get,
                "CHRONOS_EMBEDDING_DIMENSION",
                defaults.embedding_dimension,
            )?,
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), IngestError> {
        if self.fred_rate_limit == 0 || self.valet_rate_limit == 0 {
            return Err(IngestError::config("rate limits must be at least 1 request/minute"));
        }
        if self.http_timeout.is_zero() {
            return Err(IngestError::config("CHRONOS_HTTP_TIMEOUT_SECS must be at least 1"));
        }
        if !(1..=32).contains(&self.max_concurrency) {
            return Err(IngestError::config(format!(
                "CHRONOS_MAX_CONCURRENCY must be within 1..=32, got {}",
                self.max_concurrency
            )));
        }
        if self.embedding_dimension == 0 {
            return Err(IngestError::config("CHRONOS_EMBEDDING_DIMENSION must be positive"));
        }
        Ok(())
    }

    /// FRED key, required only when ingesting from FRED.
    pub fn require_fred_api_key(&self) -> Result<&str, IngestError> {
        match self.fred_api_key.as_deref() {
            Some(key) if key != PLACEHOLDER_FRED_KEY => Ok(key),
            _ => Err(IngestError::config(
                "FRED_API_KEY not set. Get one at https://fred.stlouisfed.org/docs/api/api_key.html",
            )),
        }
    }

    pub fn rate_limit_for(&self, source: SourceKind) -> u32 {
        match source {
            SourceKind::Fred => self.fred_rate_limit,
            SourceKind::Valet => self.valet_rate_limit,
        }
    }
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, IngestError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| IngestError::config(format!("{key} has an invalid value: '{raw}'"))),
    }
}
