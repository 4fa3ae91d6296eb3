//! Mapping of source-specific records into the canonical schema.
//!
//! Each source's raw metadata type implements `IntoSeriesMetadata`; persistence
//! only ever sees `NewSeries`. Value parsing lives here too so every adapter
//! treats "no data published" the same way.

use serde_json::Value;

use crate::domain::NewSeries;

/// Conversion from a source's raw metadata record into `NewSeries`.
pub trait IntoSeriesMetadata {
    fn into_series_metadata(self) -> NewSeries;
}

/// Trim, and turn blank strings into `None`.
pub fn clean_text(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Map source frequency codes or labels to `D`, `W`, `BW`, `M`, `Q`, `SA`, `A`.
///
/// Unknown values pass through unchanged (trimmed).
pub fn map_frequency(raw: &str) -> String {
    let trimmed = raw.trim();
    let canonical = match trimmed.to_ascii_lowercase().as_str() {
        "d" | "daily" | "business daily" => "D",
        "w" | "weekly" => "W",
        "bw" | "biweekly" | "bi-weekly" => "BW",
        "m" | "monthly" => "M",
        "q" | "quarterly" => "Q",
        "sa" | "semiannual" | "semi-annual" => "SA",
        "a" | "annual" | "yearly" => "A",
        _ => return trimmed.to_string(),
    };
    canonical.to_string()
}

/// Parse an observation value.
///
/// - `Ok(None)`: the source published nothing for that date (null, empty,
///   `"."`, `"NA"`, non-finite).
/// - `Ok(Some(v))`: a real value, including `0.0`.
/// - `Err(_)`: something that is neither a number nor a known placeholder.
pub fn parse_value(raw: &Value) -> Result<Option<f64>, String> {
    match raw {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64().filter(|v| v.is_finite())),
        Value::String(s) => parse_value_str(s),
        other => Err(format!("unexpected value {other}")),
    }
}

pub fn parse_value_str(raw: &str) -> Result<Option<f64>, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed == "."
        || trimmed.eq_ignore_ascii_case("na")
        || trimmed.eq_ignore_ascii_case("n/a")
    {
        return Ok(None);
    }
    let v = trimmed
        .parse::<f64>()
        .map_err(|_| format!("unparseable value '{trimmed}'"))?;
    Ok(v.is_finite().then_some(v))
}
