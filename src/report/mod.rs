//! Reporting utilities: formatted terminal output for each command.

pub mod format;

pub use format::{format_backfill, format_ingest_summary, format_series_table, format_store_health};
