//! Command-line parsing for the `chronos` ingestion tool.
//!
//! Parsing and dispatch stay separate: this module only describes arguments,
//! `app` turns them into pipeline calls.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

use crate::domain::SourceKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "chronos", version, about = "Macroeconomic series ingestion (FRED, Bank of Canada Valet)")]
pub struct Cli {
    /// SQLite database file.
    #[arg(long, global = true, env = "CHRONOS_DATABASE_PATH", value_name = "PATH")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch series metadata and observations from a source and upsert them.
    Ingest(IngestArgs),
    /// Compute embeddings for series descriptions that lack one.
    Embed(EmbedArgs),
    /// Check database connectivity and schema.
    Verify,
    /// List registered series with observation counts and date coverage.
    Series(SeriesArgs),
}

#[derive(Debug, Args, Clone)]
pub struct IngestArgs {
    /// Source to ingest from.
    #[arg(short, long, value_enum)]
    pub source: SourceKind,

    /// Source series identifiers (e.g. UNRATE GDP, or FXUSDCAD).
    #[arg(long = "series", value_name = "ID", num_args = 1.., required = true)]
    pub series: Vec<String>,

    /// First observation date to fetch (YYYY-MM-DD, inclusive).
    #[arg(long, value_parser = parse_date)]
    pub start_date: Option<NaiveDate>,

    /// Last observation date to fetch (YYYY-MM-DD, inclusive).
    #[arg(long, value_parser = parse_date)]
    pub end_date: Option<NaiveDate>,

    /// Parallel observation fetches (overrides CHRONOS_MAX_CONCURRENCY).
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=32))]
    pub concurrency: Option<u16>,

    /// Only check the database, do not fetch anything.
    #[arg(long)]
    pub verify_only: bool,
}

#[derive(Debug, Args, Clone)]
pub struct EmbedArgs {
    /// Embed at most this many descriptions in one run.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    pub batch_size: Option<u32>,
}

#[derive(Debug, Args, Clone)]
pub struct SeriesArgs {
    /// Only list series from this source.
    #[arg(long, value_enum)]
    pub source: Option<SourceKind>,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD ({e})"))
}
