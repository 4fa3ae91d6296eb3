//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads settings and installs logging
//! - parses CLI arguments
//! - opens the store
//! - dispatches to ingestion, backfill, verification or listing
//! - prints reports

use clap::Parser;

use crate::cancel::CancelFlag;
use crate::cli::{Cli, Command, EmbedArgs, IngestArgs, SeriesArgs};
use crate::config::Settings;
use crate::domain::DateWindow;
use crate::error::AppError;
use crate::ingest::IngestOptions;
use crate::store::{RunStatus, Store};

pub mod pipeline;

/// Exit code when a run finished but stored nothing.
const EXIT_NOTHING_INGESTED: u8 = 3;

/// Entry point for the `chronos` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let mut settings = Settings::from_env()?;
    if let Some(path) = &cli.database {
        settings.database_path = path.clone();
    }

    crate::logging::init_logging(&settings.log_level, settings.log_format)?;

    match cli.command {
        Command::Ingest(args) => handle_ingest(&settings, args),
        Command::Embed(args) => handle_embed(&settings, args),
        Command::Verify => handle_verify(&settings),
        Command::Series(args) => handle_series(&settings, args),
    }
}

fn handle_ingest(settings: &Settings, args: IngestArgs) -> Result<(), AppError> {
    let window = DateWindow::new(args.start_date, args.end_date)?;
    let options = IngestOptions {
        window,
        max_concurrency: args.concurrency.map_or(settings.max_concurrency, usize::from),
    };

    let mut store = Store::open(&settings.database_path)?;
    let health = store.verify()?;
    if args.verify_only {
        print!("{}", crate::report::format_store_health(&health));
        return Ok(());
    }

    let cancel = CancelFlag::new();
    cancel.install_signal_handlers()?;

    let report = pipeline::run_ingest(settings, &mut store, args.source, &args.series, &options, &cancel)?;
    print!("{}", crate::report::format_ingest_summary(&report));

    match report.status {
        RunStatus::Cancelled => Err(crate::error::IngestError::Cancelled.into()),
        RunStatus::Failed => Err(AppError::new(
            EXIT_NOTHING_INGESTED,
            format!("No series from {} were ingested.", report.source),
        )),
        _ => Ok(()),
    }
}

fn handle_embed(settings: &Settings, args: EmbedArgs) -> Result<(), AppError> {
    let mut store = Store::open(&settings.database_path)?;
    let batch_size = args.batch_size.map(|n| n as usize);
    let report = pipeline::run_backfill(settings, &mut store, batch_size)?;
    print!("{}", crate::report::format_backfill(&report));
    Ok(())
}

fn handle_verify(settings: &Settings) -> Result<(), AppError> {
    let store = Store::open(&settings.database_path)?;
    let health = store.verify()?;
    print!("{}", crate::report::format_store_health(&health));
    Ok(())
}

fn handle_series(settings: &Settings, args: SeriesArgs) -> Result<(), AppError> {
    let store = Store::open(&settings.database_path)?;
    let source = args.source.map(|s| s.source_name());
    let rows = crate::store::list_series(store.conn(), source)?;
    print!("{}", crate::report::format_series_table(&rows));
    Ok(())
}
