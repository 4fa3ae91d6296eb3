//! `chronos` library crate.
//!
//! The binary (`chronos`) is a thin wrapper around this library so that:
//!
//! - the pipeline is testable without spawning processes or hitting the network
//! - adapters, the store and the backfill can be driven from other tools
//! - code stays easy to navigate as sources are added

pub mod app;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod data;
pub mod domain;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod report;
pub mod store;
