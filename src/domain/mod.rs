//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - the source enum (`SourceKind`)
//! - canonical records (`NewSeries`, `Observation`)
//! - fetch bounds (`DateWindow`) and listing rows (`StoredSeries`)

pub mod types;

pub use types::*;
