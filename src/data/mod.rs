//! Source adapters: everything that talks to external statistical APIs.
//!
//! - `adapter`: the `SourceAdapter` contract
//! - `http`: the injected transport (timeout, rate limit, retries)
//! - `normalize`: raw records → canonical `NewSeries`, value parsing
//! - `fred`, `valet`: one adapter per source

pub mod adapter;
pub mod fred;
pub mod http;
pub mod normalize;
pub mod valet;

pub use adapter::{FetchFailure, MetadataBatch, SourceAdapter};
pub use fred::{FredAdapter, FredSeries};
pub use http::{HttpFetch, HttpOptions, RateLimiter, ReqwestFetcher};
pub use normalize::IntoSeriesMetadata;
pub use valet::{ValetAdapter, ValetSeries};
