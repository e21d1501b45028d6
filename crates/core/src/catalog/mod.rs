//! Remote catalog access and its time-bounded local cache.

/// TTL-bounded catalog snapshot stored in durable storage.
pub mod cache;
/// GraphQL transport for the item catalog.
pub mod client;

use thiserror::Error;

pub use cache::{CacheEnvelope, CacheStatus, CatalogCache, Clock};
pub use client::{items_query, CatalogSource, GraphqlClient};

/// Failure to obtain a usable catalog.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never produced a response.
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("catalog request returned status {0}")]
    Status(reqwest::StatusCode),
    /// The body was not a catalog response.
    #[error("catalog response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    /// The API reported errors instead of data.
    #[error("catalog API error: {0}")]
    Api(String),
    /// Durable storage could not be read.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
