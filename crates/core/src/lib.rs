#![warn(clippy::all, missing_docs)]

//! Core logic for the Tarkov shopping list.
//!
//! This crate hosts the catalog models, configuration handling, the
//! TTL-bounded catalog cache, price resolution, the persisted selection and
//! its ordering, used by the terminal UI and any future frontends.

pub mod app;
pub mod catalog;
pub mod config;
pub mod models;
pub mod pricing;
pub mod selection;
pub mod sort;
pub mod storage;

pub use app::{AddOutcome, ListController, ListRow, LoadSummary, SearchHit};
pub use catalog::{CacheStatus, CatalogCache, CatalogSource, FetchError, GraphqlClient};
pub use config::AppConfig;
pub use models::{CatalogResponse, Currency, Item, Offer, Vendor};
pub use pricing::{describe_offer, format_price, ExchangeRates, NO_PRICE_DATA};
pub use selection::{Selection, SelectionStore};
pub use sort::{SortKey, SortPreference};
pub use storage::{FileStore, KeyValueStore, MemoryStore};
