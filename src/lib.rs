//! Geospatial mapping engine for form entries.
//!
//! `entrymap` turns stored form entries into map markers: it resolves
//! entry addresses to coordinates through a prioritized geocoding
//! provider chain, caches resolved (and permanently failing) positions
//! in entry metadata, batch-hydrates those positions for a whole view in
//! one round trip, and compiles radius/bounding-box filters into the
//! record store's query-condition tree.
//!
//! The high-level flow for rendering one map view:
//!
//! 1. [`query::apply_geo_filter`] narrows the entry query when the
//!    client sent a geospatial filter.
//! 2. [`hydrator::PositionLookup::prime_cache`] bulk-fetches cached
//!    positions for the resulting page of entries.
//! 3. [`markers::MarkerData::process_view`] builds one marker per entry
//!    and position source, geocoding (and caching) addresses the cache
//!    does not know yet.

pub mod cache;
pub mod config;
pub mod error;
pub mod geocoding;
pub mod hydrator;
pub mod markers;
pub mod models;
pub mod query;
pub mod store;

pub use cache::PositionCache;
pub use config::{EntryMapConfig, GeocodingConfig, LoggingConfig, StoreConfig, init_tracing};
pub use error::EntryMapError;
pub use geocoding::{GeocodeError, GeocodingProvider, ProviderChain};
pub use hydrator::PositionLookup;
pub use markers::{MarkerData, ViewConfig};
pub use models::{Coordinates, Entry, EntryId, Marker, Position, PositionFieldRef};
pub use store::{EntryStore, FjallMetaStore, MemoryEntryStore};

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, EntryMapError>;

/// Crate version, reported in the default HTTP user agent
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
