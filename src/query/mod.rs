//! Query-condition model and geospatial filters.
//!
//! The record store's search engine evaluates a tree of AND/OR nodes
//! over column-reference leaves. This module owns the tree type, the
//! placeholder-splicing mechanism and the two geospatial condition
//! kinds (radius, bounding box) that compile into it.

pub mod condition;
pub mod geo;

pub use condition::{ColumnFilter, Condition, Operator};
pub use geo::{
    BoundsParams, GeoFilter, GeoQueryParams, PositionJoin, Unit, apply_geo_filter, km_to_miles,
    miles_to_km,
};

/// Tag of the placeholder leaf geospatial predicates are spliced into
pub const GEOLOCATION_TAG: &str = "geolocation";
