//! Geospatial query conditions.
//!
//! Radius and bounding-box filters compile into predicate fragments over
//! one or more position sources and splice themselves into an upstream
//! condition tree by replacing the `geolocation` placeholder leaf.
//! Degenerate input (zero radius, null-island bounds, no configured
//! position fields) always degrades to "no filter requested".

use std::collections::HashSet;

use haversine::{Location as HaversineLocation, Units, distance};
use serde::Deserialize;
use tracing::debug;

use super::GEOLOCATION_TAG;
use super::condition::Condition;
use crate::models::{Coordinates, PositionFieldRef};

/// Kilometers per statute mile
pub const KM_PER_MILE: f64 = 1.609344;

/// Convert miles to kilometers
#[must_use]
pub fn miles_to_km(miles: f64) -> f64 {
    miles * KM_PER_MILE
}

/// Convert kilometers to miles
#[must_use]
pub fn km_to_miles(km: f64) -> f64 {
    km / KM_PER_MILE
}

/// Distance unit accepted from the query string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    Km,
    Mi,
}

impl Unit {
    /// Parse the `unit` query parameter; anything but `mi` means
    /// kilometers
    #[must_use]
    pub fn from_param(param: Option<&str>) -> Self {
        match param {
            Some("mi") => Unit::Mi,
            _ => Unit::Km,
        }
    }

    /// Normalize a magnitude in this unit to kilometers
    #[must_use]
    pub fn to_km(self, magnitude: f64) -> f64 {
        match self {
            Unit::Km => magnitude,
            Unit::Mi => miles_to_km(magnitude),
        }
    }
}

/// Join against the position-cache store required by a compiled
/// predicate, one per meta-backed position field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionJoin {
    /// Join alias, derived from the field key
    pub alias: String,
    /// Meta key providing the alias's `lat` column
    pub lat_key: String,
    /// Meta key providing the alias's `long` column
    pub long_key: String,
}

/// Registers one join alias per field id, deduplicating repeats
struct JoinRegistry {
    joins: Vec<PositionJoin>,
    seen: HashSet<String>,
}

impl JoinRegistry {
    fn new() -> Self {
        Self {
            joins: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Column references `(lat, long)` for one position source,
    /// registering its join when meta-backed
    fn columns_for(&mut self, field: &PositionFieldRef) -> (String, String) {
        match field.meta_keys() {
            Some((lat_key, long_key)) => {
                let alias = format!("geo_{}", field.field_key().replace('.', "_"));
                if self.seen.insert(alias.clone()) {
                    self.joins.push(PositionJoin {
                        alias: alias.clone(),
                        lat_key,
                        long_key,
                    });
                }
                (format!("`{alias}`.`lat`"), format!("`{alias}`.`long`"))
            }
            None => {
                let field_ids = field.field_ids();
                (
                    format!("`{}`", field_ids[0]),
                    format!("`{}`", field_ids[1]),
                )
            }
        }
    }
}

/// One geospatial filter
#[derive(Debug, Clone, PartialEq)]
pub enum GeoFilter {
    /// All positions within `radius_km` of a center point
    Radius {
        latitude: f64,
        longitude: f64,
        radius_km: f64,
    },
    /// All positions inside an inclusive bounding box
    Bounds {
        max_lat: f64,
        min_lat: f64,
        max_lng: f64,
        min_lng: f64,
    },
}

impl GeoFilter {
    /// Radius filter; the magnitude is normalized to kilometers
    #[must_use]
    pub fn radius(latitude: f64, longitude: f64, magnitude: f64, unit: Unit) -> Self {
        Self::Radius {
            latitude,
            longitude,
            radius_km: unit.to_km(magnitude),
        }
    }

    /// Bounding-box filter
    #[must_use]
    pub fn bounds(max_lat: f64, min_lat: f64, max_lng: f64, min_lng: f64) -> Self {
        Self::Bounds {
            max_lat,
            min_lat,
            max_lng,
            min_lng,
        }
    }

    /// Whether this filter is degenerate and must not be applied: a
    /// non-positive radius, or a bounding box with every corner at zero
    /// (the null-island box a map client emits before it has a viewport)
    #[must_use]
    pub fn is_noop(&self) -> bool {
        match self {
            GeoFilter::Radius { radius_km, .. } => !radius_km.is_finite() || *radius_km <= 0.0,
            GeoFilter::Bounds {
                max_lat,
                min_lat,
                max_lng,
                min_lng,
            } => *max_lat == 0.0 && *min_lat == 0.0 && *max_lng == 0.0 && *min_lng == 0.0,
        }
    }

    /// Evaluate the filter against resolved coordinates; the same
    /// predicate the compiled SQL expresses
    #[must_use]
    pub fn matches(&self, coordinates: Coordinates) -> bool {
        match self {
            GeoFilter::Radius {
                latitude,
                longitude,
                radius_km,
            } => {
                let center = HaversineLocation {
                    latitude: *latitude,
                    longitude: *longitude,
                };
                let point = HaversineLocation {
                    latitude: coordinates.latitude,
                    longitude: coordinates.longitude,
                };
                distance(center, point, Units::Kilometers) <= *radius_km
            }
            GeoFilter::Bounds {
                max_lat,
                min_lat,
                max_lng,
                min_lng,
            } => {
                (*min_lat..=*max_lat).contains(&coordinates.latitude)
                    && (*min_lng..=*max_lng).contains(&coordinates.longitude)
            }
        }
    }

    /// Compile to a predicate over the given position sources plus the
    /// joins it needs.
    ///
    /// Sub-predicates combine with OR: an entry matches when any of its
    /// position sources satisfies the filter. Returns `None` for a
    /// degenerate filter or an empty field list ("nothing to filter").
    #[must_use]
    pub fn compile(&self, fields: &[PositionFieldRef]) -> Option<(Condition, Vec<PositionJoin>)> {
        if self.is_noop() {
            debug!("Degenerate geospatial filter; not applied");
            return None;
        }
        if fields.is_empty() {
            debug!("No position fields configured; geospatial filter not applied");
            return None;
        }

        let mut registry = JoinRegistry::new();
        let sub_predicates: Vec<Condition> = fields
            .iter()
            .map(|field| {
                let (lat_col, long_col) = registry.columns_for(field);
                Condition::Expr(self.predicate_sql(&lat_col, &long_col))
            })
            .collect();

        Some((Condition::or(sub_predicates), registry.joins))
    }

    /// Predicate fragment for one `(lat, long)` column pair
    fn predicate_sql(&self, lat_col: &str, long_col: &str) -> String {
        match self {
            GeoFilter::Radius {
                latitude,
                longitude,
                radius_km,
            } => format!(
                "6371 * ACOS(COS(RADIANS({latitude})) * COS(RADIANS({lat_col})) * \
                 COS(RADIANS({long_col}) - RADIANS({longitude})) + \
                 SIN(RADIANS({latitude})) * SIN(RADIANS({lat_col}))) BETWEEN 0 AND {radius_km}"
            ),
            GeoFilter::Bounds {
                max_lat,
                min_lat,
                max_lng,
                min_lng,
            } => format!(
                "{lat_col} BETWEEN {min_lat} AND {max_lat} AND \
                 {long_col} BETWEEN {min_lng} AND {max_lng}"
            ),
        }
    }
}

/// Bounding-box query parameters as they arrive from the client
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BoundsParams {
    pub max_lat: Option<String>,
    pub min_lat: Option<String>,
    pub max_lng: Option<String>,
    pub min_lng: Option<String>,
}

/// Geospatial query-string parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeoQueryParams {
    /// Radius center latitude
    pub lat: Option<String>,
    /// Radius center longitude
    pub long: Option<String>,
    /// Radius magnitude
    #[serde(rename = "filter_geolocation")]
    pub radius: Option<String>,
    /// Radius unit (`mi` or `km`)
    pub unit: Option<String>,
    /// Bounding box; wins over radius when present and usable
    pub bounds: Option<BoundsParams>,
}

fn parse_corner(value: Option<&String>) -> f64 {
    value
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(0.0)
}

impl GeoQueryParams {
    /// Interpret the parameters as a filter.
    ///
    /// Malformed or degenerate input (non-numeric values, zero radius,
    /// null-island bounds) means "no filter requested", never an error.
    #[must_use]
    pub fn to_filter(&self) -> Option<GeoFilter> {
        if let Some(bounds) = &self.bounds {
            let filter = GeoFilter::bounds(
                parse_corner(bounds.max_lat.as_ref()),
                parse_corner(bounds.min_lat.as_ref()),
                parse_corner(bounds.max_lng.as_ref()),
                parse_corner(bounds.min_lng.as_ref()),
            );
            if !filter.is_noop() {
                return Some(filter);
            }
        }

        let latitude: f64 = self.lat.as_ref()?.trim().parse().ok()?;
        let longitude: f64 = self.long.as_ref()?.trim().parse().ok()?;
        let magnitude: f64 = self.radius.as_ref()?.trim().parse().ok()?;
        let unit = Unit::from_param(self.unit.as_deref());

        let filter = GeoFilter::radius(latitude, longitude, magnitude, unit);
        if filter.is_noop() { None } else { Some(filter) }
    }
}

/// Splice a geospatial filter into a condition tree.
///
/// Every `geolocation` placeholder leaf is replaced: with the compiled
/// predicate when the filter applies, and with the always-true condition
/// when it does not (an unresolved placeholder would otherwise exclude
/// every record downstream). Returns the rebuilt tree and the joins the
/// predicate needs.
#[must_use]
pub fn apply_geo_filter(
    tree: &Condition,
    filter: Option<&GeoFilter>,
    fields: &[PositionFieldRef],
) -> (Condition, Vec<PositionJoin>) {
    match filter.and_then(|f| f.compile(fields)) {
        Some((condition, joins)) => (tree.replace_condition(GEOLOCATION_TAG, &condition), joins),
        None => (
            tree.replace_condition(GEOLOCATION_TAG, &Condition::True),
            Vec::new(),
        ),
    }
}
