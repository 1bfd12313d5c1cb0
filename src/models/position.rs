//! Position model: coordinates, cached position state and the
//! position-field reference union.

use serde::{Deserialize, Serialize};

/// Geographic coordinates in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in decimal degrees
    pub latitude: f64,
    /// Longitude in decimal degrees
    pub longitude: f64,
}

impl Coordinates {
    /// Create new coordinates
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Whether this pair is (or touches) "null island".
    ///
    /// A zero latitude or longitude is never a real location in this
    /// system; it is what an unset coordinate column decays to.
    #[must_use]
    pub fn is_null_island(&self) -> bool {
        self.latitude == 0.0 || self.longitude == 0.0
    }

    /// Format coordinates for display and cache keys
    #[must_use]
    pub fn format_coordinates(&self) -> String {
        format!("{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// Cached position state for one `(entry, field)` pair.
///
/// `Resolved` and `Failed` are mutually exclusive in the cache;
/// `NotAttempted` means no geocoding has ever been tried.
#[derive(Debug, Clone, PartialEq)]
pub enum Position {
    /// Coordinates were resolved and cached
    Resolved(Coordinates),
    /// A previous geocoding attempt failed; the error string is cached
    /// so providers are never re-queried for the same address
    Failed(String),
    /// Never attempted
    NotAttempted,
}

impl Position {
    /// Resolved coordinates, if any
    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            Position::Resolved(coordinates) => Some(*coordinates),
            _ => None,
        }
    }
}

/// Where an entry's coordinates come from.
///
/// Closed union over the three supported position sources. Only the
/// meta-backed variants participate in caching; a coordinate pair is
/// read straight off the entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PositionFieldRef {
    /// Free-text address field, resolved via geocoding and cached under
    /// `lat_{field_id}` / `long_{field_id}` meta keys
    Address { field_id: String },
    /// Two numeric fields holding latitude and longitude directly
    CoordinatePair {
        lat_field_id: String,
        long_field_id: String,
    },
    /// Third-party geolocation integration with its own meta-key naming;
    /// read-only passthrough, already persisted by the integration
    ExternalGeolocation { field_id: String },
}

impl PositionFieldRef {
    /// Address-field reference
    #[must_use]
    pub fn address(field_id: impl Into<String>) -> Self {
        Self::Address {
            field_id: field_id.into(),
        }
    }

    /// Coordinate-pair reference
    #[must_use]
    pub fn coordinate_pair(lat_field_id: impl Into<String>, long_field_id: impl Into<String>) -> Self {
        Self::CoordinatePair {
            lat_field_id: lat_field_id.into(),
            long_field_id: long_field_id.into(),
        }
    }

    /// External-geolocation reference
    #[must_use]
    pub fn external(field_id: impl Into<String>) -> Self {
        Self::ExternalGeolocation {
            field_id: field_id.into(),
        }
    }

    /// Meta keys `(lat_key, long_key)` holding this field's coordinates,
    /// or `None` when the values are read directly from the entry.
    #[must_use]
    pub fn meta_keys(&self) -> Option<(String, String)> {
        match self {
            Self::Address { field_id } => {
                Some((format!("lat_{field_id}"), format!("long_{field_id}")))
            }
            Self::CoordinatePair { .. } => None,
            Self::ExternalGeolocation { field_id } => Some((
                format!("geolocation_lat_{field_id}"),
                format!("geolocation_long_{field_id}"),
            )),
        }
    }

    /// Meta key holding the cached failure sentinel. Only address fields
    /// cache failures; the other variants never geocode.
    #[must_use]
    pub fn error_key(&self) -> Option<String> {
        match self {
            Self::Address { field_id } => Some(format!("error_{field_id}")),
            _ => None,
        }
    }

    /// Stable key identifying this position source within one entry.
    /// Used for marker keys and join aliases.
    #[must_use]
    pub fn field_key(&self) -> String {
        match self {
            Self::Address { field_id } | Self::ExternalGeolocation { field_id } => field_id.clone(),
            Self::CoordinatePair {
                lat_field_id,
                long_field_id,
            } => format!("{lat_field_id}_{long_field_id}"),
        }
    }

    /// Field ids contributing to this position source, in lat/long order
    /// where that applies.
    #[must_use]
    pub fn field_ids(&self) -> Vec<String> {
        match self {
            Self::Address { field_id } | Self::ExternalGeolocation { field_id } => {
                vec![field_id.clone()]
            }
            Self::CoordinatePair {
                lat_field_id,
                long_field_id,
            } => vec![lat_field_id.clone(), long_field_id.clone()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0.0, true)]
    #[case(0.0, -122.0312, true)]
    #[case(37.3318, 0.0, true)]
    #[case(37.3318, -122.0312, false)]
    fn test_null_island(#[case] lat: f64, #[case] long: f64, #[case] expected: bool) {
        assert_eq!(Coordinates::new(lat, long).is_null_island(), expected);
    }

    #[test]
    fn test_address_meta_keys() {
        let field = PositionFieldRef::address("5");
        assert_eq!(
            field.meta_keys(),
            Some(("lat_5".to_string(), "long_5".to_string()))
        );
        assert_eq!(field.error_key(), Some("error_5".to_string()));
        assert_eq!(field.field_key(), "5");
    }

    #[test]
    fn test_coordinate_pair_has_no_meta_keys() {
        let field = PositionFieldRef::coordinate_pair("3", "4");
        assert_eq!(field.meta_keys(), None);
        assert_eq!(field.error_key(), None);
        assert_eq!(field.field_key(), "3_4");
        assert_eq!(field.field_ids(), vec!["3".to_string(), "4".to_string()]);
    }

    #[test]
    fn test_external_meta_keys() {
        let field = PositionFieldRef::external("7");
        assert_eq!(
            field.meta_keys(),
            Some((
                "geolocation_lat_7".to_string(),
                "geolocation_long_7".to_string()
            ))
        );
        assert_eq!(field.error_key(), None);
    }
}
