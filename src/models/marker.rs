//! Marker model: the validated, positioned map entity for one
//! entry/field pair.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{Coordinates, EntryId, PositionFieldRef};

/// How a marker's position was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerMode {
    /// Resolved from a free-text address via geocoding
    Address,
    /// Read from coordinate columns on the entry
    Coordinates,
}

/// One map marker.
///
/// Construction is terminal: a marker is built once from an entry and a
/// position source and is never mutated back to an unresolved state.
/// Invalid markers (no position, or a null-island position) are kept
/// only long enough for the collection to drop them.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    /// Position-resolution mode
    pub mode: MarkerMode,
    /// Owning entry
    pub entry_id: EntryId,
    /// Position source this marker was built from
    pub field_ref: PositionFieldRef,
    /// Resolved coordinates, if any
    pub position: Option<Coordinates>,
    /// Map icon URL
    pub icon: Option<String>,
    /// Link to the owning entry
    pub entry_url: Option<String>,
    /// Rendered popup content
    pub popup_html: Option<String>,
}

impl Marker {
    /// Create a marker
    #[must_use]
    pub fn new(
        mode: MarkerMode,
        entry_id: EntryId,
        field_ref: PositionFieldRef,
        position: Option<Coordinates>,
    ) -> Self {
        Self {
            mode,
            entry_id,
            field_ref,
            position,
            icon: None,
            entry_url: None,
            popup_html: None,
        }
    }

    /// Set the map icon
    #[must_use]
    pub fn with_icon(mut self, icon: Option<String>) -> Self {
        self.icon = icon;
        self
    }

    /// Set the entry link
    #[must_use]
    pub fn with_entry_url(mut self, entry_url: Option<String>) -> Self {
        self.entry_url = entry_url;
        self
    }

    /// Set the popup content
    #[must_use]
    pub fn with_popup_html(mut self, popup_html: Option<String>) -> Self {
        self.popup_html = popup_html;
        self
    }

    /// Unique key within one collection: entry id plus the position
    /// source's field key. At most one marker exists per entry per
    /// position source.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.entry_id, self.field_ref.field_key())
    }

    /// Whether this marker can be plotted.
    ///
    /// Requires an entry id, a position with both components present,
    /// and neither component zero: `(0, 0)` and the zero meridian/
    /// equator decay values are treated as "no location".
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.entry_id == 0 {
            return false;
        }
        match self.position {
            Some(coordinates) => !coordinates.is_null_island(),
            None => false,
        }
    }

    /// Serialize for the map client.
    ///
    /// `lat`/`long` are omitted entirely when the marker has no
    /// position; the client checks key presence, not nullness.
    #[must_use]
    pub fn to_client_json(&self) -> Value {
        let mut payload = json!({
            "mode": self.mode,
            "entry_id": self.entry_id,
            "position_field_ids": self.field_ref.field_ids(),
            "icon": self.icon,
            "url": self.entry_url,
            "content": self.popup_html,
        });
        if let Some(coordinates) = self.position {
            payload["lat"] = json!(coordinates.latitude);
            payload["long"] = json!(coordinates.longitude);
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn marker_at(position: Option<Coordinates>) -> Marker {
        Marker::new(
            MarkerMode::Address,
            101,
            PositionFieldRef::address("1"),
            position,
        )
    }

    #[rstest]
    #[case(Some(Coordinates::new(37.3318, -122.0312)), true)]
    #[case(Some(Coordinates::new(0.0, 0.0)), false)]
    #[case(Some(Coordinates::new(0.0, -122.0312)), false)]
    #[case(Some(Coordinates::new(37.3318, 0.0)), false)]
    #[case(None, false)]
    fn test_null_island_invariant(#[case] position: Option<Coordinates>, #[case] valid: bool) {
        assert_eq!(marker_at(position).is_valid(), valid);
    }

    #[test]
    fn test_missing_entry_id_is_invalid() {
        let marker = Marker::new(
            MarkerMode::Coordinates,
            0,
            PositionFieldRef::coordinate_pair("3", "4"),
            Some(Coordinates::new(47.0, 8.0)),
        );
        assert!(!marker.is_valid());
    }

    #[test]
    fn test_marker_key_includes_field_key() {
        let marker = Marker::new(
            MarkerMode::Coordinates,
            42,
            PositionFieldRef::coordinate_pair("3", "4"),
            None,
        );
        assert_eq!(marker.key(), "42:3_4");
    }

    #[test]
    fn test_client_json_omits_missing_coordinates() {
        let payload = marker_at(None).to_client_json();
        assert!(payload.get("lat").is_none());
        assert!(payload.get("long").is_none());
        assert_eq!(payload["entry_id"], 101);
    }

    #[test]
    fn test_client_json_includes_coordinates() {
        let payload = marker_at(Some(Coordinates::new(37.3318, -122.0312))).to_client_json();
        assert_eq!(payload["lat"], 37.3318);
        assert_eq!(payload["long"], -122.0312);
        assert_eq!(payload["mode"], "address");
        assert_eq!(payload["position_field_ids"][0], "1");
    }
}
