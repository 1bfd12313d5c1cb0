//! Core data model: entries, positions and markers.

pub mod entry;
pub mod marker;
pub mod position;

pub use entry::{AddressField, Entry, EntryId, Form};
pub use marker::{Marker, MarkerMode};
pub use position::{Coordinates, Position, PositionFieldRef};
