//! Durable position cache.
//!
//! Resolved coordinates and failure sentinels live in the record store's
//! own entry meta, so the cache is shared across requests and processes.
//! A cached failure short-circuits future geocoding for the same
//! address; cache entries otherwise live forever and are only dropped by
//! [`PositionCache::flush_cache`] when the underlying address changes.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::Result;
use crate::geocoding::GeocodeError;
use crate::models::{Coordinates, Entry, EntryId, Form, Position, PositionFieldRef};
use crate::store::EntryStore;

/// Per-(entry, field) position cache over entry meta
pub struct PositionCache {
    store: Arc<dyn EntryStore>,
}

impl PositionCache {
    /// Create a cache over the given store
    #[must_use]
    pub fn new(store: Arc<dyn EntryStore>) -> Self {
        Self { store }
    }

    /// Full cached state for one `(entry, field)` pair.
    ///
    /// Fields without meta backing (coordinate pairs) are always
    /// `NotAttempted`.
    pub fn lookup(&self, entry_id: EntryId, field: &PositionFieldRef) -> Result<Position> {
        let Some((lat_key, long_key)) = field.meta_keys() else {
            return Ok(Position::NotAttempted);
        };

        let lat = self.store.get_meta(entry_id, &lat_key)?;
        let long = self.store.get_meta(entry_id, &long_key)?;

        if let (Some(lat), Some(long)) = (lat, long) {
            match (lat.parse::<f64>(), long.parse::<f64>()) {
                (Ok(latitude), Ok(longitude)) => {
                    debug!("Position cache hit for entry {entry_id} field {}", field.field_key());
                    return Ok(Position::Resolved(Coordinates::new(latitude, longitude)));
                }
                _ => {
                    warn!(
                        "Unparseable cached position for entry {entry_id} field {}: '{lat}' / '{long}'",
                        field.field_key()
                    );
                    return Ok(Position::NotAttempted);
                }
            }
        }

        if let Some(error) = self.get_error(entry_id, field)? {
            return Ok(Position::Failed(error));
        }

        debug!("Position cache miss for entry {entry_id} field {}", field.field_key());
        Ok(Position::NotAttempted)
    }

    /// Cached coordinates, or `None` when never resolved
    pub fn get_position(&self, entry_id: EntryId, field: &PositionFieldRef) -> Result<Option<Coordinates>> {
        Ok(self.lookup(entry_id, field)?.coordinates())
    }

    /// Cached failure string, or `None`
    pub fn get_error(&self, entry_id: EntryId, field: &PositionFieldRef) -> Result<Option<String>> {
        match field.error_key() {
            Some(error_key) => self.store.get_meta(entry_id, &error_key),
            None => Ok(None),
        }
    }

    /// Cache resolved coordinates.
    ///
    /// Refuses (with a warning, not an error) to store a pair missing
    /// either component; a half-result would poison every later lookup.
    /// A successful write clears any cached failure.
    pub fn set_position(
        &self,
        entry_id: EntryId,
        field: &PositionFieldRef,
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<()> {
        let Some((lat_key, long_key)) = field.meta_keys() else {
            return Ok(());
        };

        let (Some(latitude), Some(longitude)) = (latitude, longitude) else {
            warn!(
                "Refusing to cache incomplete position for entry {entry_id} field {}: lat={latitude:?} long={longitude:?}",
                field.field_key()
            );
            return Ok(());
        };
        if !latitude.is_finite() || !longitude.is_finite() {
            warn!(
                "Refusing to cache non-finite position for entry {entry_id} field {}",
                field.field_key()
            );
            return Ok(());
        }

        self.store.set_meta(entry_id, &lat_key, &latitude.to_string())?;
        self.store.set_meta(entry_id, &long_key, &longitude.to_string())?;
        if let Some(error_key) = field.error_key() {
            self.store.delete_meta(entry_id, &error_key)?;
        }
        debug!(
            "Cached position ({latitude}, {longitude}) for entry {entry_id} field {}",
            field.field_key()
        );
        Ok(())
    }

    /// Cache a geocoding failure and append an audit note.
    ///
    /// The stored sentinel keeps providers from being queried again for
    /// an address that permanently fails. Clears any cached coordinates.
    pub fn set_error(
        &self,
        entry_id: EntryId,
        field: &PositionFieldRef,
        error: &GeocodeError,
    ) -> Result<()> {
        let Some(error_key) = field.error_key() else {
            return Ok(());
        };

        if let Some((lat_key, long_key)) = field.meta_keys() {
            self.store.delete_meta(entry_id, &lat_key)?;
            self.store.delete_meta(entry_id, &long_key)?;
        }

        let stored = error.cache_string();
        self.store.set_meta(entry_id, &error_key, &stored)?;
        self.store.add_note(
            entry_id,
            &format!(
                "{} Geocoding failed for field {}: {stored}",
                Utc::now().format("[%Y-%m-%d %H:%M:%S UTC]"),
                field.field_key()
            ),
        )?;
        debug!("Cached geocoding failure for entry {entry_id} field {}: {stored}", field.field_key());
        Ok(())
    }

    /// Drop both the coordinates and the failure sentinel
    pub fn delete_position(&self, entry_id: EntryId, field: &PositionFieldRef) -> Result<()> {
        if let Some((lat_key, long_key)) = field.meta_keys() {
            self.store.delete_meta(entry_id, &lat_key)?;
            self.store.delete_meta(entry_id, &long_key)?;
        }
        if let Some(error_key) = field.error_key() {
            self.store.delete_meta(entry_id, &error_key)?;
        }
        Ok(())
    }

    /// Invalidate cached positions after an entry edit.
    ///
    /// For every address field on the form (including each sub-input of
    /// a composite field), the exported value before and after the edit
    /// is compared; a change deletes that field's cached position. This
    /// is the only invalidation path.
    pub fn flush_cache(&self, form: &Form, entry: &Entry, original_entry: &Entry) -> Result<()> {
        for address_field in &form.address_fields {
            let changed = address_field
                .watched_ids()
                .iter()
                .any(|field_id| entry.export_value(field_id) != original_entry.export_value(field_id));

            if changed {
                debug!(
                    "Address field {} changed on entry {}; flushing cached position",
                    address_field.id, entry.id
                );
                self.delete_position(entry.id, &PositionFieldRef::address(&address_field.id))?;
            }
        }
        Ok(())
    }
}
