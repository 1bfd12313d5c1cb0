//! Marker collection ("Data") orchestration.
//!
//! One [`MarkerData`] is built per view per request. It wires the store,
//! the position cache, the batch hydrator and the geocoding chain
//! together: prime first, then build every marker from memory, falling
//! back to on-demand geocoding (with cache writes) only for entries that
//! have never been resolved.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::Result;
use crate::cache::PositionCache;
use crate::geocoding::ProviderChain;
use crate::hydrator::PositionLookup;
use crate::models::{Coordinates, Entry, EntryId, Form, Marker, MarkerMode, PositionFieldRef};
use crate::store::EntryStore;

/// Post-construction extension point: may alter a marker or veto it by
/// returning `None`. Vetoed markers are dropped, never retried.
pub type MarkerPostProcessor = Box<dyn Fn(Marker, &Entry) -> Option<Marker> + Send + Sync>;

/// Map configuration for one view
#[derive(Debug, Clone, Default)]
pub struct ViewConfig {
    /// View id (one collection per view per request)
    pub view_id: u64,
    /// Form whose entries are mapped
    pub form_id: u64,
    /// Address fields to geocode (default position mode)
    pub address_fields: Vec<String>,
    /// Explicit lat/long field pair; takes priority over address mode
    /// when configured
    pub coordinate_pair: Option<(String, String)>,
    /// Third-party geolocation field
    pub external_field: Option<String>,
    /// Marker icon URL
    pub icon: Option<String>,
    /// Base URL for entry links
    pub entry_url_base: Option<String>,
    /// Keep configured default sub-values (state/country) in the
    /// geocoded address
    pub keep_default_values: bool,
}

impl ViewConfig {
    /// Position sources configured for this view.
    ///
    /// Coordinate-pair mode wins over address mode when both are
    /// configured; address mode is the default. An empty result means
    /// the view has nothing to map.
    #[must_use]
    pub fn position_fields(&self) -> Vec<PositionFieldRef> {
        if let Some((lat_field_id, long_field_id)) = &self.coordinate_pair {
            return vec![PositionFieldRef::coordinate_pair(lat_field_id, long_field_id)];
        }

        let mut fields: Vec<PositionFieldRef> = self
            .address_fields
            .iter()
            .map(|field_id| PositionFieldRef::address(field_id.as_str()))
            .collect();
        if let Some(field_id) = &self.external_field {
            fields.push(PositionFieldRef::external(field_id));
        }
        fields
    }

    fn entry_url(&self, entry_id: EntryId) -> Option<String> {
        self.entry_url_base
            .as_ref()
            .map(|base| format!("{}/{entry_id}", base.trim_end_matches('/')))
    }
}

/// Per-view marker collection
pub struct MarkerData {
    view: ViewConfig,
    form: Form,
    store: Arc<dyn EntryStore>,
    cache: PositionCache,
    chain: ProviderChain,
    lookup: PositionLookup,
    markers: BTreeMap<String, Marker>,
    post_processors: Vec<MarkerPostProcessor>,
    processed: bool,
}

impl MarkerData {
    /// Create a collection for one view
    #[must_use]
    pub fn new(view: ViewConfig, form: Form, store: Arc<dyn EntryStore>, chain: ProviderChain) -> Self {
        let cache = PositionCache::new(Arc::clone(&store));
        Self {
            view,
            form,
            store,
            cache,
            chain,
            lookup: PositionLookup::new(),
            markers: BTreeMap::new(),
            post_processors: Vec::new(),
            processed: false,
        }
    }

    /// Register a post-processor; processors run in registration order
    #[must_use]
    pub fn with_post_processor(mut self, processor: MarkerPostProcessor) -> Self {
        self.post_processors.push(processor);
        self
    }

    /// The position cache backing this collection
    #[must_use]
    pub fn cache(&self) -> &PositionCache {
        &self.cache
    }

    /// Build all markers for the view.
    ///
    /// Fetches the view's entries, primes the batch hydrator for every
    /// configured position field, then builds one marker per entry per
    /// field. Safe to call more than once; the collection is built only
    /// on the first call.
    pub async fn process_view(&mut self) -> Result<()> {
        if self.processed {
            return Ok(());
        }
        self.processed = true;

        let fields = self.view.position_fields();
        if fields.is_empty() {
            warn!("View {} has no position fields configured; empty marker collection", self.view.view_id);
            return Ok(());
        }

        let entries = self.store.view_entries(self.view.form_id)?;
        debug!(
            "Building markers for view {}: {} entries x {} position fields",
            self.view.view_id,
            entries.len(),
            fields.len()
        );

        // Batch-then-build: all cached positions are hydrated before any
        // marker is constructed.
        self.lookup.prime_cache(self.store.as_ref(), &entries, &fields)?;

        for entry in &entries {
            for field in &fields {
                if let Some(marker) = self.build_marker(entry, field).await? {
                    self.add_marker(marker);
                }
            }
        }
        Ok(())
    }

    /// All markers, in stable key order
    #[must_use]
    pub fn markers(&self) -> Vec<&Marker> {
        self.markers.values().collect()
    }

    /// Number of markers in the collection
    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether the collection is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Serialize every marker for the map client
    #[must_use]
    pub fn to_client_json(&self) -> Vec<Value> {
        self.markers.values().map(Marker::to_client_json).collect()
    }

    /// Markers for one entry.
    ///
    /// Reads from the processed collection; when the collection was
    /// never populated for this entry (single-entry render paths that
    /// bypass the bulk view), the entry is fetched and its markers are
    /// built on demand.
    pub async fn markers_by_entry(&mut self, entry_id: EntryId) -> Result<Vec<Marker>> {
        let found: Vec<Marker> = self
            .markers
            .values()
            .filter(|marker| marker.entry_id == entry_id)
            .cloned()
            .collect();
        if !found.is_empty() || self.lookup.is_primed(entry_id) {
            return Ok(found);
        }

        debug!("Marker collection miss for entry {entry_id}; building on demand");
        let Some(entry) = self.store.entry(entry_id)? else {
            return Ok(Vec::new());
        };

        let mut built = Vec::new();
        for field in self.view.position_fields() {
            if let Some(marker) = self.build_marker(&entry, &field).await? {
                built.push(marker.clone());
                self.add_marker(marker);
            }
        }
        Ok(built)
    }

    /// First-write-wins insertion keyed by entry id + field key
    fn add_marker(&mut self, marker: Marker) {
        let key = marker.key();
        if self.markers.contains_key(&key) {
            debug!("Duplicate marker key {key}; keeping the existing marker");
            return;
        }
        self.markers.insert(key, marker);
    }

    /// Build one marker, run post-processors, and validate. Returns
    /// `None` for vetoed or invalid markers.
    async fn build_marker(&self, entry: &Entry, field: &PositionFieldRef) -> Result<Option<Marker>> {
        let mut marker = match field {
            PositionFieldRef::Address { field_id } => {
                self.from_address_field(entry, field_id, field).await?
            }
            PositionFieldRef::CoordinatePair {
                lat_field_id,
                long_field_id,
            } => Self::from_coordinate_fields(entry, lat_field_id, long_field_id, field),
            PositionFieldRef::ExternalGeolocation { .. } => self.from_external_field(entry, field)?,
        };

        marker = marker
            .with_icon(self.view.icon.clone())
            .with_entry_url(self.view.entry_url(entry.id));

        for processor in &self.post_processors {
            match processor(marker, entry) {
                Some(processed) => marker = processed,
                None => {
                    debug!("Marker for entry {} vetoed by post-processor", entry.id);
                    return Ok(None);
                }
            }
        }

        if marker.is_valid() { Ok(Some(marker)) } else { Ok(None) }
    }

    /// Resolve an address field: cached position, cached failure, or an
    /// on-demand provider call whose outcome is cached either way.
    async fn from_address_field(
        &self,
        entry: &Entry,
        field_id: &str,
        field: &PositionFieldRef,
    ) -> Result<Marker> {
        let address = match self.form.address_field(field_id) {
            Some(address_field) => address_field.export_address(entry, self.view.keep_default_values),
            None => crate::geocoding::normalize_address(
                &entry.string_value(field_id).unwrap_or_default(),
            ),
        };
        if address.is_empty() {
            return Ok(Marker::new(MarkerMode::Address, entry.id, field.clone(), None));
        }

        let cached = self.cached_coordinates(entry.id, field)?;
        let position = match cached {
            Some(coordinates) => Some(coordinates),
            None => {
                if let Some(error) = self.cache.get_error(entry.id, field)? {
                    debug!(
                        "Skipping geocode for entry {} field {field_id}: cached failure ({error})",
                        entry.id
                    );
                    None
                } else {
                    match self.chain.geocode(&address).await {
                        Ok(coordinates) => {
                            self.cache.set_position(
                                entry.id,
                                field,
                                Some(coordinates.latitude),
                                Some(coordinates.longitude),
                            )?;
                            Some(coordinates)
                        }
                        Err(error) => {
                            self.cache.set_error(entry.id, field, &error)?;
                            None
                        }
                    }
                }
            }
        };

        Ok(Marker::new(MarkerMode::Address, entry.id, field.clone(), position))
    }

    /// Read a coordinate pair straight off the entry; no geocoding, no
    /// cache.
    fn from_coordinate_fields(
        entry: &Entry,
        lat_field_id: &str,
        long_field_id: &str,
        field: &PositionFieldRef,
    ) -> Marker {
        let position = match (entry.numeric_value(lat_field_id), entry.numeric_value(long_field_id)) {
            (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
            _ => None,
        };
        Marker::new(MarkerMode::Coordinates, entry.id, field.clone(), position)
    }

    /// Read an externally integrated geolocation pair; passthrough only.
    fn from_external_field(&self, entry: &Entry, field: &PositionFieldRef) -> Result<Marker> {
        let position = self.cached_coordinates(entry.id, field)?;
        Ok(Marker::new(MarkerMode::Coordinates, entry.id, field.clone(), position))
    }

    /// Cached coordinates, from the hydrated lookup when this entry was
    /// primed, otherwise from the cache directly.
    fn cached_coordinates(&self, entry_id: EntryId, field: &PositionFieldRef) -> Result<Option<Coordinates>> {
        if self.lookup.is_primed(entry_id) {
            return Ok(self.lookup.coordinates(entry_id, field));
        }
        self.cache.get_position(entry_id, field)
    }
}
