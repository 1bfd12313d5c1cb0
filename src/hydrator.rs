//! Batch position hydration.
//!
//! Loading one view page touches `entries x fields` cached positions;
//! fetching them one meta read at a time would be an N+1 round trip per
//! page. [`PositionLookup`] front-loads all of them in a single bulk
//! fetch and serves the rest of the request from memory.
//!
//! The lookup table is request-scoped by construction: it is a plain
//! owned value, deliberately not a shared singleton, and is not
//! thread-safe. Correctness only requires that priming completes before
//! markers are built, not any particular call order.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::Result;
use crate::models::{Coordinates, Entry, EntryId, PositionFieldRef};
use crate::store::EntryStore;

/// Request-scoped table of hydrated position values
#[derive(Debug, Default)]
pub struct PositionLookup {
    /// entry id -> (meta key or field id -> raw value)
    table: HashMap<EntryId, HashMap<String, String>>,
    primed: HashSet<EntryId>,
}

impl PositionLookup {
    /// Create an empty lookup
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hydrate cached positions for `entries` x `fields`.
    ///
    /// Meta-backed field refs contribute their two meta keys to one bulk
    /// fetch; coordinate pairs are copied straight off the entries.
    /// Entries already primed are skipped, so overlapping calls stay
    /// idempotent and cheap.
    pub fn prime_cache(
        &mut self,
        store: &dyn EntryStore,
        entries: &[Entry],
        fields: &[PositionFieldRef],
    ) -> Result<()> {
        let mut meta_keys: Vec<String> = Vec::new();
        let mut direct_ids: Vec<String> = Vec::new();
        for field in fields {
            match field.meta_keys() {
                Some((lat_key, long_key)) => {
                    meta_keys.push(lat_key);
                    meta_keys.push(long_key);
                }
                None => direct_ids.extend(field.field_ids()),
            }
        }

        let outstanding: Vec<&Entry> = entries
            .iter()
            .filter(|entry| !self.primed.contains(&entry.id))
            .collect();
        if outstanding.is_empty() {
            debug!("Position lookup already primed for all {} entries", entries.len());
            return Ok(());
        }

        for entry in &outstanding {
            let values = self.table.entry(entry.id).or_default();
            for field_id in &direct_ids {
                if let Some(value) = entry.string_value(field_id) {
                    values.insert(field_id.clone(), value);
                }
            }
        }

        if !meta_keys.is_empty() {
            let entry_ids: Vec<EntryId> = outstanding.iter().map(|entry| entry.id).collect();
            let rows = store.bulk_meta(&entry_ids, &meta_keys)?;
            debug!(
                "Primed position lookup for {} entries ({} cached rows)",
                entry_ids.len(),
                rows.len()
            );
            for row in rows {
                self.table
                    .entry(row.entry_id)
                    .or_default()
                    .insert(row.meta_key, row.value);
            }
        }

        for entry in outstanding {
            self.primed.insert(entry.id);
        }
        Ok(())
    }

    /// Whether an entry went through priming
    #[must_use]
    pub fn is_primed(&self, entry_id: EntryId) -> bool {
        self.primed.contains(&entry_id)
    }

    /// Raw hydrated value for one key
    #[must_use]
    pub fn value(&self, entry_id: EntryId, key: &str) -> Option<&str> {
        self.table.get(&entry_id)?.get(key).map(String::as_str)
    }

    /// Hydrated coordinates for one position source, if both components
    /// parsed
    #[must_use]
    pub fn coordinates(&self, entry_id: EntryId, field: &PositionFieldRef) -> Option<Coordinates> {
        let (lat_key, long_key) = match field.meta_keys() {
            Some(keys) => keys,
            None => {
                let ids = field.field_ids();
                (ids.first()?.clone(), ids.get(1)?.clone())
            }
        };
        let latitude: f64 = self.value(entry_id, &lat_key)?.trim().parse().ok()?;
        let longitude: f64 = self.value(entry_id, &long_key)?.trim().parse().ok()?;
        Some(Coordinates::new(latitude, longitude))
    }
}
