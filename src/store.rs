//! Record-store access.
//!
//! The record store that owns entries is an external collaborator; this
//! crate consumes it through the narrow [`EntryStore`] trait (bulk meta
//! reads, single meta read/write/delete, entry notes and view entries).
//! Two implementations are provided: a durable fjall-backed store and an
//! in-memory store for tests and embedding.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use fjall::Keyspace;
use tracing::debug;

use crate::models::{Entry, EntryId};
use crate::{EntryMapError, Result};

/// One row of a bulk meta fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRow {
    pub entry_id: EntryId,
    pub meta_key: String,
    pub value: String,
}

/// The record-store surface the mapping engine consumes.
///
/// Meta values are strings, matching a string-typed meta table; entry
/// field values are structured (`serde_json::Value`).
pub trait EntryStore: Send + Sync {
    /// Bulk meta read: one row per `(entry, key)` pair that exists.
    /// Pairs with no stored value are simply absent from the result.
    fn bulk_meta(&self, entry_ids: &[EntryId], meta_keys: &[String]) -> Result<Vec<MetaRow>>;

    /// Single meta read
    fn get_meta(&self, entry_id: EntryId, meta_key: &str) -> Result<Option<String>>;

    /// Single meta write (upsert)
    fn set_meta(&self, entry_id: EntryId, meta_key: &str, value: &str) -> Result<()>;

    /// Single meta delete; deleting a missing key is a no-op
    fn delete_meta(&self, entry_id: EntryId, meta_key: &str) -> Result<()>;

    /// Append an audit note against an entry
    fn add_note(&self, entry_id: EntryId, note: &str) -> Result<()>;

    /// Audit notes for an entry, oldest first
    fn notes(&self, entry_id: EntryId) -> Result<Vec<String>>;

    /// Fetch a single entry
    fn entry(&self, entry_id: EntryId) -> Result<Option<Entry>>;

    /// All entries belonging to a form, in stable id order
    fn view_entries(&self, form_id: u64) -> Result<Vec<Entry>>;
}

fn store_err(err: impl std::fmt::Display) -> EntryMapError {
    EntryMapError::store(err.to_string())
}

/// Durable store backed by a fjall keyspace with postcard-encoded
/// structured values.
pub struct FjallMetaStore {
    meta: Keyspace,
    entries: Keyspace,
    note_log: Keyspace,
}

impl FjallMetaStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let db = fjall::Database::builder(&path)
            .open()
            .map_err(store_err)?;
        let meta = db
            .keyspace("meta", fjall::KeyspaceCreateOptions::default)
            .map_err(store_err)?;
        let entries = db
            .keyspace("entries", fjall::KeyspaceCreateOptions::default)
            .map_err(store_err)?;
        let note_log = db
            .keyspace("notes", fjall::KeyspaceCreateOptions::default)
            .map_err(store_err)?;
        Ok(Self {
            meta,
            entries,
            note_log,
        })
    }

    fn meta_key(entry_id: EntryId, meta_key: &str) -> Vec<u8> {
        format!("{entry_id}:{meta_key}").into_bytes()
    }

    fn entry_key(entry_id: EntryId) -> Vec<u8> {
        format!("entry_{entry_id}").into_bytes()
    }

    fn form_key(form_id: u64) -> Vec<u8> {
        format!("form_{form_id}").into_bytes()
    }

    fn note_key(entry_id: EntryId) -> Vec<u8> {
        format!("notes_{entry_id}").into_bytes()
    }

    fn form_entry_ids(&self, form_id: u64) -> Result<Vec<EntryId>> {
        match self.entries.get(Self::form_key(form_id)).map_err(store_err)? {
            Some(bytes) => postcard::from_bytes(&bytes.to_vec()).map_err(store_err),
            None => Ok(Vec::new()),
        }
    }

    /// Insert or replace an entry, keeping the per-form index current
    pub fn put_entry(&self, entry: &Entry) -> Result<()> {
        let bytes = postcard::to_stdvec(entry).map_err(store_err)?;
        self.entries
            .insert(Self::entry_key(entry.id), bytes)
            .map_err(store_err)?;

        let mut ids = self.form_entry_ids(entry.form_id)?;
        if !ids.contains(&entry.id) {
            ids.push(entry.id);
            ids.sort_unstable();
            let index = postcard::to_stdvec(&ids).map_err(store_err)?;
            self.entries
                .insert(Self::form_key(entry.form_id), index)
                .map_err(store_err)?;
        }
        Ok(())
    }
}

impl EntryStore for FjallMetaStore {
    fn bulk_meta(&self, entry_ids: &[EntryId], meta_keys: &[String]) -> Result<Vec<MetaRow>> {
        let mut rows = Vec::new();
        for &entry_id in entry_ids {
            for meta_key in meta_keys {
                if let Some(value) = self.get_meta(entry_id, meta_key)? {
                    rows.push(MetaRow {
                        entry_id,
                        meta_key: meta_key.clone(),
                        value,
                    });
                }
            }
        }
        debug!(
            "Bulk meta fetch: {} entries x {} keys -> {} rows",
            entry_ids.len(),
            meta_keys.len(),
            rows.len()
        );
        Ok(rows)
    }

    fn get_meta(&self, entry_id: EntryId, meta_key: &str) -> Result<Option<String>> {
        match self
            .meta
            .get(Self::meta_key(entry_id, meta_key))
            .map_err(store_err)?
        {
            Some(bytes) => {
                let value = String::from_utf8(bytes.to_vec()).map_err(store_err)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set_meta(&self, entry_id: EntryId, meta_key: &str, value: &str) -> Result<()> {
        self.meta
            .insert(Self::meta_key(entry_id, meta_key), value.as_bytes().to_vec())
            .map_err(store_err)
    }

    fn delete_meta(&self, entry_id: EntryId, meta_key: &str) -> Result<()> {
        self.meta
            .remove(Self::meta_key(entry_id, meta_key))
            .map_err(store_err)
    }

    fn add_note(&self, entry_id: EntryId, note: &str) -> Result<()> {
        let mut notes = self.notes(entry_id)?;
        notes.push(note.to_string());
        let bytes = postcard::to_stdvec(&notes).map_err(store_err)?;
        self.note_log
            .insert(Self::note_key(entry_id), bytes)
            .map_err(store_err)
    }

    fn notes(&self, entry_id: EntryId) -> Result<Vec<String>> {
        match self.note_log.get(Self::note_key(entry_id)).map_err(store_err)? {
            Some(bytes) => postcard::from_bytes(&bytes.to_vec()).map_err(store_err),
            None => Ok(Vec::new()),
        }
    }

    fn entry(&self, entry_id: EntryId) -> Result<Option<Entry>> {
        match self
            .entries
            .get(Self::entry_key(entry_id))
            .map_err(store_err)?
        {
            Some(bytes) => {
                let entry = postcard::from_bytes(&bytes.to_vec()).map_err(store_err)?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    fn view_entries(&self, form_id: u64) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for entry_id in self.form_entry_ids(form_id)? {
            if let Some(entry) = self.entry(entry_id)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }
}

#[derive(Default)]
struct MemoryInner {
    meta: HashMap<(EntryId, String), String>,
    entries: HashMap<EntryId, Entry>,
    notes: HashMap<EntryId, Vec<String>>,
}

/// In-memory store for tests and single-process embedding
#[derive(Default)]
pub struct MemoryEntryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryEntryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry
    pub fn put_entry(&self, entry: &Entry) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.entries.insert(entry.id, entry.clone());
    }
}

impl EntryStore for MemoryEntryStore {
    fn bulk_meta(&self, entry_ids: &[EntryId], meta_keys: &[String]) -> Result<Vec<MetaRow>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows = Vec::new();
        for &entry_id in entry_ids {
            for meta_key in meta_keys {
                if let Some(value) = inner.meta.get(&(entry_id, meta_key.clone())) {
                    rows.push(MetaRow {
                        entry_id,
                        meta_key: meta_key.clone(),
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(rows)
    }

    fn get_meta(&self, entry_id: EntryId, meta_key: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.meta.get(&(entry_id, meta_key.to_string())).cloned())
    }

    fn set_meta(&self, entry_id: EntryId, meta_key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner
            .meta
            .insert((entry_id, meta_key.to_string()), value.to_string());
        Ok(())
    }

    fn delete_meta(&self, entry_id: EntryId, meta_key: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.meta.remove(&(entry_id, meta_key.to_string()));
        Ok(())
    }

    fn add_note(&self, entry_id: EntryId, note: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.notes.entry(entry_id).or_default().push(note.to_string());
        Ok(())
    }

    fn notes(&self, entry_id: EntryId) -> Result<Vec<String>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.notes.get(&entry_id).cloned().unwrap_or_default())
    }

    fn entry(&self, entry_id: EntryId) -> Result<Option<Entry>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.entries.get(&entry_id).cloned())
    }

    fn view_entries(&self, form_id: u64) -> Result<Vec<Entry>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<Entry> = inner
            .entries
            .values()
            .filter(|entry| entry.form_id == form_id)
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.id);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_entry(id: EntryId) -> Entry {
        Entry::new(id, 1, vec![("1", json!("somewhere"))])
    }

    #[test]
    fn test_memory_meta_roundtrip() {
        let store = MemoryEntryStore::new();
        store.set_meta(7, "lat_1", "47.3769").unwrap();
        assert_eq!(store.get_meta(7, "lat_1").unwrap().as_deref(), Some("47.3769"));

        store.delete_meta(7, "lat_1").unwrap();
        assert_eq!(store.get_meta(7, "lat_1").unwrap(), None);
        // deleting again is a no-op
        store.delete_meta(7, "lat_1").unwrap();
    }

    #[test]
    fn test_memory_bulk_meta_skips_missing_pairs() {
        let store = MemoryEntryStore::new();
        store.set_meta(1, "lat_1", "10.0").unwrap();
        store.set_meta(2, "long_1", "20.0").unwrap();

        let rows = store
            .bulk_meta(&[1, 2, 3], &["lat_1".to_string(), "long_1".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().any(|r| r.entry_id == 1 && r.meta_key == "lat_1"));
        assert!(rows.iter().any(|r| r.entry_id == 2 && r.meta_key == "long_1"));
    }

    #[test]
    fn test_memory_view_entries_sorted() {
        let store = MemoryEntryStore::new();
        store.put_entry(&sample_entry(3));
        store.put_entry(&sample_entry(1));
        store.put_entry(&Entry::new(9, 2, vec![]));

        let entries = store.view_entries(1).unwrap();
        assert_eq!(entries.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_fjall_meta_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallMetaStore::open(temp_dir.path()).unwrap();

        store.set_meta(42, "lat_5", "37.3318").unwrap();
        store.set_meta(42, "long_5", "-122.0312").unwrap();
        assert_eq!(
            store.get_meta(42, "lat_5").unwrap().as_deref(),
            Some("37.3318")
        );

        let rows = store
            .bulk_meta(&[42], &["lat_5".to_string(), "long_5".to_string()])
            .unwrap();
        assert_eq!(rows.len(), 2);

        store.delete_meta(42, "lat_5").unwrap();
        assert_eq!(store.get_meta(42, "lat_5").unwrap(), None);
    }

    #[test]
    fn test_fjall_entries_and_notes() {
        let temp_dir = TempDir::new().unwrap();
        let store = FjallMetaStore::open(temp_dir.path()).unwrap();

        store.put_entry(&sample_entry(2)).unwrap();
        store.put_entry(&sample_entry(1)).unwrap();
        store.put_entry(&sample_entry(1)).unwrap(); // replace, no index dupe

        let entries = store.view_entries(1).unwrap();
        assert_eq!(entries.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);
        assert!(store.entry(99).unwrap().is_none());

        store.add_note(1, "first note").unwrap();
        store.add_note(1, "second note").unwrap();
        assert_eq!(store.notes(1).unwrap(), vec!["first note", "second note"]);
    }
}
