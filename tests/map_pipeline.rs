//! End-to-end pipeline tests: durable store, provider chain with a
//! scripted HTTP boundary, batch hydration, marker building and
//! geospatial query splicing working together.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use entrymap::geocoding::{GeocodeError, HttpFetch, HttpResponse, ProviderChain};
use entrymap::markers::{MarkerData, ViewConfig};
use entrymap::models::{AddressField, Coordinates, Entry, Form};
use entrymap::query::{
    Condition, GEOLOCATION_TAG, GeoQueryParams, Operator, apply_geo_filter,
};
use entrymap::store::{EntryStore, FjallMetaStore, MemoryEntryStore, MetaRow};
use entrymap::{EntryId, GeocodingConfig, Result};

/// Serves canned bodies keyed by a URL substring and counts every call.
struct ScriptedFetch {
    calls: AtomicUsize,
    responses: Vec<(&'static str, &'static str)>,
}

impl ScriptedFetch {
    fn new(responses: Vec<(&'static str, &'static str)>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            responses,
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpFetch for ScriptedFetch {
    async fn get(&self, url: &str) -> std::result::Result<HttpResponse, GeocodeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let body = self
            .responses
            .iter()
            .find(|(needle, _)| url.contains(needle))
            .map_or("{}", |(_, body)| body);
        Ok(HttpResponse {
            status: 200,
            body: body.to_string(),
        })
    }
}

const CUPERTINO_RESPONSE: &str =
    r#"{"results": [{"name": "Cupertino", "latitude": 37.3318, "longitude": -122.0312}]}"#;
const NO_RESULTS_RESPONSE: &str = r#"{"results": []}"#;
const NOMINATIM_EMPTY: &str = "[]";

fn address_view() -> (ViewConfig, Form) {
    let view = ViewConfig {
        view_id: 10,
        form_id: 1,
        address_fields: vec!["2".to_string()],
        entry_url_base: Some("https://example.test/entry".to_string()),
        ..ViewConfig::default()
    };
    let form = Form::new(1, vec![AddressField::simple("2")]);
    (view, form)
}

#[tokio::test]
async fn geocoded_view_persists_positions_across_requests() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FjallMetaStore::open(temp_dir.path()).unwrap());
    store
        .put_entry(&Entry::new(
            7,
            1,
            vec![("2", json!("1 Infinite Loop, Cupertino, CA"))],
        ))
        .unwrap();

    let fetch = Arc::new(ScriptedFetch::new(vec![(
        "geocoding-api.open-meteo.com",
        CUPERTINO_RESPONSE,
    )]));
    let chain = ProviderChain::from_config(
        &GeocodingConfig::default(),
        Arc::clone(&fetch) as Arc<dyn HttpFetch>,
    );

    let (view, form) = address_view();
    let mut data = MarkerData::new(view, form, Arc::clone(&store) as Arc<dyn EntryStore>, chain);
    data.process_view().await.unwrap();

    assert_eq!(data.len(), 1);
    let marker = data.markers()[0];
    assert_eq!(marker.position, Some(Coordinates::new(37.3318, -122.0312)));
    assert_eq!(marker.entry_url.as_deref(), Some("https://example.test/entry/7"));
    assert_eq!(fetch.call_count(), 1);

    let payload = data.to_client_json();
    assert_eq!(payload[0]["lat"], 37.3318);
    assert_eq!(payload[0]["long"], -122.0312);

    // the resolved position survived into the durable store
    assert_eq!(store.get_meta(7, "lat_2").unwrap().as_deref(), Some("37.3318"));
    assert_eq!(store.get_meta(7, "long_2").unwrap().as_deref(), Some("-122.0312"));

    // a second request over the same store never reaches the network
    let fetch = Arc::new(ScriptedFetch::new(vec![]));
    let chain = ProviderChain::from_config(
        &GeocodingConfig::default(),
        Arc::clone(&fetch) as Arc<dyn HttpFetch>,
    );
    let (view, form) = address_view();
    let mut data = MarkerData::new(view, form, Arc::clone(&store) as Arc<dyn EntryStore>, chain);
    data.process_view().await.unwrap();

    assert_eq!(data.len(), 1);
    assert_eq!(fetch.call_count(), 0);
}

#[tokio::test]
async fn permanently_failing_address_is_never_retried() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FjallMetaStore::open(temp_dir.path()).unwrap());
    store
        .put_entry(&Entry::new(7, 1, vec![("2", json!("asdfjkl unresolvable"))]))
        .unwrap();

    // every provider in the chain comes back empty
    let fetch = Arc::new(ScriptedFetch::new(vec![
        ("geocoding-api.open-meteo.com", NO_RESULTS_RESPONSE),
        ("nominatim.openstreetmap.org", NOMINATIM_EMPTY),
    ]));
    let chain = ProviderChain::from_config(
        &GeocodingConfig::default(),
        Arc::clone(&fetch) as Arc<dyn HttpFetch>,
    );
    let (view, form) = address_view();
    let mut data = MarkerData::new(view, form, Arc::clone(&store) as Arc<dyn EntryStore>, chain);
    data.process_view().await.unwrap();

    assert!(data.is_empty());
    let first_pass_calls = fetch.call_count();
    assert!(first_pass_calls >= 1);

    // the failure was cached with its error code, and audited
    let cached_error = store.get_meta(7, "error_2").unwrap().unwrap();
    assert!(cached_error.contains("no_results"));
    assert!(!store.notes(7).unwrap().is_empty());

    // second pass: the cached failure short-circuits before any provider
    let fetch = Arc::new(ScriptedFetch::new(vec![]));
    let chain = ProviderChain::from_config(
        &GeocodingConfig::default(),
        Arc::clone(&fetch) as Arc<dyn HttpFetch>,
    );
    let (view, form) = address_view();
    let mut data = MarkerData::new(view, form, Arc::clone(&store) as Arc<dyn EntryStore>, chain);
    data.process_view().await.unwrap();

    assert!(data.is_empty());
    assert_eq!(fetch.call_count(), 0);
}

/// Delegating store that counts bulk fetches.
struct CountingStore {
    inner: MemoryEntryStore,
    bulk_calls: AtomicUsize,
}

impl EntryStore for CountingStore {
    fn bulk_meta(&self, entry_ids: &[EntryId], meta_keys: &[String]) -> Result<Vec<MetaRow>> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.bulk_meta(entry_ids, meta_keys)
    }

    fn get_meta(&self, entry_id: EntryId, meta_key: &str) -> Result<Option<String>> {
        self.inner.get_meta(entry_id, meta_key)
    }

    fn set_meta(&self, entry_id: EntryId, meta_key: &str, value: &str) -> Result<()> {
        self.inner.set_meta(entry_id, meta_key, value)
    }

    fn delete_meta(&self, entry_id: EntryId, meta_key: &str) -> Result<()> {
        self.inner.delete_meta(entry_id, meta_key)
    }

    fn add_note(&self, entry_id: EntryId, note: &str) -> Result<()> {
        self.inner.add_note(entry_id, note)
    }

    fn notes(&self, entry_id: EntryId) -> Result<Vec<String>> {
        self.inner.notes(entry_id)
    }

    fn entry(&self, entry_id: EntryId) -> Result<Option<Entry>> {
        self.inner.entry(entry_id)
    }

    fn view_entries(&self, form_id: u64) -> Result<Vec<Entry>> {
        self.inner.view_entries(form_id)
    }
}

#[tokio::test]
async fn whole_view_hydrates_in_one_bulk_fetch() {
    let store = CountingStore {
        inner: MemoryEntryStore::new(),
        bulk_calls: AtomicUsize::new(0),
    };
    for entry_id in 1..=25u64 {
        store
            .inner
            .put_entry(&Entry::new(entry_id, 1, vec![("2", json!("somewhere"))]));
        store
            .set_meta(entry_id, "lat_2", &format!("{}", 40.0 + entry_id as f64 * 0.01))
            .unwrap();
        store.set_meta(entry_id, "long_2", "8.0").unwrap();
    }
    let store = Arc::new(store);

    let fetch = Arc::new(ScriptedFetch::new(vec![]));
    let chain = ProviderChain::from_config(
        &GeocodingConfig::default(),
        Arc::clone(&fetch) as Arc<dyn HttpFetch>,
    );
    let (view, form) = address_view();
    let mut data = MarkerData::new(view, form, Arc::clone(&store) as Arc<dyn EntryStore>, chain);
    data.process_view().await.unwrap();

    assert_eq!(data.len(), 25);
    assert_eq!(store.bulk_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fetch.call_count(), 0);
}

#[test]
fn radius_params_compile_and_splice_into_query() {
    let params = GeoQueryParams {
        lat: Some("37.33".to_string()),
        long: Some("-122.03".to_string()),
        radius: Some("10".to_string()),
        unit: Some("mi".to_string()),
        bounds: None,
    };
    let filter = params.to_filter().unwrap();

    let tree = Condition::And(vec![
        Condition::column("form_id", Operator::Eq, "1"),
        Condition::placeholder(GEOLOCATION_TAG),
    ]);
    let view = ViewConfig {
        view_id: 10,
        form_id: 1,
        address_fields: vec!["2".to_string()],
        ..ViewConfig::default()
    };
    let (spliced, joins) = apply_geo_filter(&tree, Some(&filter), &view.position_fields());

    assert!(!spliced.contains_tag(GEOLOCATION_TAG));
    assert_eq!(joins.len(), 1);
    assert_eq!(joins[0].lat_key, "lat_2");

    let sql = spliced.to_sql();
    assert!(sql.contains("`form_id` = '1'"));
    assert!(sql.contains("ACOS"));
    // 10 miles, normalized to kilometers
    assert!(sql.contains("BETWEEN 0 AND 16.09344"));

    // the in-memory predicate agrees with the compiled one
    assert!(filter.matches(Coordinates::new(37.3318, -122.0312)));
    assert!(!filter.matches(Coordinates::new(48.0, 8.0)));
}

#[test]
fn all_zero_bounds_leave_the_query_unfiltered() {
    let params = GeoQueryParams {
        bounds: Some(Default::default()),
        ..GeoQueryParams::default()
    };
    assert!(params.to_filter().is_none());

    let tree = Condition::And(vec![
        Condition::column("form_id", Operator::Eq, "1"),
        Condition::placeholder(GEOLOCATION_TAG),
    ]);
    let view = ViewConfig {
        view_id: 10,
        form_id: 1,
        address_fields: vec!["2".to_string()],
        ..ViewConfig::default()
    };
    let (spliced, joins) = apply_geo_filter(&tree, None, &view.position_fields());

    assert!(joins.is_empty());
    assert_eq!(
        spliced,
        Condition::And(vec![
            Condition::column("form_id", Operator::Eq, "1"),
            Condition::True,
        ])
    );
    // the placeholder decayed to TRUE instead of excluding every row
    assert_eq!(spliced.to_sql(), "(`form_id` = '1' AND TRUE)");
}
