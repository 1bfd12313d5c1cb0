//! Entry and form models.
//!
//! Entries are form submissions owned by the external record store; this
//! crate only reads their field values and writes position meta.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Stable entry identifier assigned by the record store
pub type EntryId = u64;

/// One form submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Record-store entry id
    pub id: EntryId,
    /// Owning form id
    pub form_id: u64,
    /// Field values keyed by field id (composite sub-inputs use dotted
    /// ids such as `"1.3"`)
    pub values: HashMap<String, Value>,
}

impl Entry {
    /// Create an entry from `(field_id, value)` pairs
    #[must_use]
    pub fn new(id: EntryId, form_id: u64, values: Vec<(&str, Value)>) -> Self {
        Self {
            id,
            form_id,
            values: values
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        }
    }

    /// Raw field value
    #[must_use]
    pub fn value(&self, field_id: &str) -> Option<&Value> {
        self.values.get(field_id)
    }

    /// Field value as a display string; `None` for missing, null or
    /// structured values
    #[must_use]
    pub fn string_value(&self, field_id: &str) -> Option<String> {
        match self.values.get(field_id) {
            Some(Value::String(text)) => Some(text.clone()),
            Some(Value::Number(number)) => Some(number.to_string()),
            _ => None,
        }
    }

    /// Field value as a number; numeric strings are accepted because the
    /// record store keeps everything stringly typed
    #[must_use]
    pub fn numeric_value(&self, field_id: &str) -> Option<f64> {
        match self.values.get(field_id) {
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Normalized exported value used for change detection across edits.
    /// Missing fields export as `Null` so a removed value still compares
    /// unequal to its previous export.
    #[must_use]
    pub fn export_value(&self, field_id: &str) -> Value {
        self.values.get(field_id).cloned().unwrap_or(Value::Null)
    }
}

/// Address field definition on a form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressField {
    /// Field id
    pub id: String,
    /// Composite sub-input ids in display order (empty for a plain
    /// single-input address field)
    pub inputs: Vec<String>,
    /// Configured default sub-values (e.g. default state/country) keyed
    /// by sub-input id; stripped from geocoding input unless the caller
    /// opts in to keep them
    pub default_values: HashMap<String, String>,
}

impl AddressField {
    /// Plain address field without sub-inputs
    #[must_use]
    pub fn simple(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            inputs: Vec::new(),
            default_values: HashMap::new(),
        }
    }

    /// Composite address field with sub-inputs
    #[must_use]
    pub fn composite(id: impl Into<String>, inputs: Vec<&str>) -> Self {
        Self {
            id: id.into(),
            inputs: inputs.into_iter().map(String::from).collect(),
            default_values: HashMap::new(),
        }
    }

    /// Set a configured default for one sub-input
    #[must_use]
    pub fn with_default(mut self, input_id: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_values.insert(input_id.into(), value.into());
        self
    }

    /// All field ids whose edit invalidates this field's cached
    /// position: the field itself plus every sub-input.
    #[must_use]
    pub fn watched_ids(&self) -> Vec<&str> {
        let mut ids = vec![self.id.as_str()];
        ids.extend(self.inputs.iter().map(String::as_str));
        ids
    }

    /// Build the single-line address string for geocoding.
    ///
    /// Sub-values matching a configured default are stripped unless
    /// `keep_defaults` is set; the remainder is joined into one line.
    /// Returns an empty string when nothing is filled in.
    #[must_use]
    pub fn export_address(&self, entry: &Entry, keep_defaults: bool) -> String {
        let input_ids: Vec<&str> = if self.inputs.is_empty() {
            vec![self.id.as_str()]
        } else {
            self.inputs.iter().map(String::as_str).collect()
        };

        let mut parts = Vec::new();
        for input_id in input_ids {
            let Some(value) = entry.string_value(input_id) else {
                continue;
            };
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            if !keep_defaults && self.default_values.get(input_id) == Some(&value) {
                continue;
            }
            parts.push(value);
        }

        crate::geocoding::normalize_address(&parts.join(", "))
    }
}

/// Form definition, limited to what the mapping engine needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    /// Form id
    pub id: u64,
    /// Address fields on the form
    pub address_fields: Vec<AddressField>,
}

impl Form {
    /// Create a form definition
    #[must_use]
    pub fn new(id: u64, address_fields: Vec<AddressField>) -> Self {
        Self { id, address_fields }
    }

    /// Look up an address field by id
    #[must_use]
    pub fn address_field(&self, field_id: &str) -> Option<&AddressField> {
        self.address_fields
            .iter()
            .find(|field| field.id == field_id)
    }
}
