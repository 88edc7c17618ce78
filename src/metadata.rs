use crate::constants::{
    METADATA_CHANGE_VECTOR, METADATA_COLLECTION, METADATA_FLAGS, METADATA_ID, METADATA_KEY,
    METADATA_LAST_MODIFIED,
};
use chrono::{DateTime, Utc};
use serde_json::{Map as JsonMap, Value};

/// Read-only view over a document's `@metadata` sub-document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataView {
    inner: JsonMap<String, Value>,
}

impl MetadataView {
    pub fn new(metadata: JsonMap<String, Value>) -> Self {
        Self { inner: metadata }
    }

    /// Extracts the reserved metadata key of a raw document. Documents without
    /// one, or with a non-object value under it, produce an empty view.
    pub fn from_document(document: &JsonMap<String, Value>) -> Self {
        match document.get(METADATA_KEY) {
            Some(Value::Object(metadata)) => Self::new(metadata.clone()),
            _ => Self::default(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.inner.get(key).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.get_str(METADATA_ID)
    }

    pub fn change_vector(&self) -> Option<&str> {
        self.get_str(METADATA_CHANGE_VECTOR)
    }

    pub fn collection(&self) -> Option<&str> {
        self.get_str(METADATA_COLLECTION)
    }

    /// Comma separated flags, e.g. `"HasRevisions, Revision"`.
    pub fn flags(&self) -> Vec<&str> {
        self.get_str(METADATA_FLAGS)
            .map(|flags| {
                flags
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.get_str(METADATA_LAST_MODIFIED)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn as_map(&self) -> &JsonMap<String, Value> {
        &self.inner
    }
}
