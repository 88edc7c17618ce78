use crate::{Result, constants::METADATA_KEY, conventions::Conventions};
use serde::de::DeserializeOwned;
use serde_json::{Map as JsonMap, Value};

/// Converts raw documents into typed entities with serde.
#[derive(Clone, Debug, Default)]
pub struct EntityToJson {
    identity_property: Option<String>,
}

impl EntityToJson {
    pub fn new(conventions: &Conventions) -> Self {
        Self {
            identity_property: conventions.identity_property.clone(),
        }
    }

    /// The `@metadata` key is stripped before deserialising. When an identity
    /// property is configured and the document leaves it unset, `id` is
    /// written into it.
    pub fn convert_to_entity<T: DeserializeOwned>(
        &self,
        id: &str,
        document: &JsonMap<String, Value>,
    ) -> Result<T> {
        let mut body = document.clone();
        body.remove(METADATA_KEY);
        if let Some(property) = &self.identity_property
            && !id.is_empty()
            && body.get(property).is_none_or(Value::is_null)
        {
            body.insert(property.clone(), Value::String(id.to_string()));
        }
        Ok(serde_json::from_value(Value::Object(body))?)
    }
}
