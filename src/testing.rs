//! In-memory stand-in for the remote store, for tests and demos.

use crate::{
    Error, Result,
    commands::{GetRevisionsCommand, RevisionsQuery, RevisionsResult},
    constants::{METADATA_CHANGE_VECTOR, METADATA_ID, METADATA_KEY},
    executor::RequestExecutor,
};
use serde_json::{Map as JsonMap, Value};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

#[derive(Default)]
pub struct InMemoryExecutor {
    // newest revision first, keyed by lowercased id
    revisions: Mutex<HashMap<String, Vec<JsonMap<String, Value>>>>,
    requests: Mutex<Vec<(String, GetRevisionsCommand)>>,
    fail_next: Mutex<Option<String>>,
}

impl InMemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a new revision. The document must carry `@metadata.@id`.
    pub fn add_revision(&self, document: Value) -> Result<()> {
        let Value::Object(document) = document else {
            return Err(Error::precondition("revision must be a JSON object"));
        };
        let id = document
            .get(METADATA_KEY)
            .and_then(|m| m.get(METADATA_ID))
            .and_then(Value::as_str)
            .ok_or_else(|| Error::precondition("revision is missing @metadata.@id"))?
            .to_lowercase();
        let mut revisions = self.revisions.lock().unwrap_or_else(PoisonError::into_inner);
        revisions.entry(id).or_default().insert(0, document);
        Ok(())
    }

    /// The next request fails with a transport error carrying `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.fail_next.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.into());
    }

    /// Every request received so far, with the database it targeted.
    pub fn requests(&self) -> Vec<(String, GetRevisionsCommand)> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn find_by_change_vector(&self, change_vector: &str) -> Option<JsonMap<String, Value>> {
        if change_vector.is_empty() {
            return None;
        }
        let revisions = self.revisions.lock().unwrap_or_else(PoisonError::into_inner);
        revisions
            .values()
            .flatten()
            .find(|doc| {
                doc.get(METADATA_KEY)
                    .and_then(|m| m.get(METADATA_CHANGE_VECTOR))
                    .and_then(Value::as_str)
                    == Some(change_vector)
            })
            .cloned()
    }
}

impl RequestExecutor for InMemoryExecutor {
    fn get_revisions(
        &self,
        database: &str,
        command: &GetRevisionsCommand,
    ) -> Result<RevisionsResult> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((database.to_string(), command.clone()));
        let failure = self.fail_next.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(message) = failure {
            return Err(Error::Transport(message));
        }

        let slots: Vec<Option<JsonMap<String, Value>>> = match command.query() {
            RevisionsQuery::Range {
                id,
                start,
                page_size,
            } => {
                let revisions = self.revisions.lock().unwrap_or_else(PoisonError::into_inner);
                revisions
                    .get(&id.to_lowercase())
                    .map(|docs| {
                        docs.iter()
                            .skip(*start)
                            .take(*page_size)
                            .cloned()
                            .map(Some)
                            .collect()
                    })
                    .unwrap_or_default()
            }
            RevisionsQuery::ChangeVectors(cvs) => cvs
                .iter()
                .map(|cv| self.find_by_change_vector(cv))
                .collect(),
        };

        let slots = if command.metadata_only() {
            slots
                .into_iter()
                .map(|slot| {
                    slot.map(|doc| {
                        doc.into_iter()
                            .filter(|(key, _)| key == METADATA_KEY)
                            .collect()
                    })
                })
                .collect()
        } else {
            slots
        };
        Ok(RevisionsResult::new(slots))
    }
}
