use crate::{
    Error, Result,
    commands::{GetRevisionsCommand, RevisionsResult},
    constants::{METADATA_CHANGE_VECTOR, METADATA_ID, METADATA_KEY},
    extension::SessionExtension,
    identity::Entity,
    lazy::Lazy,
    metadata::MetadataView,
    metrics,
};
use serde::de::DeserializeOwned;
use serde_json::{Map as JsonMap, Value};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::Ordering;
use tracing::instrument;

/// Factory type for lazies bound to a session; they never leave its thread.
pub type SessionFactory<V> = Box<dyn FnOnce() -> Result<V>>;

/// Fetches revisions of a document and turns them into tracked entities.
///
/// Built against a session, it produces a [`GetRevisionsCommand`] for the
/// transport, receives the raw response through
/// [`attach_result`](Self::attach_result) and materializes on demand. Every
/// non-null revision is registered in the session's identity map; null slots
/// come back as `None` and are never tracked.
pub struct GetRevisionOperation {
    session: SessionExtension,
    command: GetRevisionsCommand,
    result: Option<RevisionsResult>,
}

impl GetRevisionOperation {
    /// Paged history of one document, newest first.
    pub fn range(
        session: &SessionExtension,
        id: &str,
        start: usize,
        page_size: usize,
        metadata_only: bool,
    ) -> Result<Self> {
        session.ensure_open()?;
        if id.is_empty() {
            return Err(Error::precondition("id cannot be empty"));
        }
        if page_size == 0 {
            return Err(Error::precondition("page size must be positive"));
        }
        let max = session.conventions().max_revisions_page_size;
        if page_size > max {
            return Err(Error::precondition(format!(
                "page size {page_size} exceeds the maximum of {max}"
            )));
        }
        Ok(Self::with_command(
            session,
            GetRevisionsCommand::range(id, start, page_size, metadata_only),
        ))
    }

    pub fn for_change_vector(session: &SessionExtension, change_vector: &str) -> Result<Self> {
        if change_vector.is_empty() {
            return Err(Error::precondition("change vector cannot be empty"));
        }
        Self::for_change_vectors(session, vec![change_vector.to_string()])
    }

    /// Empty strings are allowed as placeholders; their slots are skipped by
    /// [`materialize_by_change_vector`](Self::materialize_by_change_vector).
    pub fn for_change_vectors(
        session: &SessionExtension,
        change_vectors: Vec<String>,
    ) -> Result<Self> {
        session.ensure_open()?;
        if change_vectors.is_empty() {
            return Err(Error::precondition("at least one change vector is required"));
        }
        Ok(Self::with_command(
            session,
            GetRevisionsCommand::change_vectors(change_vectors, false),
        ))
    }

    fn with_command(session: &SessionExtension, command: GetRevisionsCommand) -> Self {
        Self {
            session: session.clone(),
            command,
            result: None,
        }
    }

    pub fn build_request(&self) -> Result<&GetRevisionsCommand> {
        self.session.ensure_open()?;
        Ok(&self.command)
    }

    pub fn attach_result(&mut self, result: RevisionsResult) {
        self.result = Some(result);
    }

    pub fn result(&self) -> Option<&RevisionsResult> {
        self.result.as_ref()
    }

    /// Routes the request through the session's executor and attaches the response.
    pub fn execute(&mut self) -> Result<()> {
        let result = {
            let command = self.build_request()?;
            self.session
                .request_executor()
                .get_revisions(&self.session.session_info().database, command)?
        };
        self.attach_result(result);
        Ok(())
    }

    /// Slot 0, or `None` when nothing is attached or the slot is null.
    pub fn materialize_one<T: DeserializeOwned + 'static>(&self) -> Result<Option<Entity<T>>> {
        let Some(document) = self.slots().first() else {
            return Ok(None);
        };
        let converted = self.convert(0, document.as_ref())?;
        Ok(self.track(vec![converted])?.pop().flatten())
    }

    /// One output per slot, in response order. Nothing is tracked unless
    /// every slot converts.
    pub fn materialize_all<T: DeserializeOwned + 'static>(&self) -> Result<Vec<Option<Entity<T>>>> {
        let converted = self
            .slots()
            .iter()
            .enumerate()
            .map(|(slot, document)| self.convert(slot, document.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        self.track(converted)
    }

    /// Metadata of every slot; nothing is converted or tracked.
    pub fn materialize_all_metadata_only(&self) -> Vec<MetadataView> {
        self.slots()
            .iter()
            .map(|document| {
                document
                    .as_ref()
                    .map(MetadataView::from_document)
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Keyed by the requested change vector. Empty requested change vectors
    /// are skipped without touching their slot.
    pub fn materialize_by_change_vector<T: DeserializeOwned + 'static>(
        &self,
    ) -> Result<HashMap<String, Option<Entity<T>>>> {
        let slots = self.slots();
        let mut change_vectors = Vec::new();
        let mut converted = Vec::new();
        for (slot, change_vector) in self.command.requested_change_vectors().iter().enumerate() {
            if change_vector.is_empty() {
                continue;
            }
            let document = slots.get(slot).and_then(Option::as_ref);
            converted.push(self.convert(slot, document)?);
            change_vectors.push(change_vector.clone());
        }
        let entities = self.track(converted)?;
        Ok(change_vectors.into_iter().zip(entities).collect())
    }

    fn slots(&self) -> &[Option<JsonMap<String, Value>>] {
        self.result.as_ref().map(RevisionsResult::results).unwrap_or(&[])
    }

    fn convert<T: DeserializeOwned>(
        &self,
        slot: usize,
        document: Option<&JsonMap<String, Value>>,
    ) -> Result<Option<Converted<T>>> {
        let Some(document) = document else {
            metrics::metrics()
                .revisions_null_slots_total
                .fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        };

        let metadata = match document.get(METADATA_KEY) {
            Some(Value::Object(metadata)) => Some(metadata.clone()),
            _ => None,
        };
        let id = metadata
            .as_ref()
            .and_then(|m| m.get(METADATA_ID))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let change_vector = metadata
            .as_ref()
            .and_then(|m| m.get(METADATA_CHANGE_VECTOR))
            .and_then(Value::as_str)
            .map(str::to_string);

        let entity: T = self
            .session
            .entity_to_json()
            .convert_to_entity(&id, document)
            .map_err(|source| Error::Conversion {
                slot,
                id: id.clone(),
                source: Box::new(source),
            })?;
        Ok(Some(Converted {
            entity: Rc::new(RefCell::new(entity)),
            id,
            change_vector,
            document: document.clone(),
            metadata,
        }))
    }

    /// Registers every converted slot in one pass over the identity map.
    fn track<T: 'static>(
        &self,
        converted: Vec<Option<Converted<T>>>,
    ) -> Result<Vec<Option<Entity<T>>>> {
        let entities = self.session.with_identity_map_mut(|map| {
            converted
                .into_iter()
                .map(|slot| {
                    let Some(c) = slot else {
                        return Ok(None);
                    };
                    map.register_tracked(&c.entity, c.id, c.change_vector, c.document, c.metadata)?;
                    Ok(Some(c.entity))
                })
                .collect::<Result<Vec<_>>>()
        })??;

        let tracked = entities.iter().flatten().count() as u64;
        metrics::metrics()
            .revisions_materialized_total
            .fetch_add(tracked, Ordering::Relaxed);
        Ok(entities)
    }
}

struct Converted<T> {
    entity: Entity<T>,
    id: String,
    change_vector: Option<String>,
    document: JsonMap<String, Value>,
    metadata: Option<JsonMap<String, Value>>,
}

/// Revision lookups that fetch immediately.
pub struct RevisionsSession {
    base: SessionExtension,
}

impl RevisionsSession {
    pub(crate) fn new(base: SessionExtension) -> Self {
        Self { base }
    }

    #[instrument(skip(self), fields(database = %self.base.session_info().database))]
    pub fn get_for<T: DeserializeOwned + 'static>(
        &self,
        id: &str,
        start: usize,
        page_size: usize,
    ) -> Result<Vec<Option<Entity<T>>>> {
        let mut op = GetRevisionOperation::range(&self.base, id, start, page_size, false)?;
        op.execute()?;
        op.materialize_all()
    }

    #[instrument(skip(self), fields(database = %self.base.session_info().database))]
    pub fn get_metadata_for(
        &self,
        id: &str,
        start: usize,
        page_size: usize,
    ) -> Result<Vec<MetadataView>> {
        let mut op = GetRevisionOperation::range(&self.base, id, start, page_size, true)?;
        op.execute()?;
        Ok(op.materialize_all_metadata_only())
    }

    #[instrument(skip(self), fields(database = %self.base.session_info().database))]
    pub fn get<T: DeserializeOwned + 'static>(
        &self,
        change_vector: &str,
    ) -> Result<Option<Entity<T>>> {
        let mut op = GetRevisionOperation::for_change_vector(&self.base, change_vector)?;
        op.execute()?;
        op.materialize_one()
    }

    #[instrument(skip_all, fields(database = %self.base.session_info().database))]
    pub fn get_many<T, I, S>(&self, change_vectors: I) -> Result<HashMap<String, Option<Entity<T>>>>
    where
        T: DeserializeOwned + 'static,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let change_vectors = change_vectors.into_iter().map(Into::into).collect();
        let mut op = GetRevisionOperation::for_change_vectors(&self.base, change_vectors)?;
        op.execute()?;
        op.materialize_by_change_vector()
    }

    pub fn lazily(&self) -> LazyRevisions {
        LazyRevisions {
            base: self.base.clone(),
        }
    }
}

/// Revision lookups deferred until the returned [`Lazy`] is evaluated.
///
/// Argument checks happen here, eagerly; the fetch itself runs at most once.
pub struct LazyRevisions {
    base: SessionExtension,
}

impl LazyRevisions {
    pub fn get_for<T: DeserializeOwned + 'static>(
        &self,
        id: &str,
        start: usize,
        page_size: usize,
    ) -> Result<Lazy<Vec<Option<Entity<T>>>, SessionFactory<Vec<Option<Entity<T>>>>>> {
        let mut op = GetRevisionOperation::range(&self.base, id, start, page_size, false)?;
        let factory: SessionFactory<_> = Box::new(move || {
            op.execute()?;
            op.materialize_all::<T>()
        });
        Ok(Lazy::new(factory))
    }

    pub fn get_metadata_for(
        &self,
        id: &str,
        start: usize,
        page_size: usize,
    ) -> Result<Lazy<Vec<MetadataView>, SessionFactory<Vec<MetadataView>>>> {
        let mut op = GetRevisionOperation::range(&self.base, id, start, page_size, true)?;
        let factory: SessionFactory<_> = Box::new(move || {
            op.execute()?;
            Ok(op.materialize_all_metadata_only())
        });
        Ok(Lazy::new(factory))
    }

    pub fn get<T: DeserializeOwned + 'static>(
        &self,
        change_vector: &str,
    ) -> Result<Lazy<Option<Entity<T>>, SessionFactory<Option<Entity<T>>>>> {
        let mut op = GetRevisionOperation::for_change_vector(&self.base, change_vector)?;
        let factory: SessionFactory<_> = Box::new(move || {
            op.execute()?;
            op.materialize_one::<T>()
        });
        Ok(Lazy::new(factory))
    }
}
