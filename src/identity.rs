use crate::{Error, Result, metrics};
use serde_json::{Map as JsonMap, Value};
use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::Ordering;

/// A tracked entity. Identity is the allocation, not the content.
pub type Entity<T> = Rc<RefCell<T>>;

/// Identity of a tracked entity, derived from its `Rc` allocation address.
///
/// Only meaningful while something keeps the allocation alive; the identity
/// map holds a clone of every entity it tracks for that reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityKey(usize);

impl EntityKey {
    pub fn of<E: ?Sized>(entity: &Rc<E>) -> Self {
        EntityKey(Rc::as_ptr(entity) as *const () as usize)
    }
}

/// Persisted-document metadata for one tracked entity.
#[derive(Clone, Debug)]
pub struct DocumentInfo {
    id: String,
    change_vector: Option<String>,
    document: JsonMap<String, Value>,
    metadata: Option<JsonMap<String, Value>>,
    entity: Rc<dyn Any>,
}

impl DocumentInfo {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn change_vector(&self) -> Option<&str> {
        self.change_vector.as_deref()
    }

    pub fn document(&self) -> &JsonMap<String, Value> {
        &self.document
    }

    pub fn metadata(&self) -> Option<&JsonMap<String, Value>> {
        self.metadata.as_ref()
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::of(&self.entity)
    }

    /// The tracked entity, if it was registered as an `Entity<T>`.
    pub fn entity<T: 'static>(&self) -> Option<Entity<T>> {
        Rc::clone(&self.entity).downcast::<RefCell<T>>().ok()
    }
}

/// Session-scoped mapping between tracked entities and their documents.
///
/// Keyed by entity identity, with a reverse index from document id to the
/// most recently registered entity for that id. Ids compare
/// case-insensitively. Not synchronised: one session, one writer.
#[derive(Debug, Default)]
pub struct EntityIdentityMap {
    by_entity: HashMap<EntityKey, DocumentInfo>,
    by_id: HashMap<String, EntityKey>,
}

impl EntityIdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or refreshes the record for `entity`.
    ///
    /// A refresh always overwrites the change vector, document and metadata.
    /// Fails with [`Error::IdentityConflict`] when the entity is already
    /// tracked under a different id; the map is left untouched in that case.
    pub fn register_tracked<E: Any>(
        &mut self,
        entity: &Rc<E>,
        id: impl Into<String>,
        change_vector: Option<String>,
        document: JsonMap<String, Value>,
        metadata: Option<JsonMap<String, Value>>,
    ) -> Result<()> {
        let mut id = id.into();
        let key = EntityKey::of(entity);

        if let Some(existing) = self.by_entity.get(&key) {
            if !existing.id.is_empty() && !ids_match(&existing.id, &id) {
                metrics::metrics()
                    .identity_conflicts_total
                    .fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    target: "docsession::identity",
                    tracked = %existing.id,
                    attempted = %id,
                    "identity conflict on re-registration"
                );
                return Err(Error::IdentityConflict {
                    tracked: existing.id.clone(),
                    attempted: id,
                });
            }
            if !existing.id.is_empty() {
                // ids never change once assigned, not even their casing
                id = existing.id.clone();
            }
            tracing::debug!(target: "docsession::identity", %id, "refreshing tracked entity");
        } else {
            tracing::debug!(target: "docsession::identity", %id, "tracking entity");
        }

        if !id.is_empty() {
            self.by_id.insert(normalize(&id), key);
        }
        let entity: Rc<dyn Any> = Rc::clone(entity) as Rc<dyn Any>;
        self.by_entity.insert(
            key,
            DocumentInfo {
                id,
                change_vector,
                document,
                metadata,
                entity,
            },
        );
        Ok(())
    }

    pub fn lookup_by_entity<E: ?Sized>(&self, entity: &Rc<E>) -> Option<&DocumentInfo> {
        self.by_entity.get(&EntityKey::of(entity))
    }

    pub fn lookup_by_key(&self, key: EntityKey) -> Option<&DocumentInfo> {
        self.by_entity.get(&key)
    }

    pub fn lookup_by_id(&self, id: &str) -> Option<&DocumentInfo> {
        self.by_id
            .get(&normalize(id))
            .and_then(|key| self.by_entity.get(key))
    }

    /// Typed variant of [`lookup_by_id`](Self::lookup_by_id).
    pub fn entity_by_id<T: 'static>(&self, id: &str) -> Option<Entity<T>> {
        self.lookup_by_id(id).and_then(DocumentInfo::entity::<T>)
    }

    pub fn contains<E: ?Sized>(&self, entity: &Rc<E>) -> bool {
        self.by_entity.contains_key(&EntityKey::of(entity))
    }

    /// Stops tracking `entity`. The id index falls back to another entity
    /// tracked under the same id, if any.
    pub fn evict<E: ?Sized>(&mut self, entity: &Rc<E>) -> Option<DocumentInfo> {
        let key = EntityKey::of(entity);
        let removed = self.by_entity.remove(&key)?;
        if !removed.id.is_empty() {
            let normalized = normalize(&removed.id);
            if self.by_id.get(&normalized) == Some(&key) {
                let successor = self
                    .by_entity
                    .iter()
                    .find(|(_, info)| ids_match(&info.id, &removed.id))
                    .map(|(key, _)| *key);
                match successor {
                    Some(next) => {
                        self.by_id.insert(normalized, next);
                    }
                    None => {
                        self.by_id.remove(&normalized);
                    }
                }
            }
        }
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.by_entity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_entity.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DocumentInfo> {
        self.by_entity.values()
    }

    pub fn clear(&mut self) {
        self.by_entity.clear();
        self.by_id.clear();
    }
}

/// Entities marked for deletion in a session.
///
/// Holds a clone of every member, so a key stays unique for as long as the
/// entity sits in the set, even after the identity map has evicted it.
#[derive(Debug, Default)]
pub struct DeletedEntities {
    entities: HashMap<EntityKey, Rc<dyn Any>>,
}

impl DeletedEntities {
    /// Returns false when `entity` was already marked.
    pub fn insert<E: Any>(&mut self, entity: &Rc<E>) -> bool {
        let entity: Rc<dyn Any> = Rc::clone(entity) as Rc<dyn Any>;
        self.entities.insert(EntityKey::of(&entity), entity).is_none()
    }

    pub fn contains<E: ?Sized>(&self, entity: &Rc<E>) -> bool {
        self.entities.contains_key(&EntityKey::of(entity))
    }

    pub fn contains_key(&self, key: EntityKey) -> bool {
        self.entities.contains_key(&key)
    }

    pub fn remove<E: ?Sized>(&mut self, entity: &Rc<E>) -> bool {
        self.entities.remove(&EntityKey::of(entity)).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = EntityKey> + '_ {
        self.entities.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}

fn normalize(id: &str) -> String {
    id.to_lowercase()
}

fn ids_match(a: &str, b: &str) -> bool {
    a == b || normalize(a) == normalize(b)
}
