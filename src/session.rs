use crate::{
    Error, Result,
    commands::{CommandData, IdTypeAndName},
    convert::EntityToJson,
    conventions::Conventions,
    executor::RequestExecutor,
    extension::SessionExtension,
    identity::{DeletedEntities, DocumentInfo, Entity, EntityIdentityMap},
    metrics,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub database: String,
}

/// Mutable state owned by one session. Extensions reach it through `Weak`
/// handles; no locking, a session is driven from a single call path.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) documents_by_entity: EntityIdentityMap,
    pub(crate) deleted_entities: DeletedEntities,
    deferred_commands: Vec<CommandData>,
    deferred_commands_map: HashMap<IdTypeAndName, usize>,
}

impl SessionState {
    pub(crate) fn defer_many(&mut self, commands: impl IntoIterator<Item = CommandData>) {
        let mut count = 0u64;
        for command in commands {
            self.deferred_commands_map
                .insert(command.key(), self.deferred_commands.len());
            self.deferred_commands.push(command);
            count += 1;
        }
        if count > 0 {
            metrics::metrics()
                .deferred_commands_total
                .fetch_add(count, Ordering::Relaxed);
        }
    }

    pub(crate) fn deferred_commands(&self) -> &[CommandData] {
        &self.deferred_commands
    }

    pub(crate) fn deferred_command(&self, key: &IdTypeAndName) -> Option<&CommandData> {
        self.deferred_commands_map
            .get(key)
            .and_then(|idx| self.deferred_commands.get(*idx))
    }

    fn clear(&mut self) {
        self.documents_by_entity.clear();
        self.deleted_entities.clear();
        self.deferred_commands.clear();
        self.deferred_commands_map.clear();
    }
}

/// Unit of work over one database. Tracks every entity it materializes.
pub struct DocumentSession {
    state: Rc<RefCell<SessionState>>,
    executor: Arc<dyn RequestExecutor>,
    entity_to_json: EntityToJson,
    conventions: Arc<Conventions>,
    info: SessionInfo,
}

impl DocumentSession {
    pub(crate) fn new(
        executor: Arc<dyn RequestExecutor>,
        conventions: Arc<Conventions>,
        database: Option<String>,
    ) -> Self {
        let info = SessionInfo {
            session_id: Uuid::new_v4(),
            database: database.unwrap_or_else(|| conventions.database.clone()),
        };
        tracing::debug!(
            session_id = %info.session_id,
            database = %info.database,
            "opening session"
        );
        Self {
            state: Rc::default(),
            executor,
            entity_to_json: EntityToJson::new(&conventions),
            conventions,
            info,
        }
    }

    /// Extension operations (revisions and friends) sharing this session's state.
    pub fn advanced(&self) -> SessionExtension {
        SessionExtension::new(
            Rc::downgrade(&self.state),
            Arc::clone(&self.executor),
            self.entity_to_json.clone(),
            Arc::clone(&self.conventions),
            self.info.clone(),
        )
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn conventions(&self) -> &Conventions {
        &self.conventions
    }

    pub fn is_tracked<T: 'static>(&self, entity: &Entity<T>) -> bool {
        self.state.borrow().documents_by_entity.contains(entity)
    }

    pub fn document_info<T: 'static>(&self, entity: &Entity<T>) -> Option<DocumentInfo> {
        self.state
            .borrow()
            .documents_by_entity
            .lookup_by_entity(entity)
            .cloned()
    }

    pub fn change_vector_for<T: 'static>(&self, entity: &Entity<T>) -> Option<String> {
        self.document_info(entity)
            .and_then(|info| info.change_vector().map(str::to_string))
    }

    /// The entity most recently materialized for `id`.
    pub fn tracked_by_id<T: 'static>(&self, id: &str) -> Option<Entity<T>> {
        self.state.borrow().documents_by_entity.entity_by_id(id)
    }

    pub fn tracked_count(&self) -> usize {
        self.state.borrow().documents_by_entity.len()
    }

    pub fn mark_deleted<T: 'static>(&self, entity: &Entity<T>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if !state.documents_by_entity.contains(entity) {
            return Err(Error::precondition("entity is not tracked by this session"));
        }
        state.deleted_entities.insert(entity);
        Ok(())
    }

    pub fn is_deleted<T: 'static>(&self, entity: &Entity<T>) -> bool {
        self.state.borrow().deleted_entities.contains(entity)
    }

    pub fn defer(&self, command: CommandData) {
        self.defer_many([command]);
    }

    /// Queues commands for the next batch, in the order given.
    pub fn defer_many(&self, commands: impl IntoIterator<Item = CommandData>) {
        self.state.borrow_mut().defer_many(commands);
    }

    /// Snapshot of the deferred queue in insertion order.
    pub fn deferred_commands(&self) -> Vec<CommandData> {
        self.state.borrow().deferred_commands().to_vec()
    }

    pub fn deferred_command(&self, key: &IdTypeAndName) -> Option<CommandData> {
        self.state.borrow().deferred_command(key).cloned()
    }

    /// Forget all tracked entities, deletions and deferred commands.
    pub fn clear(&self) {
        self.state.borrow_mut().clear();
    }

    /// Ends the session. Outstanding extensions and operations fail with a
    /// precondition error from here on.
    pub fn close(self) {
        tracing::debug!(session_id = %self.info.session_id, "closing session");
        self.state.borrow_mut().clear();
    }
}
