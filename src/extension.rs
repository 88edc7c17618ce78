use crate::{
    Error, Result,
    commands::CommandData,
    convert::EntityToJson,
    conventions::Conventions,
    executor::RequestExecutor,
    identity::{DeletedEntities, EntityIdentityMap},
    revisions::RevisionsSession,
    session::{SessionInfo, SessionState},
};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Non-owning view of a session's state for extension operations.
///
/// Mutations go straight to the owning session; nothing is copied. Once the
/// session is dropped or closed every accessor fails with
/// [`Error::Precondition`].
#[derive(Clone)]
pub struct SessionExtension {
    state: Weak<RefCell<SessionState>>,
    request_executor: Arc<dyn RequestExecutor>,
    entity_to_json: EntityToJson,
    conventions: Arc<Conventions>,
    session_info: SessionInfo,
}

impl SessionExtension {
    pub(crate) fn new(
        state: Weak<RefCell<SessionState>>,
        request_executor: Arc<dyn RequestExecutor>,
        entity_to_json: EntityToJson,
        conventions: Arc<Conventions>,
        session_info: SessionInfo,
    ) -> Self {
        Self {
            state,
            request_executor,
            entity_to_json,
            conventions,
            session_info,
        }
    }

    pub fn revisions(&self) -> RevisionsSession {
        RevisionsSession::new(self.clone())
    }

    pub fn is_open(&self) -> bool {
        self.state.strong_count() > 0
    }

    pub fn request_executor(&self) -> &Arc<dyn RequestExecutor> {
        &self.request_executor
    }

    pub fn entity_to_json(&self) -> &EntityToJson {
        &self.entity_to_json
    }

    pub fn conventions(&self) -> &Conventions {
        &self.conventions
    }

    pub fn session_info(&self) -> &SessionInfo {
        &self.session_info
    }

    pub fn with_identity_map<R>(&self, f: impl FnOnce(&EntityIdentityMap) -> R) -> Result<R> {
        let state = self.upgrade()?;
        let state = state.borrow();
        Ok(f(&state.documents_by_entity))
    }

    pub fn with_identity_map_mut<R>(
        &self,
        f: impl FnOnce(&mut EntityIdentityMap) -> R,
    ) -> Result<R> {
        let state = self.upgrade()?;
        let mut state = state.borrow_mut();
        Ok(f(&mut state.documents_by_entity))
    }

    pub fn with_deleted_entities<R>(&self, f: impl FnOnce(&DeletedEntities) -> R) -> Result<R> {
        let state = self.upgrade()?;
        let state = state.borrow();
        Ok(f(&state.deleted_entities))
    }

    /// Appends to the session's deferred queue, keeping the given order.
    pub fn defer_many(&self, commands: impl IntoIterator<Item = CommandData>) -> Result<()> {
        let state = self.upgrade()?;
        state.borrow_mut().defer_many(commands);
        Ok(())
    }

    pub fn deferred_commands(&self) -> Result<Vec<CommandData>> {
        let state = self.upgrade()?;
        let commands = state.borrow().deferred_commands().to_vec();
        Ok(commands)
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        self.upgrade().map(|_| ())
    }

    fn upgrade(&self) -> Result<Rc<RefCell<SessionState>>> {
        self.state
            .upgrade()
            .ok_or_else(|| Error::precondition("session is closed"))
    }
}
