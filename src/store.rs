use crate::{conventions::Conventions, executor::RequestExecutor, session::DocumentSession};
use std::sync::Arc;

/// Entry point: owns the transport and conventions, hands out sessions.
#[derive(Clone)]
pub struct DocumentStore {
    executor: Arc<dyn RequestExecutor>,
    conventions: Arc<Conventions>,
}

impl DocumentStore {
    pub fn new(executor: Arc<dyn RequestExecutor>) -> Self {
        Self::builder(executor).build()
    }

    pub fn builder(executor: Arc<dyn RequestExecutor>) -> StoreBuilder {
        StoreBuilder {
            executor,
            conventions: Conventions::default(),
        }
    }

    pub fn conventions(&self) -> &Conventions {
        &self.conventions
    }

    /// Session against the conventions' default database.
    pub fn open_session(&self) -> DocumentSession {
        DocumentSession::new(Arc::clone(&self.executor), Arc::clone(&self.conventions), None)
    }

    pub fn open_session_for(&self, database: impl Into<String>) -> DocumentSession {
        DocumentSession::new(
            Arc::clone(&self.executor),
            Arc::clone(&self.conventions),
            Some(database.into()),
        )
    }
}

pub struct StoreBuilder {
    executor: Arc<dyn RequestExecutor>,
    conventions: Conventions,
}

impl StoreBuilder {
    pub fn conventions(mut self, conventions: Conventions) -> Self {
        self.conventions = conventions;
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.conventions.database = database.into();
        self
    }

    pub fn build(self) -> DocumentStore {
        DocumentStore {
            executor: self.executor,
            conventions: Arc::new(self.conventions),
        }
    }
}
