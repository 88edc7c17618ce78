//! docsession — session identity tracking and memoized revision retrieval
//! for document store clients.

pub mod commands;
pub mod constants;
pub mod convert;
pub mod conventions;
mod error;
pub mod executor;
pub mod extension;
pub mod identity;
pub mod lazy;
pub mod metadata;
pub mod metrics;
pub mod revisions;
pub mod session;
pub mod store;
pub mod testing;

pub use error::{Error, Result};
pub use identity::{Entity, EntityIdentityMap};
pub use lazy::Lazy;
pub use metadata::MetadataView;
pub use session::DocumentSession;
pub use store::DocumentStore;

pub mod prelude {
    pub use crate::{DocumentSession, DocumentStore, Entity, Error, Lazy, MetadataView, Result};
}
