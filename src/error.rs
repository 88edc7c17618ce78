use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("entity is tracked as `{tracked}` and cannot be registered as `{attempted}`")]
    IdentityConflict { tracked: String, attempted: String },
    #[error("failed to convert revision slot {slot} (id `{id}`): {source}")]
    Conversion {
        slot: usize,
        id: String,
        #[source]
        source: Box<Error>,
    },
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("deferred operation failed: {0}")]
    Deferred(Arc<Error>),
}

impl Error {
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }

    /// Unwraps `Deferred` and `Conversion` layers down to the error that was raised first.
    pub fn root(&self) -> &Error {
        match self {
            Error::Deferred(inner) => inner.root(),
            Error::Conversion { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
