use crate::{
    Result,
    commands::{GetRevisionsCommand, RevisionsResult},
};

/// Transport seam. Implementations own the wire format, retries and node
/// selection; sessions only hand them request descriptions.
pub trait RequestExecutor: Send + Sync {
    fn get_revisions(&self, database: &str, command: &GetRevisionsCommand)
    -> Result<RevisionsResult>;
}
