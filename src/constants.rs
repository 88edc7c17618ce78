//! Reserved keys of the `@metadata` sub-document.

pub const METADATA_KEY: &str = "@metadata";
pub const METADATA_ID: &str = "@id";
pub const METADATA_CHANGE_VECTOR: &str = "@change-vector";
pub const METADATA_COLLECTION: &str = "@collection";
pub const METADATA_FLAGS: &str = "@flags";
pub const METADATA_LAST_MODIFIED: &str = "@last-modified";
