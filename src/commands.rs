use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandType {
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "DELETE")]
    Delete,
}

/// Key of a deferred command inside the session queue.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct IdTypeAndName {
    pub id: String,
    pub command_type: CommandType,
    pub name: Option<String>,
}

/// A command queued on the session and sent in the next batch.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "Type")]
pub enum CommandData {
    #[serde(rename = "PUT")]
    Put {
        #[serde(rename = "Id")]
        id: String,
        #[serde(rename = "ChangeVector")]
        change_vector: Option<String>,
        #[serde(rename = "Document")]
        document: JsonMap<String, Value>,
    },
    #[serde(rename = "DELETE")]
    Delete {
        #[serde(rename = "Id")]
        id: String,
        #[serde(rename = "ChangeVector")]
        change_vector: Option<String>,
    },
}

impl CommandData {
    pub fn id(&self) -> &str {
        match self {
            CommandData::Put { id, .. } | CommandData::Delete { id, .. } => id,
        }
    }

    pub fn command_type(&self) -> CommandType {
        match self {
            CommandData::Put { .. } => CommandType::Put,
            CommandData::Delete { .. } => CommandType::Delete,
        }
    }

    pub fn key(&self) -> IdTypeAndName {
        IdTypeAndName {
            id: self.id().to_string(),
            command_type: self.command_type(),
            name: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevisionsQuery {
    Range {
        id: String,
        start: usize,
        page_size: usize,
    },
    ChangeVectors(Vec<String>),
}

/// Request description for fetching revisions, consumed by a
/// [`RequestExecutor`](crate::executor::RequestExecutor).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetRevisionsCommand {
    query: RevisionsQuery,
    metadata_only: bool,
}

impl GetRevisionsCommand {
    pub fn range(
        id: impl Into<String>,
        start: usize,
        page_size: usize,
        metadata_only: bool,
    ) -> Self {
        Self {
            query: RevisionsQuery::Range {
                id: id.into(),
                start,
                page_size,
            },
            metadata_only,
        }
    }

    pub fn change_vectors(change_vectors: Vec<String>, metadata_only: bool) -> Self {
        Self {
            query: RevisionsQuery::ChangeVectors(change_vectors),
            metadata_only,
        }
    }

    pub fn query(&self) -> &RevisionsQuery {
        &self.query
    }

    /// Requested change vectors, positionally aligned with the response.
    /// Empty for the range form.
    pub fn requested_change_vectors(&self) -> &[String] {
        match &self.query {
            RevisionsQuery::ChangeVectors(cvs) => cvs,
            RevisionsQuery::Range { .. } => &[],
        }
    }

    pub fn metadata_only(&self) -> bool {
        self.metadata_only
    }

    pub fn method(&self) -> &'static str {
        "GET"
    }

    pub fn path(&self, database: &str) -> String {
        format!("/databases/{database}/revisions")
    }

    /// Query parameters in request order. Values are not percent-encoded.
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        match &self.query {
            RevisionsQuery::Range {
                id,
                start,
                page_size,
            } => {
                params.push(("id", id.clone()));
                params.push(("start", start.to_string()));
                params.push(("pageSize", page_size.to_string()));
            }
            RevisionsQuery::ChangeVectors(cvs) => {
                params.extend(cvs.iter().map(|cv| ("changeVector", cv.clone())));
            }
        }
        if self.metadata_only {
            params.push(("metadataOnly", "true".to_string()));
        }
        params
    }
}

/// Raw revisions response: one slot per requested revision, `None` where the
/// store has no such revision.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RevisionsResult {
    #[serde(rename = "Results", default)]
    results: Vec<Option<JsonMap<String, Value>>>,
}

impl RevisionsResult {
    pub fn new(results: Vec<Option<JsonMap<String, Value>>>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[Option<JsonMap<String, Value>>] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn range_params_in_order() {
        let cmd = GetRevisionsCommand::range("orders/1", 10, 25, true);
        assert_eq!(
            cmd.query_params(),
            vec![
                ("id", "orders/1".to_string()),
                ("start", "10".to_string()),
                ("pageSize", "25".to_string()),
                ("metadataOnly", "true".to_string()),
            ]
        );
        assert!(cmd.requested_change_vectors().is_empty());
    }

    #[test]
    fn change_vector_params_repeat() {
        let cmd = GetRevisionsCommand::change_vectors(vec!["A:1".into(), "A:2".into()], false);
        assert_eq!(
            cmd.query_params(),
            vec![
                ("changeVector", "A:1".to_string()),
                ("changeVector", "A:2".to_string()),
            ]
        );
        assert_eq!(cmd.path("Demo"), "/databases/Demo/revisions");
    }

    #[test]
    fn result_keeps_null_slots() {
        let parsed: RevisionsResult =
            serde_json::from_value(json!({ "Results": [{ "Name": "a" }, null] })).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(parsed.results()[1].is_none());
    }

    #[test]
    fn delete_serializes_with_type_tag() {
        let cmd = CommandData::Delete {
            id: "orders/1".into(),
            change_vector: None,
        };
        assert_eq!(
            serde_json::to_value(&cmd).unwrap(),
            json!({ "Type": "DELETE", "Id": "orders/1", "ChangeVector": null })
        );
    }
}
