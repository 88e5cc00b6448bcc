//! Field-selection query documents.
//!
//! The remote endpoint accepts a nested JSON document where every key names a
//! field to select and an empty object marks a leaf. Arguments are passed
//! under a `"$"` key scoped to the object that contains it.

use serde::Serialize;
use serde_json::{Value, json};

/// Parameter name under which the grant key is passed.
pub const GRANT_KEY_PARAM: &str = "grantKey";

/// A nested field-selection document ready to be posted to the endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct QueryDocument(Value);

impl QueryDocument {
    pub fn as_value(&self) -> &Value {
        &self.0
    }

    /// Wrap the document in the request envelope: `{ "query": <document> }`.
    pub fn request_body(&self) -> Value {
        json!({ "query": self.0 })
    }
}

/// Build the query that lists the organizations reachable by `grant_key`.
///
/// Returns `None` for an empty grant key; no request should be issued in
/// that case. The key is placed as a parameter value and never spliced into
/// a field name.
pub fn build_organization_query(grant_key: &str) -> Option<QueryDocument> {
    if grant_key.is_empty() {
        return None;
    }

    Some(QueryDocument(json!({
        "$": { GRANT_KEY_PARAM: grant_key },
        "currentGrant": {
            "user": {
                "memberships": {
                    "nodes": {
                        "organization": {
                            "id": {},
                            "name": {}
                        }
                    }
                }
            }
        }
    })))
}
