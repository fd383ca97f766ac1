//! Document representation and field helpers.

use chrono::Utc;
use serde_json::{Map, Value};

/// A stored document: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Field holding the generated document identifier.
pub const ID_FIELD: &str = "_id";

/// Field holding the creation time in epoch milliseconds.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Field holding the last update time in epoch milliseconds.
pub const UPDATED_AT_FIELD: &str = "updatedAt";

/// Generate a fresh document identifier.
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Get the identifier of a document, if it has one.
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

/// Get a string field, treating empty strings as absent.
pub fn str_field<'a>(doc: &'a Document, field: &str) -> Option<&'a str> {
    doc.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Get an integer field.
pub fn i64_field(doc: &Document, field: &str) -> Option<i64> {
    doc.get(field).and_then(Value::as_i64)
}
