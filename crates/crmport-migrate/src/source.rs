//! Legacy source files.
//!
//! A missing file is a normal state (that collection was never used). A file
//! that exists but cannot be read or parsed is fatal: the legacy data itself
//! cannot be trusted.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::error::MigrateError;
use crate::legacy::LegacyRecord;

/// Result of loading a legacy collection.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceLoad {
    /// The file does not exist.
    Absent,
    /// The parsed records, in file order.
    Loaded(Vec<LegacyRecord>),
}

impl SourceLoad {
    /// Records to migrate; an absent source has none.
    pub fn into_records(self) -> Vec<LegacyRecord> {
        match self {
            SourceLoad::Absent => Vec::new(),
            SourceLoad::Loaded(records) => records,
        }
    }

    /// Whether the file was missing.
    pub fn is_absent(&self) -> bool {
        matches!(self, SourceLoad::Absent)
    }
}

/// Read the users file: a JSON array of user objects.
pub async fn read_users(path: &Path) -> Result<SourceLoad, MigrateError> {
    let Some(value) = read_json(path).await? else {
        return Ok(SourceLoad::Absent);
    };
    let records = match value {
        Value::Array(items) => records_from(path, items)?,
        _ => return Err(malformed(path, "expected a JSON array of users")),
    };
    info!(path = %path.display(), records = records.len(), "users source loaded");
    Ok(SourceLoad::Loaded(records))
}

/// Read the leads file: an object wrapping a `leads` array.
///
/// A wrapper without the `leads` key holds no leads.
pub async fn read_leads(path: &Path) -> Result<SourceLoad, MigrateError> {
    let Some(value) = read_json(path).await? else {
        return Ok(SourceLoad::Absent);
    };
    let Value::Object(mut wrapper) = value else {
        return Err(malformed(path, "expected an object with a 'leads' array"));
    };
    let records = match wrapper.remove("leads") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => records_from(path, items)?,
        Some(_) => return Err(malformed(path, "'leads' must be an array")),
    };
    info!(path = %path.display(), records = records.len(), "leads source loaded");
    Ok(SourceLoad::Loaded(records))
}

async fn read_json(path: &Path) -> Result<Option<Value>, MigrateError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "legacy source not found, treating as empty");
            return Ok(None);
        }
        Err(e) => return Err(malformed(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| malformed(path, e))
}

fn records_from(path: &Path, items: Vec<Value>) -> Result<Vec<LegacyRecord>, MigrateError> {
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(record) => Ok(record),
            other => Err(malformed(
                path,
                format!("entry {} is {}, expected an object", index, kind(&other)),
            )),
        })
        .collect()
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn malformed(path: &Path, reason: impl ToString) -> MigrateError {
    MigrateError::Source {
        path: PathBuf::from(path),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_absent_files() {
        let dir = tempfile::tempdir().unwrap();
        let users = read_users(&dir.path().join("users.json")).await.unwrap();
        let leads = read_leads(&dir.path().join("leads.json")).await.unwrap();
        assert!(users.is_absent());
        assert!(leads.is_absent());
        assert!(users.into_records().is_empty());
    }

    #[tokio::test]
    async fn test_users_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "users.json", r#"[{"email":"a@x.com"},{"email":"b@x.com"}]"#);
        let records = read_users(&path).await.unwrap().into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["email"], "b@x.com");
    }

    #[tokio::test]
    async fn test_leads_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "leads.json", r#"{"leads":[{"email":"l@x.com"}]}"#);
        assert_eq!(read_leads(&path).await.unwrap().into_records().len(), 1);

        let path = write(&dir, "empty.json", r#"{}"#);
        assert_eq!(read_leads(&path).await.unwrap(), SourceLoad::Loaded(vec![]));
    }

    #[tokio::test]
    async fn test_malformed_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cases = [
            ("broken.json", "[{\"email\":"),
            ("object.json", r#"{"email":"a@x.com"}"#),
            ("scalar.json", r#"[1, {"email":"a@x.com"}]"#),
        ];
        for (name, content) in cases {
            let path = write(&dir, name, content);
            let err = read_users(&path).await.unwrap_err();
            assert!(matches!(err, MigrateError::Source { .. }), "{name}");
        }

        let path = write(&dir, "leads.json", r#"[{"email":"l@x.com"}]"#);
        assert!(matches!(
            read_leads(&path).await,
            Err(MigrateError::Source { .. })
        ));
        let path = write(&dir, "leads2.json", r#"{"leads": "none"}"#);
        assert!(matches!(
            read_leads(&path).await,
            Err(MigrateError::Source { .. })
        ));
    }

    #[tokio::test]
    async fn test_directory_is_not_absent() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_users(dir.path()).await.unwrap_err();
        assert!(matches!(err, MigrateError::Source { .. }));
    }
}
