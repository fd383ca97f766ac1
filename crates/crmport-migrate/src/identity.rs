//! Natural key to target identifier lookup.

use std::collections::HashMap;

use clap::ValueEnum;
use crmport_store::document::{document_id, i64_field};
use crmport_store::{Document, Filter, CREATED_AT_FIELD};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::CallError;
use crate::target::BoundedStore;

/// What to do when several target records share one natural key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbiguityPolicy {
    /// Ambiguous keys resolve to nothing.
    #[default]
    Unresolved,
    /// Ambiguous keys resolve to the oldest record (then the smallest id).
    FirstMatch,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Candidate {
    created_at: i64,
    id: String,
}

/// Lookup from natural key to target identifier.
///
/// Built from whatever the target store holds at build time; build a new one
/// after a phase that inserts referenced records.
#[derive(Debug)]
pub struct IdentityResolver {
    key_field: String,
    policy: AmbiguityPolicy,
    entries: HashMap<String, Vec<Candidate>>,
}

impl IdentityResolver {
    /// Query every record of `collection` and index it by `key_field`.
    pub async fn build(
        store: &BoundedStore<'_>,
        collection: &str,
        key_field: &str,
        policy: AmbiguityPolicy,
    ) -> Result<Self, CallError> {
        let docs = store.find(collection, &Filter::All).await?;
        let resolver = Self::from_documents(&docs, key_field, policy);
        info!(
            collection,
            key_field,
            records = docs.len(),
            keys = resolver.len(),
            ambiguous = resolver.ambiguous_keys(),
            "identity map built"
        );
        Ok(resolver)
    }

    /// Index documents already in hand.
    pub fn from_documents(docs: &[Document], key_field: &str, policy: AmbiguityPolicy) -> Self {
        let mut entries: HashMap<String, Vec<Candidate>> = HashMap::new();
        for doc in docs {
            let key = doc.get(key_field).and_then(|v| v.as_str());
            let (Some(id), Some(key)) = (document_id(doc), key) else {
                continue;
            };
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            entries.entry(key.to_string()).or_default().push(Candidate {
                created_at: i64_field(doc, CREATED_AT_FIELD).unwrap_or(i64::MAX),
                id: id.to_string(),
            });
        }
        for candidates in entries.values_mut() {
            candidates.sort();
        }

        Self {
            key_field: key_field.to_string(),
            policy,
            entries,
        }
    }

    /// Resolve a natural key to an identifier.
    pub fn resolve(&self, key: &str) -> Option<&str> {
        let candidates = self.entries.get(key.trim())?;
        match (candidates.as_slice(), self.policy) {
            ([only], _) => Some(only.id.as_str()),
            ([first, ..], AmbiguityPolicy::FirstMatch) => Some(first.id.as_str()),
            (_, AmbiguityPolicy::Unresolved) | ([], _) => {
                debug!(
                    key_field = %self.key_field,
                    key,
                    matches = candidates.len(),
                    "ambiguous key left unresolved"
                );
                None
            }
        }
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of keys shared by more than one record.
    pub fn ambiguous_keys(&self) -> usize {
        self.entries.values().filter(|c| c.len() > 1).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn docs(values: Vec<Value>) -> Vec<Document> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn sample() -> Vec<Document> {
        docs(vec![
            json!({"_id": "u1", "name": "Jane Doe", "createdAt": 300}),
            json!({"_id": "u2", "name": "Sam Roe", "createdAt": 200}),
            json!({"_id": "u3", "name": "Sam Roe", "createdAt": 100}),
            json!({"_id": "u4", "name": ""}),
            json!({"name": "No Id"}),
        ])
    }

    #[test]
    fn test_unique_key_resolves() {
        let resolver =
            IdentityResolver::from_documents(&sample(), "name", AmbiguityPolicy::Unresolved);
        assert_eq!(resolver.resolve("Jane Doe"), Some("u1"));
        assert_eq!(resolver.resolve(" Jane Doe "), Some("u1"));
        assert_eq!(resolver.len(), 2);
        assert_eq!(resolver.ambiguous_keys(), 1);
    }

    #[test]
    fn test_missing_key_is_none() {
        let resolver =
            IdentityResolver::from_documents(&sample(), "name", AmbiguityPolicy::FirstMatch);
        assert_eq!(resolver.resolve("Nobody"), None);
        assert_eq!(resolver.resolve("No Id"), None);
        assert_eq!(resolver.resolve("jane doe"), None);
    }

    #[test]
    fn test_ambiguous_key_unresolved_policy() {
        let resolver =
            IdentityResolver::from_documents(&sample(), "name", AmbiguityPolicy::Unresolved);
        assert_eq!(resolver.resolve("Sam Roe"), None);
    }

    #[test]
    fn test_ambiguous_key_first_match_policy() {
        let resolver =
            IdentityResolver::from_documents(&sample(), "name", AmbiguityPolicy::FirstMatch);
        assert_eq!(resolver.resolve("Sam Roe"), Some("u3"));
    }

    #[test]
    fn test_empty() {
        let resolver = IdentityResolver::from_documents(&[], "email", AmbiguityPolicy::default());
        assert!(resolver.is_empty());
        assert_eq!(resolver.resolve("a@x.com"), None);
    }
}
