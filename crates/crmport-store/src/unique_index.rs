//! Secondary index for enforcing unique fields.
//!
//! The UniqueIndex maintains a separate sled tree that maps unique field values
//! to document IDs, so duplicate detection does not need a collection scan.

use sled::Tree;

use crate::error::StoreError;

/// Tree name for the unique index.
pub const UNIQUE_INDEX_TREE: &str = "index:unique";

/// Secondary index for unique field values.
///
/// Key format: `collection\0field\0value` -> `document_id`
#[derive(Clone)]
pub struct UniqueIndex {
    tree: Tree,
}

impl UniqueIndex {
    /// Open or create the unique index from a sled database.
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree(UNIQUE_INDEX_TREE)?;
        Ok(Self { tree })
    }

    fn build_key(collection: &str, field: &str, value: &str) -> Vec<u8> {
        let mut key = Vec::with_capacity(collection.len() + field.len() + value.len() + 2);
        key.extend_from_slice(collection.as_bytes());
        key.push(0);
        key.extend_from_slice(field.as_bytes());
        key.push(0);
        key.extend_from_slice(value.as_bytes());
        key
    }

    /// Claim a unique value for a document.
    ///
    /// The claim is a single compare-and-swap, so two concurrent inserts of
    /// the same value cannot both succeed.
    pub fn claim(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        document_id: &str,
    ) -> Result<(), StoreError> {
        let key = Self::build_key(collection, field, value);
        match self
            .tree
            .compare_and_swap(key, None as Option<&[u8]>, Some(document_id.as_bytes()))?
        {
            Ok(()) => Ok(()),
            Err(_) => Err(StoreError::UniqueViolation {
                collection: collection.to_string(),
                field: field.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Release a previously claimed value.
    pub fn release(&self, collection: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let key = Self::build_key(collection, field, value);
        self.tree.remove(key)?;
        Ok(())
    }

    /// Look up the document ID owning a unique value.
    pub fn lookup(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Option<String>, StoreError> {
        let key = Self::build_key(collection, field, value);
        Ok(self
            .tree
            .get(key)?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()))
    }
}
