//! The target-store contract consumed by the migration engine.

use async_trait::async_trait;

use crate::document::Document;
use crate::error::StoreError;
use crate::filter::Filter;

/// Access contract for a transactional document store.
///
/// Two insertion paths are first-class: [`insert`](TargetStore::insert)
/// applies the store's write-time rules (required fields, timestamps,
/// credential hashing), while [`trusted_insert`](TargetStore::trusted_insert)
/// writes the document exactly as given. Unique constraints hold on both.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Check that the store is reachable and open.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Find the first document matching a filter.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError>;

    /// Find all documents matching a filter.
    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError>;

    /// Count documents matching a filter.
    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError>;

    /// Validated create. Returns the new document's identifier.
    async fn insert(&self, collection: &str, doc: Document) -> Result<String, StoreError>;

    /// Verbatim import, bypassing write-time transformation.
    async fn trusted_insert(&self, collection: &str, doc: Document)
        -> Result<String, StoreError>;

    /// Flush and release the store.
    async fn close(&self) -> Result<(), StoreError>;
}
