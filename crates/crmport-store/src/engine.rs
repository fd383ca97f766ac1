//! Sled-backed document store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use sled::{Db, Tree};
use tracing::{debug, info};

use crate::config::{CollectionSchema, ConnectionString, StoreConfig};
use crate::credential::hash_secret;
use crate::document::{
    document_id, generate_id, now_millis, Document, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD,
};
use crate::error::StoreError;
use crate::filter::Filter;
use crate::store::TargetStore;
use crate::unique_index::UniqueIndex;

/// Prefix for per-collection document trees.
const COLLECTION_PREFIX: &str = "docs:";

/// Tree name for store metadata.
const META_TREE: &str = "meta";

/// Meta key recording when the store was first opened.
const OPENED_AT_KEY: &[u8] = b"opened_at";

/// Document store wrapping sled.
///
/// Each collection lives in its own tree keyed by document ID; values are
/// JSON-encoded documents. Clones share the same database handle, so the
/// async interface can move work onto the blocking pool.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    meta_tree: Tree,
    unique: UniqueIndex,
    config: Arc<StoreConfig>,
    closed: Arc<AtomicBool>,
}

impl SledStore {
    /// Open or create a store with the given configuration.
    pub fn open(config: StoreConfig) -> Result<Self, StoreError> {
        let db = config.to_sled_config().open()?;
        let meta_tree = db.open_tree(META_TREE)?;
        let unique = UniqueIndex::open(&db)?;

        // First open wins; later opens keep the original value.
        let opened_at = now_millis().to_be_bytes();
        let _ = meta_tree.compare_and_swap(
            OPENED_AT_KEY,
            None as Option<&[u8]>,
            Some(&opened_at[..]),
        )?;

        info!(
            path = %config.path.display(),
            temporary = config.temporary,
            recovered = db.was_recovered(),
            "document store opened"
        );

        Ok(Self {
            db,
            meta_tree,
            unique,
            config: Arc::new(config),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Open the store a connection string points at.
    pub fn connect(conn: &ConnectionString) -> Result<Self, StoreError> {
        Self::open(StoreConfig::from_connection(conn))
    }

    /// Find the first document matching a filter.
    ///
    /// Equality on a unique field is answered from the unique index.
    pub fn find_one_sync(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        if let Some(found) = self.find_by_unique(collection, filter)? {
            return Ok(found);
        }
        self.scan(collection, filter)?.next().transpose()
    }

    /// Find all documents matching a filter.
    pub fn find_sync(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<Document>, StoreError> {
        self.scan(collection, filter)?.collect()
    }

    /// Count documents matching a filter.
    pub fn count_sync(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let mut count = 0;
        for doc in self.scan(collection, filter)? {
            doc?;
            count += 1;
        }
        Ok(count)
    }

    /// Validated create: enforce required fields, default timestamps and
    /// hash the credential field.
    pub fn insert_validated(
        &self,
        collection: &str,
        mut doc: Document,
    ) -> Result<String, StoreError> {
        self.ensure_open()?;
        if let Some(schema) = self.config.schema(collection) {
            apply_write_rules(schema, &mut doc)?;
        }

        let now = now_millis();
        for field in [CREATED_AT_FIELD, UPDATED_AT_FIELD] {
            if doc.get(field).map_or(true, Value::is_null) {
                doc.insert(field.to_string(), Value::from(now));
            }
        }

        self.write(collection, doc)
    }

    /// Trusted import: write the document verbatim.
    pub fn insert_trusted(&self, collection: &str, doc: Document) -> Result<String, StoreError> {
        self.ensure_open()?;
        self.write(collection, doc)
    }

    /// Flush pending writes and mark the store closed.
    ///
    /// Closing twice is a no-op.
    pub fn close_sync(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("document store already closed");
            return Ok(());
        }
        let bytes = self.db.flush()?;
        info!(bytes_flushed = bytes, "document store closed");
        Ok(())
    }

    /// Whether the store has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn collection_tree(&self, collection: &str) -> Result<Tree, StoreError> {
        Ok(self
            .db
            .open_tree(format!("{}{}", COLLECTION_PREFIX, collection))?)
    }

    /// `None` when the filter is not an equality on a unique string field.
    fn find_by_unique(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Option<Document>>, StoreError> {
        let Filter::Eq {
            field,
            value: Value::String(value),
        } = filter
        else {
            return Ok(None);
        };
        let indexed = self
            .config
            .schema(collection)
            .is_some_and(|schema| schema.unique.iter().any(|f| f == field));
        if !indexed {
            return Ok(None);
        }

        self.ensure_open()?;
        let Some(id) = self.unique.lookup(collection, field, value)? else {
            return Ok(Some(None));
        };
        match self.collection_tree(collection)?.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(Some(serde_json::from_slice(&bytes)?))),
            None => Ok(Some(None)),
        }
    }

    /// Run a sync operation on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(SledStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || op(store))
            .await
            .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }

    fn scan<'a>(
        &self,
        collection: &str,
        filter: &'a Filter,
    ) -> Result<impl Iterator<Item = Result<Document, StoreError>> + 'a, StoreError> {
        self.ensure_open()?;
        let tree = self.collection_tree(collection)?;
        Ok(tree
            .iter()
            .values()
            .map(|value| -> Result<Document, StoreError> {
                let bytes = value?;
                Ok(serde_json::from_slice(&bytes)?)
            })
            .filter(move |doc| match doc {
                Ok(doc) => filter.matches(doc),
                Err(_) => true,
            }))
    }

    /// Assign an ID if needed, claim unique values, then store the document.
    fn write(&self, collection: &str, mut doc: Document) -> Result<String, StoreError> {
        let id = match doc.get(ID_FIELD) {
            None | Some(Value::Null) => {
                let id = generate_id();
                doc.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
            Some(_) => document_id(&doc)
                .map(str::to_string)
                .ok_or_else(|| StoreError::InvalidDocument {
                    collection: collection.to_string(),
                    reason: format!("{} must be a string", ID_FIELD),
                })?,
        };

        let unique_values: Vec<(&str, String)> = self
            .config
            .schema(collection)
            .map(|schema| {
                schema
                    .unique
                    .iter()
                    .filter_map(|field| {
                        doc.get(field)
                            .and_then(Value::as_str)
                            .map(|value| (field.as_str(), value.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut claimed: Vec<(&str, &str)> = Vec::new();
        for (field, value) in &unique_values {
            if let Err(e) = self.unique.claim(collection, field, value, &id) {
                self.release_all(collection, &claimed)?;
                return Err(e);
            }
            claimed.push((*field, value.as_str()));
        }

        let bytes = serde_json::to_vec(&doc)?;
        let tree = self.collection_tree(collection)?;
        let stored = tree.compare_and_swap(id.as_bytes(), None as Option<&[u8]>, Some(bytes));
        match stored {
            Ok(Ok(())) => {
                debug!(collection, id = %id, "document inserted");
                Ok(id)
            }
            Ok(Err(_)) => {
                self.release_all(collection, &claimed)?;
                Err(StoreError::InvalidDocument {
                    collection: collection.to_string(),
                    reason: format!("document {} already exists", id),
                })
            }
            Err(e) => {
                self.release_all(collection, &claimed)?;
                Err(e.into())
            }
        }
    }

    fn release_all(&self, collection: &str, claimed: &[(&str, &str)]) -> Result<(), StoreError> {
        for (field, value) in claimed {
            self.unique.release(collection, field, value)?;
        }
        Ok(())
    }

    /// Read a meta timestamp; exercised by `ping` to touch the store.
    fn opened_at(&self) -> Result<Option<i64>, StoreError> {
        Ok(self.meta_tree.get(OPENED_AT_KEY)?.and_then(|bytes| {
            let arr: [u8; 8] = bytes.as_ref().try_into().ok()?;
            Some(i64::from_be_bytes(arr))
        }))
    }
}

/// Apply a collection's validated-create rules to a document.
fn apply_write_rules(schema: &CollectionSchema, doc: &mut Document) -> Result<(), StoreError> {
    let invalid = |reason: String| StoreError::InvalidDocument {
        collection: schema.name.clone(),
        reason,
    };

    for field in &schema.required {
        let present = match doc.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(_) => true,
        };
        if !present {
            return Err(invalid(format!("missing required field '{}'", field)));
        }
    }

    if let Some(field) = &schema.credential {
        match doc.get(field) {
            None | Some(Value::Null) => {}
            Some(Value::String(plain)) if plain.is_empty() => {
                doc.remove(field);
            }
            Some(Value::String(plain)) => {
                let hashed = hash_secret(plain);
                doc.insert(field.clone(), Value::String(hashed));
            }
            Some(_) => return Err(invalid(format!("'{}' must be a string", field))),
        }
    }

    Ok(())
}

#[async_trait]
impl TargetStore for SledStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.opened_at()?;
        Ok(())
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        let (collection, filter) = (collection.to_string(), filter.clone());
        self.blocking(move |store| store.find_one_sync(&collection, &filter))
            .await
    }

    async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StoreError> {
        let (collection, filter) = (collection.to_string(), filter.clone());
        self.blocking(move |store| store.find_sync(&collection, &filter))
            .await
    }

    async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StoreError> {
        let (collection, filter) = (collection.to_string(), filter.clone());
        self.blocking(move |store| store.count_sync(&collection, &filter))
            .await
    }

    async fn insert(&self, collection: &str, doc: Document) -> Result<String, StoreError> {
        let collection = collection.to_string();
        self.blocking(move |store| store.insert_validated(&collection, doc))
            .await
    }

    async fn trusted_insert(
        &self,
        collection: &str,
        doc: Document,
    ) -> Result<String, StoreError> {
        let collection = collection.to_string();
        self.blocking(move |store| store.insert_trusted(&collection, doc))
            .await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.blocking(|store| store.close_sync()).await
    }
}
