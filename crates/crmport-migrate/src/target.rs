//! Timeout-bounded access to the target store.

use std::future::Future;
use std::time::Duration;

use crmport_store::{Document, Filter, StoreError, TargetStore};

use crate::error::CallError;

/// How a transformed record is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPath {
    /// Validated create; the store applies its write-time rules.
    Validated,
    /// Trusted import; the document is written verbatim.
    Trusted,
}

/// A target store whose every call is bounded by a timeout.
#[derive(Clone, Copy)]
pub struct BoundedStore<'a> {
    inner: &'a dyn TargetStore,
    timeout: Duration,
}

impl<'a> BoundedStore<'a> {
    /// Wrap a store with a per-call timeout.
    pub fn new(inner: &'a dyn TargetStore, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, CallError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(CallError::from),
            Err(_) => Err(CallError::Timeout {
                operation,
                after: self.timeout,
            }),
        }
    }

    /// Check the store answers.
    pub async fn ping(&self) -> Result<(), CallError> {
        self.call("ping", self.inner.ping()).await
    }

    /// Find the first matching document.
    pub async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Option<Document>, CallError> {
        self.call("find_one", self.inner.find_one(collection, filter))
            .await
    }

    /// Find all matching documents.
    pub async fn find(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<Document>, CallError> {
        self.call("find", self.inner.find(collection, filter)).await
    }

    /// Count matching documents.
    pub async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, CallError> {
        self.call("count", self.inner.count(collection, filter)).await
    }

    /// Insert through the given path.
    pub async fn insert(
        &self,
        path: InsertPath,
        collection: &str,
        doc: Document,
    ) -> Result<String, CallError> {
        match path {
            InsertPath::Validated => {
                self.call("insert", self.inner.insert(collection, doc))
                    .await
            }
            InsertPath::Trusted => {
                self.call("trusted_insert", self.inner.trusted_insert(collection, doc))
                    .await
            }
        }
    }
}
