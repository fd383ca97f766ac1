//! crmport store - embedded document store used as the migration target.
//!
//! Documents are JSON objects grouped into named collections and persisted
//! in sled. The [`TargetStore`] trait is the contract the migration engine
//! programs against; [`SledStore`] implements it.

pub mod config;
pub mod credential;
pub mod document;
pub mod engine;
pub mod error;
pub mod filter;
pub mod store;
pub mod unique_index;

pub use config::{crm_schemas, CollectionSchema, ConnectionString, StoreConfig, LEADS, USERS};
pub use credential::{hash_secret, verify_secret};
pub use document::{Document, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
pub use engine::SledStore;
pub use error::StoreError;
pub use filter::Filter;
pub use store::TargetStore;
pub use unique_index::UniqueIndex;
