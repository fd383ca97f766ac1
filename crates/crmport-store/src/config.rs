//! Store configuration and connection strings.

use std::fmt;
use std::path::PathBuf;

use crate::error::StoreError;

/// Users collection name.
pub const USERS: &str = "users";

/// Leads collection name.
pub const LEADS: &str = "leads";

/// A parsed target-store connection string.
///
/// Accepted forms are `sled://<path>` for a persistent store and `mem://`
/// for a temporary store that is discarded when closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionString {
    /// Persistent store rooted at a directory.
    Sled(PathBuf),
    /// Temporary in-memory store.
    Memory,
}

impl ConnectionString {
    /// Parse a connection string.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(StoreError::InvalidConnectionString(
                "connection string is empty".to_string(),
            ));
        }

        let Some((scheme, rest)) = raw.split_once("://") else {
            return Err(StoreError::InvalidConnectionString(format!(
                "missing scheme in '{}'",
                raw
            )));
        };

        match scheme {
            "sled" if rest.is_empty() => Err(StoreError::InvalidConnectionString(
                "sled:// requires a path".to_string(),
            )),
            "sled" => Ok(ConnectionString::Sled(PathBuf::from(rest))),
            "mem" => Ok(ConnectionString::Memory),
            other => Err(StoreError::InvalidConnectionString(format!(
                "unsupported scheme '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionString::Sled(path) => write!(f, "sled://{}", path.display()),
            ConnectionString::Memory => write!(f, "mem://"),
        }
    }
}

/// Write-time rules for one collection.
#[derive(Debug, Clone)]
pub struct CollectionSchema {
    /// Collection name.
    pub name: String,
    /// Fields that must be present and non-null on validated create.
    pub required: Vec<String>,
    /// Fields carrying a unique constraint (enforced on every insert path).
    pub unique: Vec<String>,
    /// Field hashed on validated create.
    pub credential: Option<String>,
}

impl CollectionSchema {
    /// Create a schema with no rules.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: Vec::new(),
            unique: Vec::new(),
            credential: None,
        }
    }

    /// Add a required field.
    pub fn with_required(mut self, field: impl Into<String>) -> Self {
        self.required.push(field.into());
        self
    }

    /// Add a unique field.
    pub fn with_unique(mut self, field: impl Into<String>) -> Self {
        self.unique.push(field.into());
        self
    }

    /// Set the credential field.
    pub fn with_credential(mut self, field: impl Into<String>) -> Self {
        self.credential = Some(field.into());
        self
    }
}

/// Configuration for the document store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Path to the store directory.
    pub path: PathBuf,

    /// Page cache capacity in bytes.
    pub cache_capacity: u64,

    /// Flush interval in milliseconds. None means flush only on close.
    pub flush_every_ms: Option<u64>,

    /// Enable zstd compression.
    pub compression: bool,

    /// Temporary store (deleted on drop).
    pub temporary: bool,

    /// Per-collection write rules.
    pub schemas: Vec<CollectionSchema>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./crmport_data"),
            cache_capacity: 256 * 1024 * 1024, // 256MB
            flush_every_ms: Some(1000),
            compression: true,
            temporary: false,
            schemas: crm_schemas(),
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Create a temporary configuration for testing.
    pub fn temporary() -> Self {
        Self {
            path: PathBuf::from(""),
            temporary: true,
            ..Default::default()
        }
    }

    /// Build a configuration from a connection string.
    pub fn from_connection(conn: &ConnectionString) -> Self {
        match conn {
            ConnectionString::Sled(path) => Self::new(path.clone()),
            ConnectionString::Memory => Self::temporary(),
        }
    }

    /// Replace the collection schemas.
    pub fn with_schemas(mut self, schemas: Vec<CollectionSchema>) -> Self {
        self.schemas = schemas;
        self
    }

    /// Look up the schema for a collection.
    pub fn schema(&self, collection: &str) -> Option<&CollectionSchema> {
        self.schemas.iter().find(|s| s.name == collection)
    }

    pub(crate) fn to_sled_config(&self) -> sled::Config {
        let mut config = sled::Config::new()
            .cache_capacity(self.cache_capacity)
            .use_compression(self.compression)
            .flush_every_ms(self.flush_every_ms);

        if self.temporary {
            config = config.temporary(true);
        } else {
            config = config.path(&self.path);
        }

        config
    }
}

/// Write rules of the CRM collections.
pub fn crm_schemas() -> Vec<CollectionSchema> {
    vec![
        CollectionSchema::new(USERS)
            .with_required("email")
            .with_required("name")
            .with_unique("email")
            .with_credential("password"),
        CollectionSchema::new(LEADS).with_required("email"),
    ]
}
