//! Per-record migration.
//!
//! Every legacy record goes `Pending -> Skipped | Migrated | Errored` exactly
//! once per run. The entity-specific parts (typed transform, dedup key,
//! insert path) come from an [`EntityMigration`]; the [`RecordMigrator`]
//! owns the shared sequence and failure isolation.

use crmport_store::{Document, Filter};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::RecordError;
use crate::legacy::{describe, LegacyRecord};
use crate::stats::MigrationStats;
use crate::target::{BoundedStore, InsertPath};

/// A transformed record ready to be written.
#[derive(Debug, Clone)]
pub struct PreparedWrite {
    /// Insert contract to use.
    pub path: InsertPath,
    /// The target document.
    pub doc: Document,
}

/// Entity-specific migration rules.
pub trait EntityMigration {
    /// Typed intermediate built from a legacy record.
    type Record;

    /// Target collection.
    fn collection(&self) -> &'static str;

    /// Validate and default the legacy fields.
    fn prepare(&self, raw: &LegacyRecord) -> Result<Self::Record, RecordError>;

    /// Natural key used in logs and failure reports.
    fn natural_key(&self, record: &Self::Record) -> String;

    /// Filter matching an already-migrated copy of this record.
    fn dedup_filter(&self, record: &Self::Record) -> Filter;

    /// Build the target document and choose the insert path.
    fn into_write(&self, record: Self::Record) -> Result<PreparedWrite, RecordError>;
}

/// Why a record was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The dedup query found a match.
    AlreadyPresent,
    /// The insert hit a unique constraint.
    UniqueConflict,
}

/// Terminal state of one record.
#[derive(Debug)]
pub enum RecordOutcome {
    /// Written to the target store. `id` is `None` on a dry run.
    Migrated {
        /// Identifier assigned by the store.
        id: Option<String>,
    },
    /// Already present; nothing written.
    Skipped {
        /// What detected the existing copy.
        reason: SkipReason,
    },
    /// Failed; nothing written.
    Errored(RecordError),
}

/// A record that ended in `Errored`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    /// Target collection.
    pub entity: String,
    /// Position in the legacy file.
    pub index: usize,
    /// Natural key, or the best available description.
    pub natural_key: String,
    /// Failure reason.
    pub reason: String,
}

/// Result of one entity phase.
#[derive(Debug, Clone)]
pub struct PhaseOutcome {
    /// Target collection.
    pub entity: &'static str,
    /// Phase counters.
    pub stats: MigrationStats,
    /// Errored records, in file order.
    pub failures: Vec<RecordFailure>,
}

/// Runs one entity migration over a legacy collection.
pub struct RecordMigrator<'a, M> {
    migration: M,
    store: BoundedStore<'a>,
    dry_run: bool,
}

impl<'a, M: EntityMigration> RecordMigrator<'a, M> {
    /// Create a migrator writing to the given store.
    pub fn new(migration: M, store: BoundedStore<'a>) -> Self {
        Self {
            migration,
            store,
            dry_run: false,
        }
    }

    /// Evaluate dedup and transforms without writing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Migrate every record in order.
    pub async fn run(&self, records: &[LegacyRecord]) -> PhaseOutcome {
        let entity = self.migration.collection();
        info!(entity, total = records.len(), dry_run = self.dry_run, "phase started");

        let mut stats = MigrationStats::empty();
        let mut failures = Vec::new();

        for (index, raw) in records.iter().enumerate() {
            let (key, outcome) = self.migrate_one(raw).await;
            match &outcome {
                RecordOutcome::Migrated { id } => {
                    debug!(entity, index, key = %key, id = ?id, "record migrated");
                }
                RecordOutcome::Skipped { reason } => {
                    debug!(entity, index, key = %key, reason = ?reason, "record skipped");
                }
                RecordOutcome::Errored(err) => {
                    warn!(entity, index, key = %key, error = %err, "record failed");
                    failures.push(RecordFailure {
                        entity: entity.to_string(),
                        index,
                        natural_key: key.clone(),
                        reason: err.to_string(),
                    });
                }
            }
            stats = stats.record(&outcome);
        }

        info!(
            entity,
            total = stats.total,
            migrated = stats.migrated,
            skipped = stats.skipped,
            errored = stats.errored,
            "phase finished"
        );

        PhaseOutcome {
            entity,
            stats,
            failures,
        }
    }

    /// Migrate one record, returning its natural key and outcome.
    async fn migrate_one(&self, raw: &LegacyRecord) -> (String, RecordOutcome) {
        let record = match self.migration.prepare(raw) {
            Ok(record) => record,
            Err(err) => return (describe(raw), RecordOutcome::Errored(err)),
        };
        let key = self.migration.natural_key(&record);
        let collection = self.migration.collection();

        let filter = self.migration.dedup_filter(&record);
        match self.store.find_one(collection, &filter).await {
            Ok(Some(_)) => {
                return (
                    key,
                    RecordOutcome::Skipped {
                        reason: SkipReason::AlreadyPresent,
                    },
                )
            }
            Ok(None) => {}
            Err(err) => return (key, RecordOutcome::Errored(err.into())),
        }

        let write = match self.migration.into_write(record) {
            Ok(write) => write,
            Err(err) => return (key, RecordOutcome::Errored(err)),
        };

        if self.dry_run {
            return (key, RecordOutcome::Migrated { id: None });
        }

        let outcome = match self.store.insert(write.path, collection, write.doc).await {
            Ok(id) => RecordOutcome::Migrated { id: Some(id) },
            Err(err) if err.is_unique_violation() => RecordOutcome::Skipped {
                reason: SkipReason::UniqueConflict,
            },
            Err(err) => RecordOutcome::Errored(err.into()),
        };
        (key, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crmport_store::{SledStore, StoreConfig, StoreError, TargetStore, USERS};
    use serde_json::{json, Value};
    use std::time::Duration;

    /// Minimal migration: copies `email` into the users collection.
    struct EmailOnly;

    impl EntityMigration for EmailOnly {
        type Record = String;

        fn collection(&self) -> &'static str {
            USERS
        }

        fn prepare(&self, raw: &LegacyRecord) -> Result<String, RecordError> {
            crate::legacy::email(raw).ok_or_else(|| RecordError::Transform("missing email".into()))
        }

        fn natural_key(&self, record: &String) -> String {
            record.clone()
        }

        fn dedup_filter(&self, record: &String) -> Filter {
            Filter::eq("email", record.as_str())
        }

        fn into_write(&self, record: String) -> Result<PreparedWrite, RecordError> {
            let doc = json!({"email": record}).as_object().cloned().unwrap_or_default();
            Ok(PreparedWrite {
                path: InsertPath::Trusted,
                doc,
            })
        }
    }

    /// Delegates to a real store but never reports a dedup match.
    struct BlindStore(SledStore);

    #[async_trait]
    impl TargetStore for BlindStore {
        async fn ping(&self) -> Result<(), StoreError> {
            self.0.ping().await
        }
        async fn find_one(&self, _: &str, _: &Filter) -> Result<Option<Document>, StoreError> {
            Ok(None)
        }
        async fn find(&self, c: &str, f: &Filter) -> Result<Vec<Document>, StoreError> {
            self.0.find(c, f).await
        }
        async fn count(&self, c: &str, f: &Filter) -> Result<u64, StoreError> {
            self.0.count(c, f).await
        }
        async fn insert(&self, c: &str, d: Document) -> Result<String, StoreError> {
            self.0.insert(c, d).await
        }
        async fn trusted_insert(&self, c: &str, d: Document) -> Result<String, StoreError> {
            self.0.trusted_insert(c, d).await
        }
        async fn close(&self) -> Result<(), StoreError> {
            self.0.close().await
        }
    }

    fn records(values: Vec<Value>) -> Vec<LegacyRecord> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_bad_record_does_not_abort_batch() {
        let store = SledStore::open(StoreConfig::temporary()).unwrap();
        let bounded = BoundedStore::new(&store, Duration::from_secs(5));
        let migrator = RecordMigrator::new(EmailOnly, bounded);

        let outcome = migrator
            .run(&records(vec![
                json!({"email": "a@x.com"}),
                json!({"id": 7}),
                json!({"email": "b@x.com"}),
            ]))
            .await;

        assert_eq!(outcome.stats.total, 3);
        assert_eq!(outcome.stats.migrated, 2);
        assert_eq!(outcome.stats.errored, 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);
        assert_eq!(outcome.failures[0].natural_key, "id:7");
        assert!(outcome.failures[0].reason.contains("missing email"));
    }

    #[tokio::test]
    async fn test_duplicate_within_file_is_skipped() {
        let store = SledStore::open(StoreConfig::temporary()).unwrap();
        let bounded = BoundedStore::new(&store, Duration::from_secs(5));
        let outcome = RecordMigrator::new(EmailOnly, bounded)
            .run(&records(vec![
                json!({"email": "a@x.com"}),
                json!({"email": "A@X.com"}),
            ]))
            .await;

        assert_eq!(outcome.stats.migrated, 1);
        assert_eq!(outcome.stats.skipped, 1);
        assert_eq!(store.count(USERS, &Filter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unique_violation_counts_as_skipped() {
        let store = BlindStore(SledStore::open(StoreConfig::temporary()).unwrap());
        let bounded = BoundedStore::new(&store, Duration::from_secs(5));
        let outcome = RecordMigrator::new(EmailOnly, bounded)
            .run(&records(vec![
                json!({"email": "a@x.com"}),
                json!({"email": "a@x.com"}),
            ]))
            .await;

        assert_eq!(outcome.stats.migrated, 1);
        assert_eq!(outcome.stats.skipped, 1);
        assert_eq!(outcome.stats.errored, 0);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = SledStore::open(StoreConfig::temporary()).unwrap();
        let bounded = BoundedStore::new(&store, Duration::from_secs(5));
        let outcome = RecordMigrator::new(EmailOnly, bounded)
            .dry_run(true)
            .run(&records(vec![json!({"email": "a@x.com"})]))
            .await;

        assert_eq!(outcome.stats.migrated, 1);
        assert_eq!(store.count(USERS, &Filter::All).await.unwrap(), 0);
    }
}
