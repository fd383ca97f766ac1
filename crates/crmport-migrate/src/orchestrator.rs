//! Migration run sequencing.
//!
//! Order is fixed: preconditions, backup, source parsing, users, identity
//! rebuild, leads, admin repair, report. Nothing touches the target store
//! until the connection is verified and the backup is on disk, and the store
//! is released exactly once after it has been acquired.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use crmport_store::document::now_millis;
use crmport_store::{ConnectionString, SledStore, StoreError, TargetStore, USERS};
use tracing::{error, info};

use crate::backup::BackupManager;
use crate::config::MigrationConfig;
use crate::error::MigrateError;
use crate::identity::IdentityResolver;
use crate::leads::LeadMigration;
use crate::migrator::RecordMigrator;
use crate::repair::{ensure_admin, AdminRepair};
use crate::report::MigrationReport;
use crate::source;
use crate::target::BoundedStore;
use crate::users::UserMigration;

/// Opens target-store connections.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open the store a connection string points at.
    async fn connect(&self, conn: &ConnectionString) -> Result<Box<dyn TargetStore>, StoreError>;
}

/// Connector for the embedded sled store.
#[derive(Debug, Clone, Copy, Default)]
pub struct SledConnector;

#[async_trait]
impl Connector for SledConnector {
    async fn connect(&self, conn: &ConnectionString) -> Result<Box<dyn TargetStore>, StoreError> {
        let conn = conn.clone();
        // sled::open blocks on file locks and recovery.
        let store = tokio::task::spawn_blocking(move || SledStore::connect(&conn))
            .await
            .map_err(|e| StoreError::Unavailable(format!("open task failed: {}", e)))??;
        Ok(Box::new(store))
    }
}

/// Runs one migration.
pub struct Orchestrator<C = SledConnector> {
    config: MigrationConfig,
    connector: C,
}

impl Orchestrator<SledConnector> {
    /// Create an orchestrator for the embedded store.
    pub fn new(config: MigrationConfig) -> Self {
        Self::with_connector(config, SledConnector)
    }
}

impl<C: Connector> Orchestrator<C> {
    /// Create an orchestrator with a custom connector.
    pub fn with_connector(config: MigrationConfig, connector: C) -> Self {
        Self { config, connector }
    }

    /// Run the migration to completion or to the first fatal error.
    pub async fn run(&self) -> Result<MigrationReport, MigrateError> {
        let conn = self.config.validate()?;
        info!(target_store = %conn, dry_run = self.config.dry_run, "migration starting");

        let store = self.acquire(&conn).await?;
        let result = self.run_acquired(store.as_ref()).await;

        match (result, store.close().await) {
            (Ok(report), Ok(())) => Ok(report),
            (Ok(_), Err(e)) => {
                error!(error = %e, "target store release failed");
                Err(MigrateError::Release(e))
            }
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(e)) => {
                error!(error = %e, "target store release failed after fatal error");
                Err(err)
            }
        }
    }

    async fn acquire(&self, conn: &ConnectionString) -> Result<Box<dyn TargetStore>, MigrateError> {
        let timeout = self.config.connect_timeout;
        match tokio::time::timeout(timeout, self.connector.connect(conn)).await {
            Ok(Ok(store)) => Ok(store),
            Ok(Err(e)) => Err(MigrateError::Connect(e.to_string())),
            Err(_) => Err(MigrateError::Connect(timed_out("open", timeout))),
        }
    }

    /// Everything after acquisition; the caller releases the store.
    async fn run_acquired(&self, store: &dyn TargetStore) -> Result<MigrationReport, MigrateError> {
        let started_at = Utc::now();

        let probe = BoundedStore::new(store, self.config.connect_timeout);
        probe
            .ping()
            .await
            .map_err(|e| MigrateError::Connect(e.to_string()))?;

        let users_path = self.config.users_path();
        let leads_path = self.config.leads_path();

        let backup = BackupManager::new(&self.config.backup_dir)
            .snapshot(&[users_path.clone(), leads_path.clone()])
            .await?;

        // Both sources are parsed before the first write.
        let legacy_users = source::read_users(&users_path).await?.into_records();
        let legacy_leads = source::read_leads(&leads_path).await?.into_records();

        let bounded = BoundedStore::new(store, self.config.op_timeout);
        let now = now_millis();

        let users = RecordMigrator::new(UserMigration::new(now), bounded)
            .dry_run(self.config.dry_run)
            .run(&legacy_users)
            .await;

        let resolver =
            IdentityResolver::build(&bounded, USERS, "name", self.config.assignment_ties)
                .await
                .map_err(|source| MigrateError::Store {
                    phase: "identity rebuild",
                    source,
                })?;

        let leads = RecordMigrator::new(LeadMigration::new(&resolver, now), bounded)
            .dry_run(self.config.dry_run)
            .run(&legacy_leads)
            .await;

        let admin = if self.config.dry_run {
            AdminRepair::NotRun
        } else {
            ensure_admin(&bounded, &self.config.default_admin)
                .await
                .map_err(|source| MigrateError::Store {
                    phase: "admin repair",
                    source,
                })?
        };

        let report = MigrationReport::assemble(
            started_at,
            self.config.dry_run,
            backup,
            vec![users, leads],
            admin,
        )?;

        info!(
            migrated = report.totals.migrated,
            skipped = report.totals.skipped,
            errored = report.totals.errored,
            "migration finished"
        );
        Ok(report)
    }
}

fn timed_out(operation: &str, after: Duration) -> String {
    format!("{} timed out after {:?}", operation, after)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refusing;

    #[async_trait]
    impl Connector for Refusing {
        async fn connect(
            &self,
            _conn: &ConnectionString,
        ) -> Result<Box<dyn TargetStore>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    struct Hanging;

    #[async_trait]
    impl Connector for Hanging {
        async fn connect(
            &self,
            _conn: &ConnectionString,
        ) -> Result<Box<dyn TargetStore>, StoreError> {
            std::future::pending().await
        }
    }

    fn config(backup: &tempfile::TempDir) -> MigrationConfig {
        MigrationConfig::new("mem://")
            .with_legacy_dir(backup.path().join("legacy"))
            .with_backup_dir(backup.path().join("backups"))
            .with_connect_timeout(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_connect_failure_is_fatal_before_backup() {
        let dir = tempfile::tempdir().unwrap();
        let err = Orchestrator::with_connector(config(&dir), Refusing)
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Connect(_)));
        assert_eq!(err.exit_code(), 1);
        assert!(!dir.path().join("backups").exists());
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let err = Orchestrator::with_connector(config(&dir), Hanging)
            .run()
            .await
            .unwrap_err();
        match err {
            MigrateError::Connect(reason) => assert!(reason.contains("timed out")),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_memory_store_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("legacy")).unwrap();
        std::fs::write(
            dir.path().join("legacy").join("users.json"),
            r#"[{"email": "a@x.com", "password": "h1", "name": "A"}]"#,
        )
        .unwrap();

        let report = Orchestrator::new(config(&dir)).run().await.unwrap();
        assert_eq!(report.stats(USERS).unwrap().migrated, 1);
        assert!(matches!(report.admin, AdminRepair::Created { .. }));
        assert!(report.totals.is_consistent());
    }
}
