//! crmport migrate - one-time migration of legacy CRM data.
//!
//! Moves users and leads from the legacy JSON files into the crmport
//! document store:
//! - backs up the legacy files before any write
//! - imports pre-hashed credentials verbatim
//! - remaps lead assignment from display name to migrated user id
//! - skips records already present, so reruns are safe
//! - isolates per-record failures and reports them
//!
//! # Example
//!
//! ```ignore
//! use crmport_migrate::{MigrationConfig, Orchestrator};
//!
//! let config = MigrationConfig::new("sled:///var/lib/crmport")
//!     .with_legacy_dir("/srv/legacy")
//!     .with_backup_dir("/srv/backups");
//! let report = Orchestrator::new(config).run().await?;
//! println!("{}", report.to_json()?);
//! ```

pub mod backup;
pub mod config;
pub mod error;
pub mod identity;
pub mod leads;
pub mod legacy;
pub mod migrator;
pub mod orchestrator;
pub mod repair;
pub mod report;
pub mod source;
pub mod stats;
pub mod target;
pub mod users;

pub use backup::{BackupEntry, BackupManager, BackupSummary};
pub use config::{Args, LogFormat, MigrationConfig};
pub use error::{CallError, MigrateError, RecordError};
pub use identity::{AmbiguityPolicy, IdentityResolver};
pub use leads::{LeadMigration, LegacyLead};
pub use legacy::LegacyRecord;
pub use migrator::{
    EntityMigration, PhaseOutcome, PreparedWrite, RecordFailure, RecordMigrator, RecordOutcome,
    SkipReason,
};
pub use orchestrator::{Connector, Orchestrator, SledConnector};
pub use repair::{ensure_admin, AdminRepair, DefaultAdmin};
pub use report::{MigrationReport, ReportFormat};
pub use source::SourceLoad;
pub use stats::MigrationStats;
pub use target::{BoundedStore, InsertPath};
pub use users::{LegacyUser, UserMigration};
