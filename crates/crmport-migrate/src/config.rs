//! Migration configuration.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use crmport_store::ConnectionString;

use crate::error::MigrateError;
use crate::identity::AmbiguityPolicy;
use crate::repair::DefaultAdmin;
use crate::report::ReportFormat;

/// Environment variable holding the target-store connection string.
pub const TARGET_URI_ENV: &str = "CRMPORT_TARGET_URI";

/// Environment variable holding the default administrator password.
pub const ADMIN_PASSWORD_ENV: &str = "CRMPORT_ADMIN_PASSWORD";

/// Default legacy data directory.
pub const DEFAULT_LEGACY_DIR: &str = "./data";

/// Default backup directory.
pub const DEFAULT_BACKUP_DIR: &str = "./backups";

/// Default legacy users file name.
pub const DEFAULT_USERS_FILE: &str = "users.json";

/// Default legacy leads file name.
pub const DEFAULT_LEADS_FILE: &str = "leads.json";

/// Default connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-call store timeout in seconds.
pub const DEFAULT_OP_TIMEOUT_SECS: u64 = 30;

/// Configuration for one migration run.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Target-store connection string. Required.
    pub target_uri: Option<String>,

    /// Directory holding the legacy files.
    pub legacy_dir: PathBuf,

    /// Users file name inside `legacy_dir`.
    pub users_file: String,

    /// Leads file name inside `legacy_dir`.
    pub leads_file: String,

    /// Directory receiving backup copies.
    pub backup_dir: PathBuf,

    /// Timeout for opening and pinging the target store.
    pub connect_timeout: Duration,

    /// Timeout for each target-store call.
    pub op_timeout: Duration,

    /// Tie-break for lead assignment by display name.
    pub assignment_ties: AmbiguityPolicy,

    /// Administrator created by invariant repair.
    pub default_admin: DefaultAdmin,

    /// Evaluate everything but write nothing to the target store.
    pub dry_run: bool,
}

impl MigrationConfig {
    /// Create a configuration targeting the given store.
    pub fn new(target_uri: impl Into<String>) -> Self {
        Self {
            target_uri: Some(target_uri.into()),
            ..Default::default()
        }
    }

    /// Set the legacy data directory.
    pub fn with_legacy_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.legacy_dir = dir.into();
        self
    }

    /// Set the backup directory.
    pub fn with_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.backup_dir = dir.into();
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-call timeout.
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Set the assignment tie-break policy.
    pub fn with_assignment_ties(mut self, policy: AmbiguityPolicy) -> Self {
        self.assignment_ties = policy;
        self
    }

    /// Set the default administrator.
    pub fn with_default_admin(mut self, admin: DefaultAdmin) -> Self {
        self.default_admin = admin;
        self
    }

    /// Enable or disable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Path of the legacy users file.
    pub fn users_path(&self) -> PathBuf {
        self.legacy_dir.join(&self.users_file)
    }

    /// Path of the legacy leads file.
    pub fn leads_path(&self) -> PathBuf {
        self.legacy_dir.join(&self.leads_file)
    }

    /// Check every precondition that needs no I/O and return the parsed
    /// target connection string.
    pub fn validate(&self) -> Result<ConnectionString, MigrateError> {
        if self.users_file.trim().is_empty() || self.leads_file.trim().is_empty() {
            return Err(MigrateError::Config(
                "legacy file names must not be empty".to_string(),
            ));
        }
        // Backup copies are named after the file name alone.
        let users = self.users_path();
        let leads = self.leads_path();
        if users.file_name() == leads.file_name() {
            return Err(MigrateError::Config(format!(
                "users and leads files must have different names (both are {})",
                users.display()
            )));
        }
        self.connection()
    }

    /// Parse the target connection string.
    pub fn connection(&self) -> Result<ConnectionString, MigrateError> {
        let raw = self
            .target_uri
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                MigrateError::Config(format!(
                    "target store connection string is not set (use --target or {})",
                    TARGET_URI_ENV
                ))
            })?;
        ConnectionString::parse(raw).map_err(|e| MigrateError::Config(e.to_string()))
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            target_uri: None,
            legacy_dir: PathBuf::from(DEFAULT_LEGACY_DIR),
            users_file: DEFAULT_USERS_FILE.to_string(),
            leads_file: DEFAULT_LEADS_FILE.to_string(),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            op_timeout: Duration::from_secs(DEFAULT_OP_TIMEOUT_SECS),
            assignment_ties: AmbiguityPolicy::default(),
            default_admin: DefaultAdmin::default(),
            dry_run: false,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Command-line arguments for the migration binary.
#[derive(Parser, Debug)]
#[command(name = "crmport-migrate")]
#[command(version, about = "Migrate legacy CRM users and leads", long_about = None)]
pub struct Args {
    /// Target store connection string (sled://<path> or mem://).
    #[arg(short, long, env = TARGET_URI_ENV)]
    pub target: Option<String>,

    /// Directory holding the legacy JSON files.
    #[arg(short, long, default_value = DEFAULT_LEGACY_DIR)]
    pub legacy_dir: PathBuf,

    /// Legacy users file name.
    #[arg(long, default_value = DEFAULT_USERS_FILE)]
    pub users_file: String,

    /// Legacy leads file name.
    #[arg(long, default_value = DEFAULT_LEADS_FILE)]
    pub leads_file: String,

    /// Directory receiving the pre-migration backup.
    #[arg(short, long, default_value = DEFAULT_BACKUP_DIR)]
    pub backup_dir: PathBuf,

    /// Connect timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
    pub connect_timeout: u64,

    /// Per-call store timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_OP_TIMEOUT_SECS)]
    pub timeout: u64,

    /// How to resolve a lead assigned to a name shared by several users.
    #[arg(long, value_enum, default_value_t = AmbiguityPolicy::Unresolved)]
    pub assignment_ties: AmbiguityPolicy,

    /// Email of the administrator created when none exists.
    #[arg(long, default_value = "admin@crmport.local")]
    pub admin_email: String,

    /// Name of the administrator created when none exists.
    #[arg(long, default_value = "Administrator")]
    pub admin_name: String,

    /// Initial password of the administrator created when none exists.
    #[arg(long, env = ADMIN_PASSWORD_ENV, hide_env_values = true)]
    pub admin_password: Option<String>,

    /// Evaluate the migration without writing to the target store.
    #[arg(long)]
    pub dry_run: bool,

    /// Report format on stdout.
    #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
    pub report_format: ReportFormat,

    /// Also write the JSON report to this file.
    #[arg(long)]
    pub report_file: Option<PathBuf>,

    /// Log format on stderr.
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    /// Convert command-line arguments to a migration configuration.
    pub fn to_config(&self) -> MigrationConfig {
        MigrationConfig {
            target_uri: self.target.clone(),
            legacy_dir: self.legacy_dir.clone(),
            users_file: self.users_file.clone(),
            leads_file: self.leads_file.clone(),
            backup_dir: self.backup_dir.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            op_timeout: Duration::from_secs(self.timeout),
            assignment_ties: self.assignment_ties,
            default_admin: DefaultAdmin {
                email: self.admin_email.clone(),
                name: self.admin_name.clone(),
                password: self.admin_password.clone().filter(|p| !p.is_empty()),
            },
            dry_run: self.dry_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MigrationConfig::default();
        assert!(config.target_uri.is_none());
        assert_eq!(config.users_path(), PathBuf::from("./data/users.json"));
        assert_eq!(config.leads_path(), PathBuf::from("./data/leads.json"));
        assert_eq!(
            config.op_timeout,
            Duration::from_secs(DEFAULT_OP_TIMEOUT_SECS)
        );
        assert_eq!(config.assignment_ties, AmbiguityPolicy::Unresolved);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_missing_connection_is_config_error() {
        for uri in [None, Some(""), Some("   ")] {
            let config = MigrationConfig {
                target_uri: uri.map(str::to_string),
                ..Default::default()
            };
            assert!(matches!(config.connection(), Err(MigrateError::Config(_))));
        }
    }

    #[test]
    fn test_invalid_connection_is_config_error() {
        let config = MigrationConfig::new("mongodb://localhost:27017/crm");
        assert!(matches!(config.connection(), Err(MigrateError::Config(_))));
    }

    #[test]
    fn test_colliding_file_names_rejected() {
        let mut config = MigrationConfig::new("mem://");
        config.leads_file = "users.json".to_string();
        assert!(matches!(config.validate(), Err(MigrateError::Config(_))));

        config.leads_file = "archive/users.json".to_string();
        assert!(matches!(config.validate(), Err(MigrateError::Config(_))));

        config.leads_file = String::new();
        assert!(matches!(config.validate(), Err(MigrateError::Config(_))));

        config.leads_file = DEFAULT_LEADS_FILE.to_string();
        assert_eq!(config.validate().unwrap(), ConnectionString::Memory);
    }

    #[test]
    fn test_validate_checks_connection() {
        let config = MigrationConfig::default();
        assert!(matches!(config.validate(), Err(MigrateError::Config(_))));
    }

    #[test]
    fn test_config_builder() {
        let config = MigrationConfig::new("mem://")
            .with_legacy_dir("/srv/legacy")
            .with_backup_dir("/srv/backups")
            .with_op_timeout(Duration::from_secs(5))
            .with_assignment_ties(AmbiguityPolicy::FirstMatch)
            .with_dry_run(true);

        assert_eq!(config.connection().unwrap(), ConnectionString::Memory);
        assert_eq!(config.users_path(), PathBuf::from("/srv/legacy/users.json"));
        assert_eq!(config.backup_dir, PathBuf::from("/srv/backups"));
        assert_eq!(config.op_timeout, Duration::from_secs(5));
        assert_eq!(config.assignment_ties, AmbiguityPolicy::FirstMatch);
        assert!(config.dry_run);
    }

    #[test]
    fn test_args_into_config() {
        let args = Args::parse_from([
            "crmport-migrate",
            "--target",
            "sled:///tmp/crm",
            "--legacy-dir",
            "/srv/legacy",
            "--assignment-ties",
            "first-match",
            "--admin-password",
            "s3cret",
            "--timeout",
            "7",
        ]);
        let config = args.to_config();
        assert_eq!(config.target_uri.as_deref(), Some("sled:///tmp/crm"));
        assert_eq!(config.legacy_dir, PathBuf::from("/srv/legacy"));
        assert_eq!(config.assignment_ties, AmbiguityPolicy::FirstMatch);
        assert_eq!(config.default_admin.password.as_deref(), Some("s3cret"));
        assert_eq!(config.op_timeout, Duration::from_secs(7));
        assert_eq!(args.report_format, ReportFormat::Json);
    }
}
