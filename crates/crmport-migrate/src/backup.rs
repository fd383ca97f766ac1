//! Pre-migration backup of the legacy files.
//!
//! Copies land in the backup directory as `<stem>-<timestamp>.<ext>` and a
//! `backup-manifest-<timestamp>.json` records each copy's SHA-256. Existing
//! files are never overwritten. Backups are for operators; the migration
//! never reads them back.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::MigrateError;

/// Sortable UTC timestamp used in backup file names.
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

/// One copied file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    /// Original legacy file.
    pub source: PathBuf,
    /// Copy inside the backup directory.
    pub destination: PathBuf,
    /// Size in bytes.
    pub bytes: u64,
    /// Hex-encoded SHA-256 of the content.
    pub sha256: String,
}

/// Result of one snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSummary {
    /// Backup directory.
    pub directory: PathBuf,
    /// Timestamp suffix shared by every file of this snapshot.
    pub timestamp: String,
    /// Files copied.
    pub copied: Vec<BackupEntry>,
    /// Legacy files that did not exist.
    pub missing: Vec<PathBuf>,
    /// Manifest path, when one was written.
    pub manifest: Option<PathBuf>,
}

/// Snapshots legacy files before any write to the target store.
#[derive(Debug, Clone)]
pub struct BackupManager {
    directory: PathBuf,
}

impl BackupManager {
    /// Create a manager writing into `directory`.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// The backup directory.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Copy every file in `sources`, stamped with the current time.
    pub async fn snapshot(&self, sources: &[PathBuf]) -> Result<BackupSummary, MigrateError> {
        self.snapshot_at(sources, Utc::now()).await
    }

    /// Copy every file in `sources`, stamped with `at`.
    pub async fn snapshot_at(
        &self,
        sources: &[PathBuf],
        at: DateTime<Utc>,
    ) -> Result<BackupSummary, MigrateError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| backup_error(&self.directory, e))?;

        let timestamp = at.format(TIMESTAMP_FORMAT).to_string();
        let mut copied = Vec::new();
        let mut missing = Vec::new();

        for source in sources {
            let content = match tokio::fs::read(source).await {
                Ok(content) => content,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!(path = %source.display(), "legacy file not found, nothing to back up");
                    missing.push(source.clone());
                    continue;
                }
                Err(e) => return Err(backup_error(source, e)),
            };

            let destination = self.directory.join(stamped_name(source, &timestamp));
            write_new(&destination, &content)
                .await
                .map_err(|e| backup_error(source, e))?;

            let entry = BackupEntry {
                source: source.clone(),
                destination,
                bytes: content.len() as u64,
                sha256: hex::encode(Sha256::digest(&content)),
            };
            info!(
                source = %entry.source.display(),
                destination = %entry.destination.display(),
                bytes = entry.bytes,
                "legacy file backed up"
            );
            copied.push(entry);
        }

        let mut summary = BackupSummary {
            directory: self.directory.clone(),
            timestamp,
            copied,
            missing,
            manifest: None,
        };

        if !summary.copied.is_empty() {
            let manifest = self
                .directory
                .join(format!("backup-manifest-{}.json", summary.timestamp));
            let body = serde_json::to_vec_pretty(&summary)
                .map_err(|e| backup_error(&manifest, e))?;
            write_new(&manifest, &body)
                .await
                .map_err(|e| backup_error(&manifest, e))?;
            summary.manifest = Some(manifest);
        }

        Ok(summary)
    }
}

/// `users.json` + `20240101T000000000Z` -> `users-20240101T000000000Z.json`.
fn stamped_name(source: &Path, timestamp: &str) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "legacy".to_string());
    match source.extension() {
        Some(ext) => format!("{}-{}.{}", stem, timestamp, ext.to_string_lossy()),
        None => format!("{}-{}", stem, timestamp),
    }
}

/// Write a file that must not exist yet, and sync it.
async fn write_new(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(content).await?;
    file.sync_all().await
}

fn backup_error(path: &Path, reason: impl ToString) -> MigrateError {
    MigrateError::Backup {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
