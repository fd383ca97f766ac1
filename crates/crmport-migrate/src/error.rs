//! Migration error types.
//!
//! [`MigrateError`] is fatal and ends the run. [`RecordError`] belongs to a
//! single legacy record; it is counted and logged and the batch continues.

use std::path::PathBuf;
use std::time::Duration;

use crmport_store::StoreError;
use thiserror::Error;

/// A failed or timed-out call to the target store.
#[derive(Debug, Error)]
pub enum CallError {
    /// The store returned an error.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The call did not finish within the configured timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Store operation name.
        operation: &'static str,
        /// The timeout that elapsed.
        after: Duration,
    },
}

impl CallError {
    /// Whether the store rejected the write on a unique constraint.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, CallError::Store(e) if e.is_unique_violation())
    }
}

/// Fatal migration errors.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The target store could not be opened or did not answer.
    #[error("cannot connect to target store: {0}")]
    Connect(String),

    /// A legacy source file exists but cannot be read or parsed.
    #[error("legacy source {path} is unreadable: {reason}")]
    Source {
        /// The source file.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// A backup copy could not be written.
    #[error("backup of {path} failed: {reason}")]
    Backup {
        /// The file being backed up.
        path: PathBuf,
        /// Why the backup failed.
        reason: String,
    },

    /// A store call outside per-record processing failed.
    #[error("{phase} failed: {source}")]
    Store {
        /// The phase that issued the call.
        phase: &'static str,
        /// The underlying failure.
        #[source]
        source: CallError,
    },

    /// The target store could not be released cleanly.
    #[error("failed to release target store: {0}")]
    Release(#[source] StoreError),

    /// The final report is inconsistent.
    #[error("report invariant violated: {0}")]
    Report(String),
}

impl MigrateError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) => 2,
            _ => 1,
        }
    }
}

/// Failure of a single legacy record.
#[derive(Debug, Error)]
pub enum RecordError {
    /// The legacy fields could not be turned into a target record.
    #[error("invalid legacy record: {0}")]
    Transform(String),

    /// The dedup query or the insert failed.
    #[error("store error: {0}")]
    Store(#[from] CallError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("missing".into()).exit_code(), 2);
        assert_eq!(MigrateError::Connect("refused".into()).exit_code(), 1);
        assert_eq!(
            MigrateError::Backup {
                path: PathBuf::from("users.json"),
                reason: "disk full".into()
            }
            .exit_code(),
            1
        );
    }

    #[test]
    fn test_unique_violation_passthrough() {
        let err = CallError::from(StoreError::UniqueViolation {
            collection: "users".into(),
            field: "email".into(),
            value: "a@x.com".into(),
        });
        assert!(err.is_unique_violation());

        let timeout = CallError::Timeout {
            operation: "insert",
            after: Duration::from_secs(1),
        };
        assert!(!timeout.is_unique_violation());
        assert_eq!(timeout.to_string(), "insert timed out after 1s");
    }

    #[test]
    fn test_store_error_display() {
        let err = MigrateError::Store {
            phase: "identity rebuild",
            source: CallError::Store(StoreError::Closed),
        };
        assert_eq!(err.to_string(), "identity rebuild failed: store is closed");
    }
}
