//! Per-entity migration counters.

use std::ops::Add;

use serde::Serialize;

use crate::migrator::RecordOutcome;

/// Counters for one entity type.
///
/// Values are never mutated in place: recording an outcome or merging two
/// stats yields a new value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MigrationStats {
    /// Records read from the legacy source.
    pub total: u64,
    /// Records written to the target store.
    pub migrated: u64,
    /// Records already present in the target store.
    pub skipped: u64,
    /// Records that failed to transform or insert.
    pub errored: u64,
}

impl MigrationStats {
    /// Stats with all counters at zero.
    pub const fn empty() -> Self {
        Self {
            total: 0,
            migrated: 0,
            skipped: 0,
            errored: 0,
        }
    }

    /// Stats after one more record with the given outcome.
    #[must_use]
    pub fn record(self, outcome: &RecordOutcome) -> Self {
        let mut next = Self {
            total: self.total + 1,
            ..self
        };
        match outcome {
            RecordOutcome::Migrated { .. } => next.migrated += 1,
            RecordOutcome::Skipped { .. } => next.skipped += 1,
            RecordOutcome::Errored(_) => next.errored += 1,
        }
        next
    }

    /// Check `total == migrated + skipped + errored`.
    pub fn is_consistent(&self) -> bool {
        self.total == self.migrated + self.skipped + self.errored
    }
}

impl Add for MigrationStats {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            total: self.total + other.total,
            migrated: self.migrated + other.migrated,
            skipped: self.skipped + other.skipped,
            errored: self.errored + other.errored,
        }
    }
}
