//! Operator-facing migration report.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde::Serialize;

use crate::backup::BackupSummary;
use crate::error::MigrateError;
use crate::migrator::{PhaseOutcome, RecordFailure};
use crate::repair::AdminRepair;
use crate::stats::MigrationStats;

/// Output format for the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Pretty-printed JSON.
    #[default]
    Json,
    /// ASCII tables.
    Table,
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportFormat::Json => write!(f, "json"),
            ReportFormat::Table => write!(f, "table"),
        }
    }
}

/// Counters for one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    /// Target collection.
    pub entity: String,
    /// Phase counters.
    #[serde(flatten)]
    pub stats: MigrationStats,
}

/// Summary of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the report was assembled.
    pub finished_at: DateTime<Utc>,
    /// Whether writes were suppressed.
    pub dry_run: bool,
    /// Backup taken before migration.
    pub backup: BackupSummary,
    /// Per-entity counters, in phase order.
    pub entities: Vec<EntityReport>,
    /// Sum over all entities.
    pub totals: MigrationStats,
    /// Administrator invariant repair.
    pub admin: AdminRepair,
    /// Every errored record.
    pub failures: Vec<RecordFailure>,
}

impl MigrationReport {
    /// Merge phase outcomes into a report, checking the counter invariant.
    pub fn assemble(
        started_at: DateTime<Utc>,
        dry_run: bool,
        backup: BackupSummary,
        phases: Vec<PhaseOutcome>,
        admin: AdminRepair,
    ) -> Result<Self, MigrateError> {
        let mut entities = Vec::with_capacity(phases.len());
        let mut totals = MigrationStats::empty();
        let mut failures = Vec::new();

        for phase in phases {
            if !phase.stats.is_consistent() {
                return Err(MigrateError::Report(format!(
                    "{}: total {} != migrated {} + skipped {} + errored {}",
                    phase.entity,
                    phase.stats.total,
                    phase.stats.migrated,
                    phase.stats.skipped,
                    phase.stats.errored
                )));
            }
            if phase.failures.len() as u64 != phase.stats.errored {
                return Err(MigrateError::Report(format!(
                    "{}: {} errored but {} failures recorded",
                    phase.entity,
                    phase.stats.errored,
                    phase.failures.len()
                )));
            }
            totals = totals + phase.stats;
            failures.extend(phase.failures);
            entities.push(EntityReport {
                entity: phase.entity.to_string(),
                stats: phase.stats,
            });
        }

        Ok(Self {
            started_at,
            finished_at: Utc::now(),
            dry_run,
            backup,
            entities,
            totals,
            admin,
            failures,
        })
    }

    /// Counters for one entity.
    pub fn stats(&self, entity: &str) -> Option<MigrationStats> {
        self.entities
            .iter()
            .find(|e| e.entity == entity)
            .map(|e| e.stats)
    }

    /// Render in the requested format.
    pub fn render(&self, format: ReportFormat) -> Result<String, MigrateError> {
        match format {
            ReportFormat::Json => self.to_json(),
            ReportFormat::Table => Ok(self.to_table()),
        }
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<String, MigrateError> {
        serde_json::to_string_pretty(self).map_err(|e| MigrateError::Report(e.to_string()))
    }

    /// ASCII tables: counters, then failures if any.
    pub fn to_table(&self) -> String {
        let mut table = Table::new();
        table.set_header(vec!["Entity", "Total", "Migrated", "Skipped", "Errored"]);
        let rows = self
            .entities
            .iter()
            .map(|e| (e.entity.as_str(), e.stats))
            .chain(std::iter::once(("(all)", self.totals)));
        for (entity, stats) in rows {
            table.add_row(vec![
                Cell::new(entity),
                Cell::new(stats.total),
                Cell::new(stats.migrated),
                Cell::new(stats.skipped),
                Cell::new(stats.errored),
            ]);
        }

        let mut out = String::new();
        if self.dry_run {
            out.push_str("DRY RUN: nothing was written\n");
        }
        out.push_str(&table.to_string());
        out.push('\n');

        out.push_str(&match &self.admin {
            AdminRepair::Present { count } => format!("Administrators present: {}\n", count),
            AdminRepair::Created { email, .. } => {
                format!("Default administrator created: {}\n", email)
            }
            AdminRepair::Conflict { email } => {
                format!("No administrator: every address derived from {} is taken\n", email)
            }
            AdminRepair::NotRun => "Administrator check not run\n".to_string(),
        });

        if !self.failures.is_empty() {
            let mut failures = Table::new();
            failures.set_header(vec!["Entity", "Index", "Key", "Reason"]);
            for f in &self.failures {
                failures.add_row(vec![
                    Cell::new(&f.entity),
                    Cell::new(f.index),
                    Cell::new(&f.natural_key),
                    Cell::new(&f.reason),
                ]);
            }
            out.push_str(&failures.to_string());
            out.push('\n');
        }
        out
    }
}
