//! crmport-migrate - migrate legacy CRM users and leads.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crmport_migrate::{Args, LogFormat, MigrateError, MigrationReport, Orchestrator, ReportFormat};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "crmport-migrate starting");

    let orchestrator = Orchestrator::new(args.to_config());
    let report = match orchestrator.run().await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "migration aborted");
            eprintln!("Error: {}", e);
            return ExitCode::from(e.exit_code());
        }
    };

    if let Err(e) = emit(&report, args.report_format, args.report_file.as_deref()).await {
        tracing::error!(error = %e, "failed to emit report");
        eprintln!("Error: {}", e);
        return ExitCode::from(e.exit_code());
    }

    ExitCode::SUCCESS
}

/// Logs go to stderr so stdout carries only the report.
fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "crmport_migrate=info,crmport_store=info".into());

    let (text, json) = match format {
        LogFormat::Text => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .init();
}

async fn emit(
    report: &MigrationReport,
    format: ReportFormat,
    report_file: Option<&std::path::Path>,
) -> Result<(), MigrateError> {
    println!("{}", report.render(format)?);

    if let Some(path) = report_file {
        tokio::fs::write(path, report.to_json()?)
            .await
            .map_err(|e| MigrateError::Report(format!("cannot write {}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), "report written");
    }

    if !report.failures.is_empty() {
        tracing::warn!(
            errored = report.failures.len(),
            "some records were not migrated; fix them and rerun"
        );
    }
    Ok(())
}
