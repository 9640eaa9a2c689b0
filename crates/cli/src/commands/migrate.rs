use std::path::PathBuf;

use vtrack_orm::{MigrationManager, MigrationRunResult, MigrationStatus, MigrationStatusEntry};

use super::{migration_config, runner};
use crate::error::CliError;

pub async fn create(name: &str, migrations_dir: Option<PathBuf>) -> Result<(), CliError> {
    let manager = MigrationManager::with_config(migration_config(migrations_dir)?);
    let path = manager.create_migration(name)?;

    println!("✅ Created migration: {}", path.display());
    Ok(())
}

pub async fn run(migrations_dir: Option<PathBuf>) -> Result<(), CliError> {
    let runner = runner(migrations_dir)?;

    println!("🔄 Running migrations against {}", runner.target());
    let result = runner.run_migrations().await?;

    for line in run_summary(&result) {
        println!("{}", line);
    }
    Ok(())
}

pub async fn status(migrations_dir: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let runner = runner(migrations_dir)?;
    let report = runner.status().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Migration Status");
    println!("================");

    if report.is_empty() {
        println!("No migrations found in {}", runner.manager().migrations_dir().display());
        return Ok(());
    }

    for entry in &report {
        println!("  {}", status_line(entry));
    }

    let pending = report.iter().filter(|entry| entry.is_pending()).count();
    println!();
    println!("{} migration(s), {} pending", report.len(), pending);
    Ok(())
}

fn run_summary(result: &MigrationRunResult) -> Vec<String> {
    let mut lines: Vec<String> = result
        .applied_migrations
        .iter()
        .map(|name| format!("  ✓ {}", name))
        .collect();

    if result.applied_count == 0 {
        lines.push(format!(
            "✅ Database is up to date ({} already applied)",
            result.skipped_count
        ));
    } else {
        lines.push(format!(
            "✅ Applied {} migration(s) in {}ms ({} already applied)",
            result.applied_count, result.execution_time_ms, result.skipped_count
        ));
    }
    lines
}

fn status_line(entry: &MigrationStatusEntry) -> String {
    let executed = |at: &Option<chrono::DateTime<chrono::Utc>>| {
        at.map(|ts| ts.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "unknown time".to_string())
    };

    match &entry.status {
        MigrationStatus::Pending => format!("⏳ {}", entry.name),
        MigrationStatus::Applied { executed_at } => {
            format!("✅ {} (applied {})", entry.name, executed(executed_at))
        }
        MigrationStatus::Orphaned { executed_at } => format!(
            "⚠️  {} (applied {}, file missing)",
            entry.name,
            executed(executed_at)
        ),
    }
}
