pub mod db;
pub mod migrate;

use std::path::PathBuf;

use vtrack_orm::{ConnectionConfig, MigrationConfig, MigrationRunner};

use crate::error::CliError;

/// Migration settings from the environment, with `--migrations-dir` applied
pub fn migration_config(migrations_dir: Option<PathBuf>) -> Result<MigrationConfig, CliError> {
    let config = MigrationConfig::from_env()?;
    Ok(match migrations_dir {
        Some(dir) => config.with_migrations_dir(dir),
        None => config,
    })
}

/// Runner for the database described by the environment
pub fn runner(migrations_dir: Option<PathBuf>) -> Result<MigrationRunner, CliError> {
    let config = migration_config(migrations_dir)?;
    let target = ConnectionConfig::from_env()?;

    tracing::debug!(server = %target, dir = %config.migrations_dir.display(), "Resolved configuration");
    Ok(MigrationRunner::postgres(config, target)?)
}
