use thiserror::Error;
use vtrack_orm::{ConfigError, OrmError};

/// Errors surfaced by `vtrack` commands
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Migration(#[from] OrmError),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),

    #[error("Failed to render output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Hint printed under the error message, when one applies
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CliError::Config(_) => Some("Check DATABASE_URL or the DB_* environment variables"),
            CliError::Migration(err) if err.is_retryable() => {
                Some("Is the PostgreSQL server running and reachable?")
            }
            CliError::Migration(OrmError::StatementExecution { .. }) => Some(
                "Fix the migration file and run again; statements that already succeeded are not undone",
            ),
            _ => None,
        }
    }
}
