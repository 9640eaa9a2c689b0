//! Error types for the migration engine
//!
//! Every fatal condition of a migration run maps to exactly one variant here.
//! Nothing in the engine retries; callers recover by re-running, which is safe
//! because applied migrations are skipped.

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::migrations::definitions::RunState;

/// Result type alias for engine operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for migration and database operations
#[derive(Debug, thiserror::Error)]
pub enum OrmError {
    /// The target database could not be reached or created
    #[error("Bootstrap of database '{database}' failed: {source}")]
    Bootstrap {
        database: String,
        #[source]
        source: Box<OrmError>,
    },

    /// The ledger table could not be reached, verified or created
    #[error("Ledger table '{table}' could not be initialised: {source}")]
    LedgerInit {
        table: String,
        #[source]
        source: Box<OrmError>,
    },

    /// The migrations directory exists but cannot be read
    #[error("Failed to read migrations directory {}: {source}", .path.display())]
    Discovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A statement inside a migration failed; the migration is not recorded
    #[error("Migration {migration} failed at statement {statement_number}: {message}")]
    StatementExecution {
        migration: String,
        /// 1-based position of the failing statement inside the file
        statement_number: usize,
        statement: String,
        message: String,
    },

    /// The ledger already holds an entry for this migration
    #[error("Migration {name} is already recorded in the ledger")]
    DuplicateLedgerEntry { name: String },

    /// Connection could not be opened or closed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query failed at the driver level
    #[error("Query error: {0}")]
    Query(String),

    /// A unique constraint rejected a write
    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    /// Invalid configuration
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Invalid input such as an unsafe identifier or migration name
    #[error("Validation error: {0}")]
    Validation(String),

    /// Filesystem error outside discovery
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl OrmError {
    /// The executor state in which this error aborts a run, if it is one of the
    /// run-level failures
    pub fn phase(&self) -> Option<RunState> {
        match self {
            OrmError::Bootstrap { .. } => Some(RunState::Bootstrapping),
            OrmError::LedgerInit { .. } => Some(RunState::LedgerReady),
            OrmError::Discovery { .. } => Some(RunState::Discovering),
            OrmError::StatementExecution { .. } | OrmError::DuplicateLedgerEntry { .. } => {
                Some(RunState::Applying)
            }
            _ => None,
        }
    }

    /// Whether re-running after this error is expected to make progress
    /// without operator intervention
    pub fn is_retryable(&self) -> bool {
        match self {
            OrmError::Connection(_) => true,
            OrmError::Bootstrap { source, .. } | OrmError::LedgerInit { source, .. } => {
                source.is_retryable()
            }
            _ => false,
        }
    }
}

// Convert from sqlx errors
impl From<sqlx::Error> for OrmError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                OrmError::UniqueViolation(db_err.message().to_string())
            }
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => OrmError::Connection(err.to_string()),
            _ => OrmError::Query(err.to_string()),
        }
    }
}
