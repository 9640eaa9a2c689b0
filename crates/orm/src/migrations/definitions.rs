//! Migration Definitions - Core types shared by the migration components

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// File extension of migration files
pub const MIGRATION_EXTENSION: &str = "sql";

/// A migration file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Filename prefix before the first `_`, used only for diagnostics.
    /// Ordering is by the full `name`.
    pub ordering_key: String,
    /// Full filename; the identity recorded in the ledger
    pub name: String,
    /// Human-readable description derived from the filename
    pub description: String,
    /// Location of the file at discovery time
    pub path: PathBuf,
    /// File content at discovery time
    pub content: String,
}

/// A row of the ledger table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub name: String,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Result of a bootstrap check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapOutcome {
    /// The target database was absent and has been created
    Created,
    /// The target database already existed; nothing was issued
    AlreadyExists,
}

/// Result of running migrations
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRunResult {
    /// Number of migrations applied by this run
    pub applied_count: usize,
    /// Names of migrations applied by this run, in application order
    pub applied_migrations: Vec<String>,
    /// Number of migrations skipped because the ledger already had them
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
    /// What the bootstrapper did to the target database
    pub bootstrap: BootstrapOutcome,
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Migration file exists but has no ledger entry
    Pending,
    /// Migration file exists and has a ledger entry
    Applied {
        executed_at: Option<DateTime<Utc>>,
    },
    /// Ledger entry exists but the file is gone
    Orphaned {
        executed_at: Option<DateTime<Utc>>,
    },
}

/// One line of a status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatusEntry {
    pub name: String,
    #[serde(flatten)]
    pub status: MigrationStatus,
}

impl MigrationStatusEntry {
    pub fn is_pending(&self) -> bool {
        matches!(self.status, MigrationStatus::Pending)
    }
}

/// States of a migration run
///
/// `Bootstrapping -> LedgerReady -> Discovering -> Applying* -> Done`, with
/// `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Bootstrapping,
    LedgerReady,
    Discovering,
    Applying,
    Done,
    Failed,
}

impl RunState {
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;

        match (self, next) {
            (Done, _) | (Failed, _) => false,
            (_, Failed) => true,
            (Bootstrapping, LedgerReady) => true,
            (LedgerReady, Discovering) => true,
            (Discovering, Applying) | (Discovering, Done) => true,
            (Applying, Applying) | (Applying, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Bootstrapping => "bootstrapping",
            RunState::LedgerReady => "ledger_ready",
            RunState::Discovering => "discovering",
            RunState::Applying => "applying",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}
