//! Migration Runner - Executes migrations against the database
//!
//! One run bootstraps the target database, makes sure the ledger exists,
//! discovers migration files and applies every file without a ledger entry,
//! in ordering-key order, over a single connection. The first failure aborts the
//! run. A file whose statements fail is not recorded, so the next run retries
//! it; statements of that file which already succeeded are not undone unless
//! the file brackets itself with `BEGIN` / `COMMIT`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use super::bootstrap::{close_quietly, DatabaseBootstrapper};
use super::definitions::{
    LedgerEntry, Migration, MigrationRunResult, MigrationStatus, MigrationStatusEntry, RunState,
};
use super::ledger::MigrationLedger;
use super::manager::MigrationManager;
use super::splitter::split_statements;
use crate::backends::{DatabaseConnection, DatabaseConnector, PostgresConnector};
use crate::config::{ConnectionConfig, MigrationConfig};
use crate::error::{OrmError, OrmResult};

/// Tracks the state of a single run and logs every transition
struct RunStateMachine {
    state: RunState,
}

impl RunStateMachine {
    fn start() -> Self {
        tracing::debug!(state = %RunState::Bootstrapping, "Migration run started");
        Self {
            state: RunState::Bootstrapping,
        }
    }

    fn advance(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid migration run transition {} -> {}",
            self.state,
            next
        );
        if self.state != next {
            tracing::debug!(from = %self.state, to = %next, "Migration run state change");
        }
        self.state = next;
    }

    fn fail(&mut self, err: OrmError) -> OrmError {
        tracing::error!(state = %self.state, error = %err, "Migration run failed");
        self.advance(RunState::Failed);
        err
    }
}

/// Migration runner that executes migrations against a database
pub struct MigrationRunner {
    manager: MigrationManager,
    ledger: MigrationLedger,
    bootstrapper: DatabaseBootstrapper,
    connector: Arc<dyn DatabaseConnector>,
    target: ConnectionConfig,
}

impl MigrationRunner {
    /// Create a runner for `target`; bootstrap connections use the same server
    /// and credentials with `config.admin_database`
    pub fn new(
        config: MigrationConfig,
        target: ConnectionConfig,
        connector: Arc<dyn DatabaseConnector>,
    ) -> OrmResult<Self> {
        config.validate()?;
        target.validate()?;

        let ledger = MigrationLedger::new(config.migrations_table.clone())?;
        let admin = target.with_database(config.admin_database.clone());
        let bootstrapper = DatabaseBootstrapper::new(connector.clone(), admin);

        Ok(Self {
            manager: MigrationManager::with_config(config),
            ledger,
            bootstrapper,
            connector,
            target,
        })
    }

    /// Create a runner backed by PostgreSQL
    pub fn postgres(config: MigrationConfig, target: ConnectionConfig) -> OrmResult<Self> {
        Self::new(config, target, Arc::new(PostgresConnector::new()))
    }

    /// Get the migration manager
    pub fn manager(&self) -> &MigrationManager {
        &self.manager
    }

    pub fn bootstrapper(&self) -> &DatabaseBootstrapper {
        &self.bootstrapper
    }

    pub fn target(&self) -> &ConnectionConfig {
        &self.target
    }

    /// Run all pending migrations
    pub async fn run_migrations(&self) -> OrmResult<MigrationRunResult> {
        let start_time = Instant::now();
        let mut machine = RunStateMachine::start();

        let bootstrap = self
            .bootstrapper
            .ensure_database(&self.target.database)
            .await
            .map_err(|e| machine.fail(e))?;

        machine.advance(RunState::LedgerReady);
        let mut conn = self
            .connector
            .connect(&self.target)
            .await
            .map_err(|e| {
                machine.fail(OrmError::LedgerInit {
                    table: self.ledger.table().to_string(),
                    source: Box::new(e),
                })
            })?;

        let outcome = self.apply_pending(conn.as_mut(), &mut machine).await;
        close_quietly(conn).await;
        let (applied_migrations, skipped_count) = outcome?;

        machine.advance(RunState::Done);

        let result = MigrationRunResult {
            applied_count: applied_migrations.len(),
            applied_migrations,
            skipped_count,
            execution_time_ms: start_time.elapsed().as_millis(),
            bootstrap,
        };

        tracing::info!(
            applied = result.applied_count,
            skipped = result.skipped_count,
            elapsed_ms = result.execution_time_ms as u64,
            "Migration run complete"
        );
        Ok(result)
    }

    /// Everything after bootstrap, over the target connection.
    ///
    /// Returns the names applied by this run and the number skipped.
    async fn apply_pending(
        &self,
        conn: &mut dyn DatabaseConnection,
        machine: &mut RunStateMachine,
    ) -> OrmResult<(Vec<String>, usize)> {
        self.ledger
            .ensure_ledger(conn)
            .await
            .map_err(|e| machine.fail(e))?;

        machine.advance(RunState::Discovering);
        let migrations = self.manager.load_migrations().map_err(|e| machine.fail(e))?;

        if migrations.is_empty() {
            tracing::info!(
                dir = %self.manager.migrations_dir().display(),
                "No migration files found"
            );
            return Ok((Vec::new(), 0));
        }

        let mut applied = Vec::new();
        let mut skipped = 0;

        for migration in &migrations {
            machine.advance(RunState::Applying);

            let already_applied = self
                .ledger
                .is_applied(conn, &migration.name)
                .await
                .map_err(|e| machine.fail(e))?;

            if already_applied {
                tracing::debug!(migration = %migration.name, "Skipping applied migration");
                skipped += 1;
                continue;
            }

            self.apply_migration(conn, migration)
                .await
                .map_err(|e| machine.fail(e))?;
            applied.push(migration.name.clone());
        }

        Ok((applied, skipped))
    }

    /// Execute one migration's statements in order, then record it
    async fn apply_migration(
        &self,
        conn: &mut dyn DatabaseConnection,
        migration: &Migration,
    ) -> OrmResult<()> {
        let statements = split_statements(&migration.content);
        if statements.is_empty() {
            tracing::debug!(migration = %migration.name, "Migration has no statements");
        }

        for (index, statement) in statements.iter().enumerate() {
            conn.execute(statement, &[]).await.map_err(|e| {
                OrmError::StatementExecution {
                    migration: migration.name.clone(),
                    statement_number: index + 1,
                    statement: statement.clone(),
                    message: e.to_string(),
                }
            })?;
        }

        self.ledger.record_applied(conn, &migration.name).await?;

        tracing::info!(
            migration = %migration.name,
            statements = statements.len(),
            "Applied migration"
        );
        Ok(())
    }

    /// Applied, pending and orphaned migrations.
    ///
    /// Read-only against the database: a missing target database or ledger
    /// reports every file as pending.
    pub async fn status(&self) -> OrmResult<Vec<MigrationStatusEntry>> {
        let migrations = self.manager.load_migrations()?;

        let mut executed: BTreeMap<String, Option<DateTime<Utc>>> =
            if self.bootstrapper.database_exists(&self.target.database).await? {
                let mut conn = self.connector.connect(&self.target).await?;
                let entries = self.read_ledger(conn.as_mut()).await;
                close_quietly(conn).await;
                entries?
                    .into_iter()
                    .map(|entry| (entry.name, entry.executed_at))
                    .collect()
            } else {
                BTreeMap::new()
            };

        let mut report: Vec<MigrationStatusEntry> = migrations
            .into_iter()
            .map(|migration| {
                let status = match executed.remove(&migration.name) {
                    Some(executed_at) => MigrationStatus::Applied { executed_at },
                    None => MigrationStatus::Pending,
                };
                MigrationStatusEntry {
                    name: migration.name,
                    status,
                }
            })
            .collect();

        report.extend(executed.into_iter().map(|(name, executed_at)| {
            MigrationStatusEntry {
                name,
                status: MigrationStatus::Orphaned { executed_at },
            }
        }));

        Ok(report)
    }

    async fn read_ledger(
        &self,
        conn: &mut dyn DatabaseConnection,
    ) -> OrmResult<Vec<LedgerEntry>> {
        if !self.ledger.ledger_exists(conn).await? {
            return Ok(Vec::new());
        }
        self.ledger.applied_entries(conn).await
    }
}
