//! Migration ledger - the table recording which migrations have been applied
//!
//! The ledger is created lazily on first use and never dropped. Its `name`
//! column is unique; a violation while recording is fatal and is reported as
//! [`OrmError::DuplicateLedgerEntry`].

use crate::backends::{DatabaseConnection, DatabaseValue};
use crate::error::{OrmError, OrmResult};
use crate::security::{escape_identifier, validate_identifier};

use super::definitions::LedgerEntry;

/// Ledger manager bound to one table name
#[derive(Debug, Clone)]
pub struct MigrationLedger {
    table: String,
}

impl MigrationLedger {
    pub fn new(table: impl Into<String>) -> OrmResult<Self> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self { table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Create the ledger table if it does not exist yet.
    ///
    /// Returns `true` when the table was created by this call.
    pub async fn ensure_ledger(&self, conn: &mut dyn DatabaseConnection) -> OrmResult<bool> {
        let init_err = |e: OrmError| OrmError::LedgerInit {
            table: self.table.clone(),
            source: Box::new(e),
        };

        if self.ledger_exists(conn).await.map_err(init_err)? {
            tracing::debug!(table = %self.table, "Ledger table present");
            return Ok(false);
        }

        conn.execute(&self.create_table_sql(), &[])
            .await
            .map_err(init_err)?;

        tracing::info!(table = %self.table, "Created ledger table");
        Ok(true)
    }

    /// Whether the ledger table exists in the connection's current schema
    pub async fn ledger_exists(&self, conn: &mut dyn DatabaseConnection) -> OrmResult<bool> {
        let row = conn
            .fetch_optional(&self.table_exists_sql(), &[DatabaseValue::from(self.table.as_str())])
            .await?;

        match row {
            Some(row) => row.get_bool("exists"),
            None => Ok(false),
        }
    }

    /// Point lookup by migration name
    pub async fn is_applied(&self, conn: &mut dyn DatabaseConnection, name: &str) -> OrmResult<bool> {
        let row = conn
            .fetch_optional(&self.check_migration_sql(), &[DatabaseValue::from(name)])
            .await?;

        Ok(row.is_some())
    }

    /// Record a migration as applied
    pub async fn record_applied(&self, conn: &mut dyn DatabaseConnection, name: &str) -> OrmResult<()> {
        match conn
            .execute(&self.record_migration_sql(), &[DatabaseValue::from(name)])
            .await
        {
            Ok(_) => Ok(()),
            Err(OrmError::UniqueViolation(_)) => Err(OrmError::DuplicateLedgerEntry {
                name: name.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// All ledger rows, ordered by name
    pub async fn applied_entries(&self, conn: &mut dyn DatabaseConnection) -> OrmResult<Vec<LedgerEntry>> {
        let rows = conn.fetch_all(&self.applied_migrations_sql(), &[]).await?;

        rows.iter()
            .map(|row| {
                Ok(LedgerEntry {
                    name: row.get_string("name")?,
                    executed_at: row.get_timestamp("executed_at")?,
                })
            })
            .collect()
    }

    fn table_exists_sql(&self) -> String {
        "SELECT EXISTS (\n    \
            SELECT FROM information_schema.tables\n    \
            WHERE table_schema = current_schema() AND table_name = $1\n\
        ) AS \"exists\""
            .to_string()
    }

    /// SQL to create the ledger table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE {} (\n    \
                id SERIAL PRIMARY KEY,\n    \
                name VARCHAR(255) NOT NULL UNIQUE,\n    \
                executed_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP\n\
            )",
            escape_identifier(&self.table)
        )
    }

    fn check_migration_sql(&self) -> String {
        format!(
            "SELECT id FROM {} WHERE name = $1",
            escape_identifier(&self.table)
        )
    }

    fn record_migration_sql(&self) -> String {
        format!(
            "INSERT INTO {} (name) VALUES ($1)",
            escape_identifier(&self.table)
        )
    }

    fn applied_migrations_sql(&self) -> String {
        format!(
            "SELECT name, executed_at FROM {} ORDER BY name",
            escape_identifier(&self.table)
        )
    }
}
