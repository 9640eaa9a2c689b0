//! Database bootstrap - create the target database before migrating it
//!
//! The bootstrapper works over its own short-lived connection to the admin
//! database. That connection is closed before the caller opens one to the
//! target database.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::backends::{DatabaseConnection, DatabaseConnector, DatabaseValue};
use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};
use crate::security::{escape_identifier, validate_identifier};

use super::definitions::BootstrapOutcome;

/// Ensures the target database exists
pub struct DatabaseBootstrapper {
    connector: Arc<dyn DatabaseConnector>,
    admin: ConnectionConfig,
}

impl DatabaseBootstrapper {
    /// `admin` must name a database that always exists on the server
    pub fn new(connector: Arc<dyn DatabaseConnector>, admin: ConnectionConfig) -> Self {
        Self { connector, admin }
    }

    pub fn admin_config(&self) -> &ConnectionConfig {
        &self.admin
    }

    /// Create `database` unless the server catalog already lists it
    pub async fn ensure_database(&self, database: &str) -> OrmResult<BootstrapOutcome> {
        let bootstrap_err = |e: OrmError| OrmError::Bootstrap {
            database: database.to_string(),
            source: Box::new(e),
        };

        validate_identifier(database).map_err(bootstrap_err)?;

        let mut conn = self
            .connector
            .connect(&self.admin)
            .await
            .map_err(bootstrap_err)?;

        let outcome = create_if_absent(conn.as_mut(), database).await;
        close_quietly(conn).await;

        let outcome = outcome.map_err(bootstrap_err)?;
        match outcome {
            BootstrapOutcome::Created => {
                tracing::info!(database = %database, "Created target database")
            }
            BootstrapOutcome::AlreadyExists => {
                tracing::debug!(database = %database, "Target database already exists")
            }
        }
        Ok(outcome)
    }

    /// Catalog lookup only; never creates anything
    pub async fn database_exists(&self, database: &str) -> OrmResult<bool> {
        let mut conn = self.connector.connect(&self.admin).await?;
        let exists = lookup_database(conn.as_mut(), database).await;
        close_quietly(conn).await;
        exists
    }

    /// Connect to the admin database and return the server clock
    pub async fn check_connection(&self) -> OrmResult<DateTime<Utc>> {
        let mut conn = self.connector.connect(&self.admin).await?;

        let now = match conn.fetch_optional("SELECT NOW() AS current_time", &[]).await {
            Ok(Some(row)) => row.get_timestamp("current_time").and_then(|ts| {
                ts.ok_or_else(|| OrmError::Query("Server returned NULL for NOW()".to_string()))
            }),
            Ok(None) => Err(OrmError::Query("Server returned no rows for NOW()".to_string())),
            Err(e) => Err(e),
        };

        close_quietly(conn).await;
        now
    }
}

async fn lookup_database(conn: &mut dyn DatabaseConnection, database: &str) -> OrmResult<bool> {
    let row = conn
        .fetch_optional(
            "SELECT datname FROM pg_catalog.pg_database WHERE datname = $1",
            &[DatabaseValue::from(database)],
        )
        .await?;

    Ok(row.is_some())
}

async fn create_if_absent(
    conn: &mut dyn DatabaseConnection,
    database: &str,
) -> OrmResult<BootstrapOutcome> {
    if lookup_database(conn, database).await? {
        return Ok(BootstrapOutcome::AlreadyExists);
    }

    conn.execute(&format!("CREATE DATABASE {}", escape_identifier(database)), &[])
        .await?;

    Ok(BootstrapOutcome::Created)
}

/// Close a connection, logging instead of failing if the close itself errors
pub(crate) async fn close_quietly(conn: Box<dyn DatabaseConnection>) {
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "Failed to close database connection");
    }
}
