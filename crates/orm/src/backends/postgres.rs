//! PostgreSQL Backend Implementation
//!
//! Implements the backend traits over a single dedicated `sqlx::PgConnection`
//! per `connect` call. Statements without parameters go over the simple query
//! protocol, so migration text such as `BEGIN` or `COMMIT` runs verbatim.

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgConnectOptions, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Executor, Postgres, Row, TypeInfo};

use super::core::*;
use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};

/// Reported to the server as `application_name`
const APPLICATION_NAME: &str = "vtrack-migrate";

/// PostgreSQL connector
#[derive(Debug, Default, Clone)]
pub struct PostgresConnector;

impl PostgresConnector {
    pub fn new() -> Self {
        Self
    }

    fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.username)
            .application_name(APPLICATION_NAME);

        match &config.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

#[async_trait]
impl DatabaseConnector for PostgresConnector {
    async fn connect(&self, config: &ConnectionConfig) -> OrmResult<Box<dyn DatabaseConnection>> {
        let conn = PgConnection::connect_with(&Self::connect_options(config))
            .await
            .map_err(|e| {
                OrmError::Connection(format!("Failed to connect to {}: {}", config.redacted(), e))
            })?;

        tracing::debug!(server = %config.redacted(), "PostgreSQL connection opened");
        Ok(Box::new(PostgresConnection::new(conn)))
    }
}

/// PostgreSQL connection implementation
pub struct PostgresConnection {
    conn: PgConnection,
}

impl PostgresConnection {
    pub fn new(conn: PgConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl DatabaseConnection for PostgresConnection {
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64> {
        let result = if params.is_empty() {
            (&mut self.conn).execute(sql).await?
        } else {
            bind_all(sqlx::query(sql), params)
                .execute(&mut self.conn)
                .await?
        };

        Ok(result.rows_affected())
    }

    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> OrmResult<Vec<Box<dyn DatabaseRow>>> {
        let rows = bind_all(sqlx::query(sql), params)
            .fetch_all(&mut self.conn)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Box::new(PostgresRow::new(row)) as Box<dyn DatabaseRow>)
            .collect())
    }

    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> OrmResult<Option<Box<dyn DatabaseRow>>> {
        let row = bind_all(sqlx::query(sql), params)
            .fetch_optional(&mut self.conn)
            .await?;

        Ok(row.map(|r| Box::new(PostgresRow::new(r)) as Box<dyn DatabaseRow>))
    }

    async fn close(self: Box<Self>) -> OrmResult<()> {
        let this = *self;
        this.conn
            .close()
            .await
            .map_err(|e| OrmError::Connection(format!("Failed to close connection: {}", e)))
    }
}

/// PostgreSQL row implementation
pub struct PostgresRow {
    row: PgRow,
}

impl PostgresRow {
    pub fn new(row: PgRow) -> Self {
        Self { row }
    }
}

impl DatabaseRow for PostgresRow {
    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue> {
        let index = self
            .row
            .columns()
            .iter()
            .position(|col| col.name() == name)
            .ok_or_else(|| OrmError::Query(format!("Column '{}' not found", name)))?;

        postgres_value_to_database_value(&self.row, index)
    }

    fn column_names(&self) -> Vec<String> {
        self.row
            .columns()
            .iter()
            .map(|col| col.name().to_string())
            .collect()
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &[DatabaseValue],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            DatabaseValue::Null => query.bind(Option::<String>::None),
            DatabaseValue::Bool(b) => query.bind(*b),
            DatabaseValue::Int32(i) => query.bind(*i),
            DatabaseValue::Int64(i) => query.bind(*i),
            DatabaseValue::String(s) => query.bind(s.clone()),
            DatabaseValue::Timestamp(ts) => query.bind(*ts),
            DatabaseValue::DateTime(dt) => query.bind(*dt),
        };
    }
    query
}

/// Convert a PostgreSQL column value to DatabaseValue
fn postgres_value_to_database_value(row: &PgRow, index: usize) -> OrmResult<DatabaseValue> {
    let type_name = row.columns()[index].type_info().name().to_string();

    let decode_err = |e: sqlx::Error| {
        OrmError::Query(format!(
            "Failed to decode column {} of type {}: {}",
            index, type_name, e
        ))
    };

    let value = match type_name.as_str() {
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .map_err(decode_err)?
            .map(DatabaseValue::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)
            .map_err(decode_err)?
            .map(|v| DatabaseValue::Int32(v as i32)),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)
            .map_err(decode_err)?
            .map(DatabaseValue::Int32),
        "INT8" => row
            .try_get::<Option<i64>, _>(index)
            .map_err(decode_err)?
            .map(DatabaseValue::Int64),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .map_err(decode_err)?
            .map(DatabaseValue::Timestamp),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .map_err(decode_err)?
            .map(DatabaseValue::DateTime),
        // TEXT, VARCHAR, NAME and anything else representable as text
        _ => row
            .try_get::<Option<String>, _>(index)
            .map_err(decode_err)?
            .map(DatabaseValue::String),
    };

    Ok(value.unwrap_or(DatabaseValue::Null))
}
