//! Core Database Backend Traits
//!
//! The migration engine never talks to a driver directly. It receives a
//! [`DatabaseConnector`] from its caller, opens short-lived connections through
//! it and closes them on every exit path.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::config::ConnectionConfig;
use crate::error::{OrmError, OrmResult};

/// Opens connections to a database server
#[async_trait]
pub trait DatabaseConnector: Send + Sync {
    /// Open a dedicated connection described by `config`
    async fn connect(&self, config: &ConnectionConfig) -> OrmResult<Box<dyn DatabaseConnection>>;
}

/// Abstract database connection trait
///
/// Statements run one at a time, in call order. No implicit transaction is
/// opened around them.
#[async_trait]
pub trait DatabaseConnection: Send {
    /// Execute a statement and return the affected rows count
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> OrmResult<u64>;

    /// Execute a query and return the result rows
    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> OrmResult<Vec<Box<dyn DatabaseRow>>>;

    /// Execute a query and return the first result row
    async fn fetch_optional(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> OrmResult<Option<Box<dyn DatabaseRow>>>;

    /// Close the connection
    async fn close(self: Box<Self>) -> OrmResult<()>;
}

/// Abstract database row trait
pub trait DatabaseRow: Send + Sync {
    /// Get a column value by name
    fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue>;

    /// Get column names
    fn column_names(&self) -> Vec<String>;

    fn get_string(&self, name: &str) -> OrmResult<String> {
        match self.get_by_name(name)? {
            DatabaseValue::String(s) => Ok(s),
            other => Err(type_mismatch(name, "string", &other)),
        }
    }

    fn get_bool(&self, name: &str) -> OrmResult<bool> {
        match self.get_by_name(name)? {
            DatabaseValue::Bool(b) => Ok(b),
            other => Err(type_mismatch(name, "bool", &other)),
        }
    }

    /// Timestamp column as UTC; `TIMESTAMP` columns are interpreted as UTC
    fn get_timestamp(&self, name: &str) -> OrmResult<Option<DateTime<Utc>>> {
        match self.get_by_name(name)? {
            DatabaseValue::Null => Ok(None),
            DatabaseValue::Timestamp(naive) => Ok(Some(naive.and_utc())),
            DatabaseValue::DateTime(dt) => Ok(Some(dt)),
            other => Err(type_mismatch(name, "timestamp", &other)),
        }
    }
}

fn type_mismatch(column: &str, expected: &str, found: &DatabaseValue) -> OrmError {
    OrmError::Query(format!(
        "Column '{}' expected {} but found {:?}",
        column, expected, found
    ))
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    String(String),
    Timestamp(NaiveDateTime),
    DateTime(DateTime<Utc>),
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapRow(HashMap<String, DatabaseValue>);

    impl DatabaseRow for MapRow {
        fn get_by_name(&self, name: &str) -> OrmResult<DatabaseValue> {
            self.0
                .get(name)
                .cloned()
                .ok_or_else(|| OrmError::Query(format!("Column '{}' not found", name)))
        }

        fn column_names(&self) -> Vec<String> {
            self.0.keys().cloned().collect()
        }
    }

    #[test]
    fn test_typed_getters() {
        let executed_at = chrono::NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        let row = MapRow(HashMap::from([
            ("name".to_string(), DatabaseValue::from("1_init.sql")),
            ("exists".to_string(), DatabaseValue::Bool(true)),
            ("executed_at".to_string(), DatabaseValue::Timestamp(executed_at)),
            ("missing_at".to_string(), DatabaseValue::Null),
        ]));

        assert_eq!(row.get_string("name").unwrap(), "1_init.sql");
        assert!(row.get_bool("exists").unwrap());
        assert_eq!(
            row.get_timestamp("executed_at").unwrap(),
            Some(executed_at.and_utc())
        );
        assert_eq!(row.get_timestamp("missing_at").unwrap(), None);
        assert!(row.get_bool("name").is_err());
        assert!(row.get_string("nope").is_err());
    }
}
