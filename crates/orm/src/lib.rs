//! # vtrack-orm: Migration engine for the vehicle tracker database
//!
//! Forward-only, file-driven schema migrations for PostgreSQL. A run makes
//! sure the target database exists, creates the ledger table on first use,
//! discovers `.sql` files in the migrations directory and applies every file
//! the ledger does not list yet, in ordering-key order.
//!
//! The engine never opens a global pool. Callers hand it a
//! [`DatabaseConnector`](backends::DatabaseConnector); every connection it
//! opens through that connector is closed before the operation returns.

pub mod backends;
pub mod config;
pub mod error;
pub mod migrations;
pub mod security;

#[cfg(test)]
mod testing;


// Re-export core traits and types
pub use backends::{DatabaseConnection, DatabaseConnector, PostgresConnector};
pub use config::{mask_database_url, ConfigError, ConnectionConfig, MigrationConfig};
pub use error::{OrmError, OrmResult};
pub use migrations::*;
