//! Migration System
//!
//! Forward-only, file-driven schema migrations:
//!
//! - [`splitter`] turns migration text into executable statements
//! - [`manager`] discovers migration files and generates new ones
//! - [`ledger`] owns the table of applied migrations
//! - [`bootstrap`] creates the target database when it is missing
//! - [`runner`] drives a full run over the components above

pub mod bootstrap;
pub mod definitions;
pub mod ledger;
pub mod manager;
pub mod runner;
pub mod splitter;

pub use bootstrap::DatabaseBootstrapper;
pub use definitions::*;
pub use ledger::MigrationLedger;
pub use manager::{parse_migration_filename, sanitize_migration_name, MigrationManager};
pub use runner::MigrationRunner;
pub use splitter::split_statements;
