//! Database Backend Abstractions
//!
//! The migration engine depends on the traits in [`core`]; [`postgres`]
//! provides the sqlx-backed implementation used in production.

pub mod core;
pub mod postgres;

pub use self::core::*;
pub use self::postgres::{PostgresConnection, PostgresConnector};
