//! Database Backend Abstractions
//!
//! The traits the migration engine executes against, and their PostgreSQL
//! implementation.

pub mod core;
pub mod postgres;

pub use self::core::*;
pub use self::postgres::{PostgresConnection, PostgresTransaction};
