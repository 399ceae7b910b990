//! # tideway: SQL migrations for PostgreSQL
//!
//! Migrations are plain SQL files named `<revision>_<name>.sql`, split into
//! up and down sections by `-- migrate: up` / `-- migrate: down` comments.
//! The crate parses them, embeds them into generated Rust code as compressed
//! descriptors, keeps them in an ordered [`Registry`], and applies or rolls
//! them back one transaction at a time, recording each revision's state in a
//! `migrations` table.
//!
//! ```rust,ignore
//! use tideway::{MigrateOptions, Migrator, PostgresConnection, Registry};
//!
//! let conn = PostgresConnection::connect(&database_url).await?;
//! let mut registry = Registry::with_bookkeeping();
//! migrations::accounts::register(&mut registry)?;
//!
//! let report = Migrator::new(&mut registry, &conn)
//!     .migrate(MigrateOptions::default())
//!     .await?;
//! ```

pub mod backends;
pub mod codegen;
pub mod config;
pub mod descriptor;
pub mod error;
mod executor;
pub mod filename;
pub mod loader;
pub mod migration;
pub mod registry;
pub mod runner;

pub use backends::{
    BookkeepingRecord, DatabaseValue, MigrationConnection, MigrationTransaction, PostgresConnection,
    PostgresTransaction,
};
pub use config::MigrationConfig;
pub use descriptor::{ParsedDescriptor, SerializedDescriptor};
pub use error::{MigrationError, MigrationResult, TransactionStage};
pub use filename::{is_migration_filename, parse_filename};
pub use migration::{Direction, Migration, BOOKKEEPING_REVISION};
pub use registry::Registry;
pub use runner::{sync, MigrateOptions, MigrationStatus, Migrator, RunReport};
