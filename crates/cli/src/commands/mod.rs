pub mod generate;
pub mod migrate;
pub mod new;
pub mod revision;

use anyhow::{Context, Result};
use tideway::{MigrationConfig, PostgresConnection};

/// Connect to the configured database
pub(crate) async fn connect(config: &MigrationConfig) -> Result<PostgresConnection> {
    let url = config
        .database_url
        .as_deref()
        .context("no database URL: pass --db or set DATABASE_URL")?;

    PostgresConnection::connect(url)
        .await
        .context("could not connect to the database")
}
