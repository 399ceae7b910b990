use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tideway::{BookkeepingRecord, MigrationConfig, MigrationConnection};

use super::connect;

/// Show the database's current revision, or the detail of one revision
pub async fn run(config: &MigrationConfig, revision: Option<i32>) -> Result<()> {
    let conn = connect(config).await?;
    let records = conn
        .fetch_bookkeeping()
        .await
        .context("could not read the migrations table; has the database been migrated?")?;
    conn.close().await;

    match revision {
        Some(revision) => match records.iter().find(|r| r.revision == revision) {
            Some(record) => print!("{}", detail(record)),
            None => bail!("revision {} is not recorded in the database", revision),
        },
        None => println!("{}", summary(&records)),
    }
    Ok(())
}

fn summary(records: &[BookkeepingRecord]) -> String {
    let applied = records.iter().filter(|r| r.active).count();
    match records.iter().filter(|r| r.active).max_by_key(|r| r.revision) {
        Some(current) => format!(
            "Current revision: {:04} {} ({} of {} applied)",
            current.revision,
            current.name,
            applied,
            records.len()
        ),
        None => format!("No migrations applied ({} recorded)", records.len()),
    }
}

fn detail(record: &BookkeepingRecord) -> String {
    let timestamp = |t: Option<DateTime<Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    format!(
        "Revision {:04} {}\n  active:  {}\n  applied: {}\n  created: {}\n",
        record.revision,
        record.name,
        if record.active { "yes" } else { "no" },
        timestamp(record.applied),
        timestamp(record.created),
    )
}
