//! Migration filename parsing
//!
//! Migration sources are named `<revision>_<name>.sql` (or with a `-`
//! separator). The revision orders the migration, the name is a label with
//! underscores read as spaces.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{MigrationError, MigrationResult};

static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+)[_-]([\w-]+)\.sql$").expect("migration filename pattern is valid")
});

/// Returns true if the identifier's base name is a migration filename.
pub fn is_migration_filename(identifier: &str) -> bool {
    FILENAME_RE.is_match(base_name(identifier))
}

/// Parse a source identifier into `(name, revision)`.
///
/// Directory components are ignored, so both `0001_users.sql` and
/// `migrations/0001_users.sql` parse to `("users", 1)`.
pub fn parse_filename(identifier: &str) -> MigrationResult<(String, i32)> {
    let filename = base_name(identifier);
    let groups = FILENAME_RE
        .captures(filename)
        .ok_or_else(|| MigrationError::format(filename))?;

    let revision = groups[1]
        .parse::<i32>()
        .map_err(|e| MigrationError::Format {
            identifier: filename.to_string(),
            reason: Some(format!("could not parse {:?} to revision number: {}", &groups[1], e)),
        })?;

    let name = groups[2].replace('_', " ");
    Ok((name, revision))
}

fn base_name(identifier: &str) -> &str {
    identifier
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .unwrap_or(identifier)
}
