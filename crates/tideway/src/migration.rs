//! The migration entity
//!
//! A [`Migration`] combines the metadata parsed from its filename, its
//! descriptor (the up/down SQL), and the state the database knows about it.
//! Revision 0 is reserved for the migration that creates the bookkeeping
//! table itself; application migrations start at revision 1.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::backends::BookkeepingRecord;
use crate::descriptor::{ParsedDescriptor, SerializedDescriptor};
use crate::error::{MigrationError, MigrationResult};
use crate::filename::parse_filename;

/// Revision of the migration that manages the bookkeeping table
pub const BOOKKEEPING_REVISION: i32 = 0;

const CREATE_BOOKKEEPING_TABLE: &str = "\
CREATE TABLE IF NOT EXISTS migrations (
    revision INTEGER PRIMARY KEY,
    name TEXT,
    active BOOLEAN DEFAULT false,
    applied TIMESTAMP WITH TIME ZONE,
    created TIMESTAMP WITH TIME ZONE DEFAULT now()
);";

const DROP_BOOKKEEPING_TABLE: &str = "DROP TABLE IF EXISTS migrations;";

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Apply the migration (run UP statements)
    Up,
    /// Rollback the migration (run DOWN statements)
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A single reversible schema change.
///
/// The revision is fixed at construction: registries keep migrations sorted
/// by it, so it cannot be changed afterwards.
#[derive(Debug, Clone)]
pub struct Migration {
    revision: i32,
    name: String,
    pub(crate) active: bool,
    pub(crate) applied: Option<DateTime<Utc>>,
    pub(crate) created: Option<DateTime<Utc>>,
    descriptor: ParsedDescriptor,
    synchronized: bool,
}

impl Migration {
    /// Create a migration from its parts. The migration starts inactive and
    /// unsynchronized.
    pub fn new<S: Into<String>>(revision: i32, name: S, descriptor: ParsedDescriptor) -> Self {
        Self {
            revision,
            name: name.into(),
            active: false,
            applied: None,
            created: None,
            descriptor,
            synchronized: false,
        }
    }

    /// The revision 0 migration that creates the `migrations` table.
    pub fn bookkeeping() -> Self {
        let descriptor = ParsedDescriptor::new(
            "0000_migrations.sql",
            "",
            Some(CREATE_BOOKKEEPING_TABLE.to_string()),
            Some(DROP_BOOKKEEPING_TABLE.to_string()),
        );
        Self::new(BOOKKEEPING_REVISION, "migrations", descriptor)
    }

    /// Parse a migration from its source identifier and directive-annotated SQL.
    pub fn from_source(identifier: &str, text: &str) -> MigrationResult<Self> {
        let (name, revision) = parse_filename(identifier)?;
        let source = Path::new(identifier)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or(identifier);
        let descriptor = ParsedDescriptor::parse(source, text)?;
        Ok(Self::new(revision, name, descriptor))
    }

    /// Open a migration SQL file and parse it.
    pub fn open<P: AsRef<Path>>(path: P) -> MigrationResult<Self> {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| MigrationError::format(path.display().to_string()))?;

        // Reject bad names before touching the filesystem
        parse_filename(filename)?;

        let text = std::fs::read_to_string(path).map_err(|e| MigrationError::io(path, e))?;
        Self::from_source(filename, &text)
    }

    /// Create a migration from serialized descriptor data, as embedded by
    /// generated code. The header is checked before the bodies are decoded.
    pub fn from_descriptor<B: AsRef<[u8]>>(data: B) -> MigrationResult<Self> {
        let blob = SerializedDescriptor::from_bytes(data.as_ref());
        let (name, revision) = blob.name_and_revision()?;
        let descriptor = blob.decode()?;
        Ok(Self::new(revision, name, descriptor))
    }

    pub fn revision(&self) -> i32 {
        self.revision
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the migration is part of the active schema
    pub fn active(&self) -> bool {
        self.active
    }

    /// When the migration was last applied, if it is active
    pub fn applied(&self) -> Option<DateTime<Utc>> {
        self.applied
    }

    /// When the bookkeeping row for this migration was created
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created
    }

    /// True if the state of this migration was read from the database
    /// rather than only parsed from source.
    pub fn synchronized(&self) -> bool {
        self.synchronized
    }

    /// Whether this is the migration that manages the bookkeeping table
    pub fn is_bookkeeping(&self) -> bool {
        self.revision == BOOKKEEPING_REVISION
    }

    pub fn descriptor(&self) -> &ParsedDescriptor {
        &self.descriptor
    }

    /// SQL that applies the migration
    pub fn up_sql(&self) -> MigrationResult<&str> {
        self.descriptor.up()
    }

    /// SQL that rolls the migration back
    pub fn down_sql(&self) -> MigrationResult<&str> {
        self.descriptor.down()
    }

    /// The package tag from the descriptor, empty if it has none
    pub fn package(&self) -> &str {
        self.descriptor.package()
    }

    /// Copy database state from a bookkeeping row.
    pub(crate) fn synchronize(&mut self, record: &BookkeepingRecord) {
        self.active = record.active;
        self.applied = if record.active { record.applied } else { None };
        self.created = record.created;
        self.synchronized = true;
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04} {}", self.revision, self.name)
    }
}
