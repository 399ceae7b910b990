//! Error types for the migration engine
//!
//! Every failure the engine can report is a variant of [`MigrationError`],
//! carrying the revision, identifier or direction it concerns so callers can
//! match on it instead of comparing message strings.

use std::fmt;
use std::path::PathBuf;

use crate::migration::Direction;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// The step of an up/down transaction that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStage {
    /// Opening the transaction
    Begin,
    /// Executing the migration's up or down body
    Execute,
    /// Updating the bookkeeping row for the revision
    Bookkeeping,
    /// Committing the transaction
    Commit,
}

impl fmt::Display for TransactionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStage::Begin => write!(f, "begin transaction"),
            TransactionStage::Execute => write!(f, "execute"),
            TransactionStage::Bookkeeping => write!(f, "update migration status"),
            TransactionStage::Commit => write!(f, "commit"),
        }
    }
}

/// Error types for migration operations
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// The source identifier does not look like `0001_name.sql`, or its
    /// revision does not fit in a revision number
    #[error("could not parse {identifier:?} as a migration filename{}", reason_suffix(.reason))]
    Format {
        identifier: String,
        reason: Option<String>,
    },

    /// The up or down body was requested but the source never opened it
    #[error("{identifier} has no {direction} section")]
    SectionMissing {
        identifier: String,
        direction: Direction,
    },

    /// A section line carries a migrate marker without being a directive
    #[error("{identifier} line {line}: migrate directives must start their own line")]
    MisplacedDirective { identifier: String, line: usize },

    /// A descriptor blob carries no usable header
    #[error("descriptor data does not contain required header information")]
    HeaderMissing,

    /// A descriptor blob has a header but its body cannot be decoded
    #[error("descriptor data for {identifier} is corrupt: {reason}")]
    Corrupt { identifier: String, reason: String },

    #[error("cannot register migration with revision {revision}: revision already exists")]
    DuplicateRevision { revision: i32 },

    #[error("revision {revision} was not registered")]
    Unregistered { revision: i32 },

    /// Opening, executing or committing an up/down transaction failed
    #[error("could not {stage} for revision {revision} {direction}: {source}")]
    Transaction {
        revision: i32,
        direction: Direction,
        stage: TransactionStage,
        #[source]
        source: sqlx::Error,
    },

    /// A bookkeeping query outside of an up/down transaction failed
    #[error("database error while {context}: {source}")]
    Database {
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("could not access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Migrations in one directory name different packages
    #[error("migrations declare conflicting packages {first:?} and {second:?}")]
    PackageConflict { first: String, second: String },

    #[error("{package:?} is not a valid module name")]
    InvalidPackage { package: String },
}

fn reason_suffix(reason: &Option<String>) -> String {
    match reason {
        Some(reason) => format!(": {}", reason),
        None => String::new(),
    }
}

impl MigrationError {
    /// Create a filename format error for an identifier that does not match
    pub fn format<S: Into<String>>(identifier: S) -> Self {
        Self::Format {
            identifier: identifier.into(),
            reason: None,
        }
    }

    /// Create an I/O error bound to the path that caused it
    pub fn io<P: Into<PathBuf>>(path: P, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a database error with a short description of what was running
    pub fn database<S: Into<String>>(context: S, source: sqlx::Error) -> Self {
        Self::Database {
            context: context.into(),
            source,
        }
    }

    /// The revision this error concerns, when there is one
    pub fn revision(&self) -> Option<i32> {
        match self {
            MigrationError::DuplicateRevision { revision }
            | MigrationError::Unregistered { revision }
            | MigrationError::Transaction { revision, .. } => Some(*revision),
            _ => None,
        }
    }
}
