//! Migration descriptors
//!
//! A migration source is plain SQL annotated with directive comments:
//!
//! ```sql
//! -- package: accounts
//! -- migrate: up
//! CREATE TABLE users (id SERIAL PRIMARY KEY);
//! -- migrate: down
//! DROP TABLE users;
//! ```
//!
//! [`ParsedDescriptor`] is the structured form of such a source: its
//! identifier, package tag, and up/down bodies with the directive lines
//! removed. [`SerializedDescriptor`] is the compact binary form that gets
//! embedded in generated code; it can be read back without the original
//! file being present.

use std::io::{BufRead, BufReader, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, MigrationResult};
use crate::filename::parse_filename;
use crate::migration::Direction;

/// Directive line setting the package tag
pub const PACKAGE_DIRECTIVE: &str = "-- package:";
/// Directive line opening the up section
pub const UP_DIRECTIVE: &str = "-- migrate: up";
/// Directive line opening the down section
pub const DOWN_DIRECTIVE: &str = "-- migrate: down";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Directive<'a> {
    Package(&'a str),
    Migrate(Direction),
}

/// Recognise a directive line. Surrounding whitespace is ignored but the
/// keywords are case-sensitive. A migrate keyword may be followed by
/// whitespace or a trailing `--` comment, which is discarded.
fn directive(line: &str) -> Option<Directive<'_>> {
    let comment = line.trim().strip_prefix("--")?.trim_start();

    if let Some(package) = comment.strip_prefix("package:") {
        return Some(Directive::Package(package.trim()));
    }

    let rest = comment.strip_prefix("migrate:")?.trim_start();
    [("up", Direction::Up), ("down", Direction::Down)]
        .into_iter()
        .find_map(|(keyword, direction)| {
            let tail = rest.strip_prefix(keyword)?;
            let ends = tail.is_empty() || tail.starts_with(char::is_whitespace) || tail.starts_with("--");
            ends.then_some(Directive::Migrate(direction))
        })
}

fn has_migrate_marker(line: &str) -> bool {
    line.contains(UP_DIRECTIVE) || line.contains(DOWN_DIRECTIVE)
}

/// Join section lines, dropping blank lines at either end.
fn trim_body(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());

    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

/// The structured form of a migration source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDescriptor {
    source: String,
    package: String,
    up: Option<String>,
    down: Option<String>,
}

impl ParsedDescriptor {
    /// Build a descriptor from already separated parts.
    pub fn new<S, P>(source: S, package: P, up: Option<String>, down: Option<String>) -> Self
    where
        S: Into<String>,
        P: Into<String>,
    {
        Self {
            source: source.into(),
            package: package.into(),
            up,
            down,
        }
    }

    /// Split directive-annotated SQL into its package tag and up/down bodies.
    ///
    /// Lines before the first `-- migrate:` directive are header only and are
    /// dropped. When the package directive appears more than once the last
    /// one wins. Opening a section a second time appends to it.
    ///
    /// A section line that contains `-- migrate: up` or `-- migrate: down`
    /// without being a directive fails with `MisplacedDirective`, so neither
    /// body ever holds a marker.
    pub fn parse<S: Into<String>>(source: S, text: &str) -> MigrationResult<Self> {
        let source = source.into();
        let mut package = String::new();
        let mut up: Option<Vec<&str>> = None;
        let mut down: Option<Vec<&str>> = None;
        let mut current: Option<Direction> = None;

        for (index, line) in text.lines().enumerate() {
            match directive(line) {
                Some(Directive::Package(name)) => package = name.to_string(),
                Some(Directive::Migrate(direction)) => {
                    match direction {
                        Direction::Up => up.get_or_insert_with(Vec::new),
                        Direction::Down => down.get_or_insert_with(Vec::new),
                    };
                    current = Some(direction);
                }
                None => {
                    let section = match current {
                        Some(Direction::Up) => up.get_or_insert_with(Vec::new),
                        Some(Direction::Down) => down.get_or_insert_with(Vec::new),
                        None => continue,
                    };
                    if has_migrate_marker(line) {
                        return Err(MigrationError::MisplacedDirective {
                            identifier: source,
                            line: index + 1,
                        });
                    }
                    section.push(line);
                }
            }
        }

        Ok(Self {
            source,
            package,
            up: up.map(|lines| trim_body(&lines)),
            down: down.map(|lines| trim_body(&lines)),
        })
    }

    /// The source identifier (a migration filename)
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The package tag, empty when the source had no package directive
    pub fn package(&self) -> &str {
        &self.package
    }

    /// SQL that applies the migration
    pub fn up(&self) -> MigrationResult<&str> {
        self.sql(Direction::Up)
    }

    /// SQL that rolls the migration back
    pub fn down(&self) -> MigrationResult<&str> {
        self.sql(Direction::Down)
    }

    /// SQL for the given direction, or `SectionMissing` if the source never
    /// opened that section.
    pub fn sql(&self, direction: Direction) -> MigrationResult<&str> {
        let body = match direction {
            Direction::Up => self.up.as_deref(),
            Direction::Down => self.down.as_deref(),
        };

        body.ok_or_else(|| MigrationError::SectionMissing {
            identifier: self.source.clone(),
            direction,
        })
    }

    /// The source identifier and the revision it names.
    pub fn info(&self) -> MigrationResult<(String, i32)> {
        if self.source.is_empty() {
            return Err(MigrationError::HeaderMissing);
        }
        let (_, revision) = parse_filename(&self.source)?;
        Ok((self.source.clone(), revision))
    }

    /// Compress into the binary form.
    pub fn encode(&self) -> MigrationResult<SerializedDescriptor> {
        let header = Header {
            source: self.source.clone(),
            package: self.package.clone(),
        };
        let body = Body {
            up: self.up.clone(),
            down: self.down.clone(),
        };

        let corrupt = |reason: String| MigrationError::Corrupt {
            identifier: self.source.clone(),
            reason,
        };

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        for part in [
            serde_json::to_vec(&header).map_err(|e| corrupt(e.to_string()))?,
            serde_json::to_vec(&body).map_err(|e| corrupt(e.to_string()))?,
        ] {
            encoder
                .write_all(&part)
                .and_then(|_| encoder.write_all(b"\n"))
                .map_err(|e| corrupt(format!("compression failed: {}", e)))?;
        }

        let bytes = encoder
            .finish()
            .map_err(|e| corrupt(format!("compression failed: {}", e)))?;
        Ok(SerializedDescriptor(bytes))
    }
}

impl TryFrom<&SerializedDescriptor> for ParsedDescriptor {
    type Error = MigrationError;

    fn try_from(value: &SerializedDescriptor) -> Result<Self, Self::Error> {
        value.decode()
    }
}

impl TryFrom<&ParsedDescriptor> for SerializedDescriptor {
    type Error = MigrationError;

    fn try_from(value: &ParsedDescriptor) -> Result<Self, Self::Error> {
        value.encode()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    source: String,
    #[serde(default)]
    package: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Body {
    #[serde(default)]
    up: Option<String>,
    #[serde(default)]
    down: Option<String>,
}

/// The compressed binary form of a descriptor.
///
/// The blob is a gzip stream holding two JSON lines: a header with the
/// source identifier and package, then the up/down bodies. Reading the
/// header alone is enough to identify the migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedDescriptor(Vec<u8>);

impl SerializedDescriptor {
    pub fn from_bytes<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    fn reader(&self) -> BufReader<GzDecoder<&[u8]>> {
        BufReader::new(GzDecoder::new(self.0.as_slice()))
    }

    fn read_header<R: BufRead>(reader: &mut R) -> MigrationResult<Header> {
        let mut line = String::new();
        match reader.read_line(&mut line) {
            Ok(n) if n > 0 => {}
            _ => return Err(MigrationError::HeaderMissing),
        }

        let header: Header =
            serde_json::from_str(&line).map_err(|_| MigrationError::HeaderMissing)?;
        if header.source.is_empty() {
            return Err(MigrationError::HeaderMissing);
        }
        Ok(header)
    }

    /// The source identifier and revision, read from the header without
    /// decoding the SQL bodies.
    pub fn info(&self) -> MigrationResult<(String, i32)> {
        let header = Self::read_header(&mut self.reader())?;
        let (_, revision) = parse_filename(&header.source)?;
        Ok((header.source, revision))
    }

    /// The migration name and revision named by the header.
    pub(crate) fn name_and_revision(&self) -> MigrationResult<(String, i32)> {
        let header = Self::read_header(&mut self.reader())?;
        parse_filename(&header.source)
    }

    /// Decompress back into the structured form.
    pub fn decode(&self) -> MigrationResult<ParsedDescriptor> {
        let mut reader = self.reader();
        let header = Self::read_header(&mut reader)?;

        let mut line = String::new();
        reader.read_line(&mut line).map_err(|e| MigrationError::Corrupt {
            identifier: header.source.clone(),
            reason: e.to_string(),
        })?;
        let body: Body = serde_json::from_str(&line).map_err(|e| MigrationError::Corrupt {
            identifier: header.source.clone(),
            reason: e.to_string(),
        })?;

        Ok(ParsedDescriptor {
            source: header.source,
            package: header.package,
            up: body.up,
            down: body.down,
        })
    }
}

impl AsRef<[u8]> for SerializedDescriptor {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for SerializedDescriptor {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for SerializedDescriptor {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}
