//! Migration registry
//!
//! A [`Registry`] holds every migration known to a run, sorted by revision
//! with no duplicates. Generated code registers its embedded descriptors
//! into a registry at startup; the runner then walks it in order.
//!
//! The registry has no internal locking. Build it during single-threaded
//! initialisation, or wrap it in a lock if it has to be shared.

use crate::error::{MigrationError, MigrationResult};
use crate::migration::Migration;

#[derive(Debug, Clone, Default)]
pub struct Registry {
    migrations: Vec<Migration>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the revision 0 bookkeeping migration
    pub fn with_bookkeeping() -> Self {
        Self {
            migrations: vec![Migration::bookkeeping()],
        }
    }

    /// Register a migration, keeping the registry sorted by revision.
    pub fn register(&mut self, migration: Migration) -> MigrationResult<()> {
        let revision = migration.revision();
        let index = self
            .migrations
            .partition_point(|m| m.revision() < revision);

        if self
            .migrations
            .get(index)
            .is_some_and(|m| m.revision() == revision)
        {
            return Err(MigrationError::DuplicateRevision { revision });
        }

        self.migrations.insert(index, migration);
        Ok(())
    }

    /// Create a migration from serialized descriptor data and register it.
    pub fn register_descriptor<B: AsRef<[u8]>>(&mut self, data: B) -> MigrationResult<()> {
        let migration = Migration::from_descriptor(data)?;
        self.register(migration)
    }

    /// The number of registered migrations before `migration`.
    pub fn predecessors(&self, migration: &Migration) -> MigrationResult<usize> {
        let revision = migration.revision();
        let unregistered = || MigrationError::Unregistered { revision };

        if self.migrations.is_empty() {
            return Err(unregistered());
        }

        let mut count = 0;
        for other in &self.migrations {
            if other.revision() == revision {
                break;
            }
            if other.revision() > revision {
                return Err(unregistered());
            }
            count += 1;
        }

        if count == self.migrations.len() {
            return Err(unregistered());
        }
        Ok(count)
    }

    /// The number of registered migrations after `migration`.
    pub fn successors(&self, migration: &Migration) -> MigrationResult<usize> {
        let revision = migration.revision();
        let index = self
            .migrations
            .partition_point(|m| m.revision() < revision);

        match self.migrations.get(index) {
            Some(m) if m.revision() == revision => Ok(self.migrations.len() - index - 1),
            _ => Err(MigrationError::Unregistered { revision }),
        }
    }

    /// Remove every registered migration. Primarily used for testing.
    pub fn reset(&mut self) {
        self.migrations.clear();
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Iterate over the migrations in ascending revision order
    pub fn iter(&self) -> std::slice::Iter<'_, Migration> {
        self.migrations.iter()
    }

    pub fn contains(&self, revision: i32) -> bool {
        self.position(revision).is_some()
    }

    pub fn get(&self, revision: i32) -> Option<&Migration> {
        self.position(revision).map(|i| &self.migrations[i])
    }

    /// Mutable access for state updates; the revision itself stays fixed.
    pub fn get_mut(&mut self, revision: i32) -> Option<&mut Migration> {
        self.position(revision).map(|i| &mut self.migrations[i])
    }

    /// The highest registered revision
    pub fn latest_revision(&self) -> Option<i32> {
        self.migrations.last().map(|m| m.revision())
    }

    fn position(&self, revision: i32) -> Option<usize> {
        self.migrations
            .binary_search_by_key(&revision, |m| m.revision())
            .ok()
    }
}

impl<'a> IntoIterator for &'a Registry {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.migrations.iter()
    }
}
