//! Copy-on-write overlay over a shared keyspace.

use std::collections::BTreeMap;

/// The byte-keyed map backing [`crate::MemoryStorage`].
pub type Keyspace = BTreeMap<Vec<u8>, Vec<u8>>;

/// A write scope layered on a [`Keyspace`].
///
/// Reads fall through to the outer map on a local miss; writes and deletes
/// stay local until [`ScopedMap::into_changes`] hands them out to be applied.
/// Dropping the scope discards them.
#[derive(Debug)]
pub struct ScopedMap<'a> {
    outer: &'a Keyspace,
    local: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> ScopedMap<'a> {
    /// Opens an empty scope over `outer`.
    #[must_use]
    pub fn new(outer: &'a Keyspace) -> Self {
        Self {
            outer,
            local: BTreeMap::new(),
        }
    }

    /// Returns the value of `key`, preferring local writes.
    #[must_use]
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        match self.local.get(key) {
            Some(local) => local.as_deref(),
            None => self.outer.get(key).map(Vec::as_slice),
        }
    }

    /// Sets `key` to `value` in this scope.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.local.insert(key, Some(value));
    }

    /// Deletes `key` in this scope.
    pub fn del(&mut self, key: Vec<u8>) {
        self.local.insert(key, None);
    }

    /// Number of keys written or deleted in this scope.
    #[must_use]
    pub fn len(&self) -> usize {
        self.local.len()
    }

    /// Returns true if nothing was written in this scope.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Closes the scope, returning its writes.
    #[must_use]
    pub fn into_changes(self) -> Changes {
        Changes(self.local)
    }
}

/// Writes collected by a closed [`ScopedMap`].
#[derive(Debug, Default)]
pub struct Changes(BTreeMap<Vec<u8>, Option<Vec<u8>>>);

impl Changes {
    /// Applies every write and delete to `target`.
    pub fn apply_to(self, target: &mut Keyspace) {
        for (key, value) in self.0 {
            match value {
                Some(value) => {
                    target.insert(key, value);
                }
                None => {
                    target.remove(&key);
                }
            }
        }
    }
}
