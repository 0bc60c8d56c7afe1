//! Posting lists of entity ids.

use std::fmt;
use std::str::FromStr;

use crate::error::{EntError, EntResult};

/// A collection of entity ids with set semantics.
///
/// Insertion order is kept, which makes lookups on backends that store
/// postings as opaque values return ids in creation order. The canonical
/// encoding is decimal ids separated by single spaces (`"1 2 3"`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet(Vec<u64>);

impl IdSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Creates a set holding exactly `id`.
    #[must_use]
    pub fn single(id: u64) -> Self {
        Self(vec![id])
    }

    /// Adds `id` unless already present. Returns true if it was added.
    pub fn add(&mut self, id: u64) -> bool {
        if self.contains(id) {
            return false;
        }
        self.0.push(id);
        true
    }

    /// Removes `id` if present. Returns true if it was removed.
    pub fn remove(&mut self, id: u64) -> bool {
        match self.0.iter().position(|&v| v == id) {
            Some(i) => {
                self.0.remove(i);
                true
            }
            None => false,
        }
    }

    /// Returns true if `id` is in the set.
    #[must_use]
    pub fn contains(&self, id: u64) -> bool {
        self.0.contains(&id)
    }

    /// Number of ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the set holds no ids.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the first id, if any.
    #[must_use]
    pub fn first(&self) -> Option<u64> {
        self.0.first().copied()
    }

    /// Iterates ids in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        self.0.iter().copied()
    }

    /// Returns the ids as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    /// Consumes the set, returning its ids.
    #[must_use]
    pub fn into_vec(self) -> Vec<u64> {
        self.0
    }

    /// Sorts ids in ascending order.
    pub fn sort(&mut self) {
        self.0.sort_unstable();
    }

    /// Encodes the set in its canonical textual form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    /// Parses the canonical textual form. Empty input is the empty set.
    pub fn parse(data: &[u8]) -> EntResult<Self> {
        let text = std::str::from_utf8(data).map_err(|e| EntError::InvalidIdSet {
            data: String::from_utf8_lossy(data).into_owned(),
            reason: e.to_string(),
        })?;
        text.parse()
    }
}

impl fmt::Display for IdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

impl FromStr for IdSet {
    type Err = EntError;

    fn from_str(s: &str) -> EntResult<Self> {
        let mut ids = Self::new();
        if s.is_empty() {
            return Ok(ids);
        }
        for chunk in s.split(' ') {
            let id = chunk.parse::<u64>().map_err(|e| EntError::InvalidIdSet {
                data: s.to_string(),
                reason: e.to_string(),
            })?;
            ids.add(id);
        }
        Ok(ids)
    }
}

impl FromIterator<u64> for IdSet {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        let mut ids = Self::new();
        for id in iter {
            ids.add(id);
        }
        ids
    }
}

impl From<IdSet> for Vec<u64> {
    fn from(ids: IdSet) -> Self {
        ids.0
    }
}
