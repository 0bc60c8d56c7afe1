//! Bitsets over an entity's field indices.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Maximum number of fields an entity type may declare.
pub const MAX_FIELDS: usize = 64;

/// A set of field indices, one bit per field.
///
/// Used both for an entity's unsaved-change bits and for the fields an index
/// depends on.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FieldSet(u64);

impl FieldSet {
    /// The empty set.
    pub const EMPTY: Self = Self(0);

    /// Creates a set from its raw bits.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Returns the set of the first `n` field indices.
    #[must_use]
    pub const fn all(n: usize) -> Self {
        if n >= MAX_FIELDS {
            Self(u64::MAX)
        } else {
            Self((1u64 << n) - 1)
        }
    }

    /// Creates a set from a list of field indices.
    #[must_use]
    pub const fn of(indices: &[usize]) -> Self {
        let mut bits = 0u64;
        let mut i = 0;
        while i < indices.len() {
            bits |= 1 << indices[i];
            i += 1;
        }
        Self(bits)
    }

    /// Returns a copy with `field` added. Indices at or past [`MAX_FIELDS`]
    /// are ignored.
    #[must_use]
    pub const fn with(self, field: usize) -> Self {
        if field < MAX_FIELDS {
            Self(self.0 | (1 << field))
        } else {
            self
        }
    }

    /// Returns a copy with `field` removed. Indices at or past
    /// [`MAX_FIELDS`] are ignored.
    #[must_use]
    pub const fn without(self, field: usize) -> Self {
        if field < MAX_FIELDS {
            Self(self.0 & !(1 << field))
        } else {
            self
        }
    }

    /// Returns true if `field` is in the set.
    #[must_use]
    pub const fn has(self, field: usize) -> bool {
        field < MAX_FIELDS && (self.0 & (1 << field)) != 0
    }

    /// Returns true if the sets share at least one field.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        (self.0 & other.0) != 0
    }

    /// Returns the union of both sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns the fields of `self` that are not in `other`.
    #[must_use]
    pub const fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    /// Number of fields in the set.
    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Returns true if no field is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterates field indices in ascending order.
    pub fn iter(self) -> impl Iterator<Item = usize> {
        let mut bits = self.0;
        std::iter::from_fn(move || {
            if bits == 0 {
                return None;
            }
            let i = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            Some(i)
        })
    }
}

impl BitOr for FieldSet {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for FieldSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FieldSet {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FieldSet({:#b})", self.0)
    }
}
