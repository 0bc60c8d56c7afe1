//! The storage contract.

use std::ops::BitOr;
use std::sync::Arc;

use crate::ent::{Ent, EntIndex};
use crate::error::{EntError, EntResult};
use crate::fieldset::FieldSet;

/// Shared handle to a storage backend. Entities keep one to save themselves.
pub type StorageRef = Arc<dyn Storage>;

/// Iterator over the ids of one entity type.
pub type IdIter = Box<dyn Iterator<Item = EntResult<u64>> + Send>;

/// Options for index lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LookupFlags(u8);

impl LookupFlags {
    /// No options.
    pub const NONE: Self = Self(0);
    /// Return results in reverse order.
    pub const REVERSE: Self = Self(1);

    /// Returns true if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for LookupFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Applies `flags` and `limit` (0 = unlimited) to a lookup result.
pub fn limit_ids(ids: &mut Vec<u64>, limit: usize, flags: LookupFlags) {
    if flags.contains(LookupFlags::REVERSE) {
        ids.reverse();
    }
    if limit > 0 && limit < ids.len() {
        ids.truncate(limit);
    }
}

/// A backend that persists entities and maintains their indexes.
///
/// # Write protocol
///
/// `create` and `save` must:
///
/// 1. encode the full entity payload;
/// 2. start an atomic unit of work;
/// 3. unless creating, load the stored index fields and version, failing
///    with [`EntError::NotFound`] when absent and
///    [`EntError::VersionConflict`] when the version differs from
///    `e.version()`;
/// 4. compute index edits with [`crate::index::compute_index_edits`];
/// 5. reject a unique insert whose key maps to a different id with
///    [`EntError::UniqueConflict`];
/// 6. apply cleanups, inserts and the payload as one commit.
///
/// On failure nothing is written. Backends never modify the entity; the
/// CRUD helpers in this crate update its id, version and change marks.
///
/// # Lookups
///
/// A unique lookup with no match fails with [`EntError::NotFound`]; a
/// non-unique lookup with no match returns an empty list.
pub trait Storage: Send + Sync {
    /// Allocates an id and stores `e` as version 1. Returns the new id.
    fn create(&self, e: &dyn Ent, fields: FieldSet) -> EntResult<u64>;

    /// Stores `e` over version `e.version()`. Returns the new version.
    fn save(&self, e: &dyn Ent, fields: FieldSet) -> EntResult<u64>;

    /// Decodes the entity stored under `id` into `e`. Returns its version.
    fn load_by_id(&self, e: &mut dyn Ent, id: u64) -> EntResult<u64>;

    /// Removes entity `id` of `e`'s type together with its index entries.
    fn delete(&self, e: &dyn Ent, id: u64) -> EntResult<()>;

    /// Returns the ids stored under `key` in `index`.
    fn find_by_index(
        &self,
        type_name: &str,
        index: &EntIndex,
        key: &[u8],
        limit: usize,
        flags: LookupFlags,
    ) -> EntResult<Vec<u64>>;

    /// Loads the entities stored under `key` in `index`.
    ///
    /// `e` is decoded into and returned as the first result; further
    /// results are created with [`Ent::new_empty`]. Returned entities have
    /// id and version set but are not attached to a storage.
    fn load_by_index(
        &self,
        e: Box<dyn Ent>,
        index: &EntIndex,
        key: &[u8],
        limit: usize,
        flags: LookupFlags,
    ) -> EntResult<Vec<Box<dyn Ent>>> {
        let ids = self.find_by_index(e.type_name(), index, key, limit, flags)?;
        let mut out: Vec<Box<dyn Ent>> = Vec::with_capacity(ids.len());
        let mut first = Some(e);
        for id in ids {
            let mut next = match first.take() {
                Some(e) => e,
                None => match out.first() {
                    Some(proto) => proto.new_empty(),
                    None => return Err(EntError::backend("lookup lost its prototype entity")),
                },
            };
            let version = self.load_by_id(next.as_mut(), id)?;
            next.base_mut().set_identity(id, version);
            out.push(next);
        }
        Ok(out)
    }

    /// Iterates the ids of every stored entity of `type_name`, in no
    /// particular order.
    fn iterate_ids(&self, type_name: &str) -> IdIter;
}
