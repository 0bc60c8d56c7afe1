//! In-memory storage backend.

use std::sync::atomic::{AtomicU64, Ordering};

use ent_codec::number::{format_base36, parse_base36};
use ent_core::index::{compute_index_edits, StorageIndexEdit};
use ent_core::{
    index_fields, json_decode_ent, json_decode_ent_partial, json_encode_ent, limit_ids, Ent,
    EntError, EntIndex, EntResult, FieldSet, IdIter, IdSet, LookupFlags, Storage,
};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::scoped::{Keyspace, ScopedMap};

/// A thread-safe, in-memory entity store.
///
/// Entities are kept as JSON payloads under `type:<id base36>`; index
/// entries map `type#index:<key>` to an encoded [`IdSet`]. All access goes
/// through one reader-writer lock. Writers stage their changes in a
/// [`ScopedMap`] and merge it only once every check has passed, so a failed
/// write leaves no trace.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use ent_core::{Storage, StorageRef};
/// use ent_storage::MemoryStorage;
///
/// let storage: StorageRef = Arc::new(MemoryStorage::new());
/// assert_eq!(storage.iterate_ids("account").count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    idgen: AtomicU64,
    keyspace: RwLock<Keyspace>,
}

impl MemoryStorage {
    /// Creates an empty store. The first created entity gets id 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store whose first created entity gets id `first`.
    #[must_use]
    pub fn with_first_id(first: u64) -> Self {
        Self {
            idgen: AtomicU64::new(first.saturating_sub(1)),
            keyspace: RwLock::new(Keyspace::new()),
        }
    }

    /// Returns a copy of the raw keyspace.
    ///
    /// Useful for testing and debugging.
    #[must_use]
    pub fn snapshot(&self) -> Keyspace {
        self.keyspace.read().clone()
    }

    /// Number of raw keys (payloads and index entries) stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keyspace.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keyspace.read().is_empty()
    }

    /// Writes `e` under `id` if the stored version is `expected` (0 for a new
    /// entity) and returns the new version.
    fn put_ent(&self, e: &dyn Ent, id: u64, expected: u64, changed: FieldSet) -> EntResult<u64> {
        let type_name = e.type_name();
        let version = expected + 1;
        debug!(type_name, id, version, changed = ?changed, "put ent");

        // The JSON payload has no patch semantics, so always write every field.
        let data = json_encode_ent(e, id, version, e.fields().all)?;
        let key = ent_key(type_name, id);

        let mut keyspace = self.keyspace.write();
        let mut scope = ScopedMap::new(&keyspace);

        let prev = if expected == 0 {
            None
        } else {
            let stored = scope.get(&key).ok_or(EntError::NotFound)?;
            let mut prev = e.new_empty();
            let current =
                json_decode_ent_partial(prev.as_mut(), stored, index_fields(e.indexes()))?;
            if current != expected {
                debug!(type_name, id, expected, current, "version conflict");
                return Err(EntError::VersionConflict { expected });
            }
            Some(prev)
        };

        update_indexes(&mut scope, type_name, prev.as_deref(), Some(e), id, changed)?;
        scope.put(key, data);

        let changes = scope.into_changes();
        changes.apply_to(&mut keyspace);
        Ok(version)
    }
}

impl Storage for MemoryStorage {
    fn create(&self, e: &dyn Ent, fields: FieldSet) -> EntResult<u64> {
        let id = self.idgen.fetch_add(1, Ordering::SeqCst) + 1;
        self.put_ent(e, id, 0, fields)?;
        Ok(id)
    }

    fn save(&self, e: &dyn Ent, fields: FieldSet) -> EntResult<u64> {
        self.put_ent(e, e.id(), e.version(), fields)
    }

    fn load_by_id(&self, e: &mut dyn Ent, id: u64) -> EntResult<u64> {
        let key = ent_key(e.type_name(), id);
        let keyspace = self.keyspace.read();
        let data = keyspace.get(&key).ok_or(EntError::NotFound)?;
        let (_, version) = json_decode_ent(e, data)?;
        Ok(version)
    }

    fn delete(&self, e: &dyn Ent, id: u64) -> EntResult<()> {
        let type_name = e.type_name();
        let key = ent_key(type_name, id);

        let mut keyspace = self.keyspace.write();
        let mut scope = ScopedMap::new(&keyspace);

        let stored = scope.get(&key).ok_or(EntError::NotFound)?;
        if !e.indexes().is_empty() {
            // Clean up against the stored values, not the caller's copy.
            let mut prev = e.new_empty();
            json_decode_ent_partial(prev.as_mut(), stored, index_fields(e.indexes()))?;
            update_indexes(
                &mut scope,
                type_name,
                Some(prev.as_ref()),
                None,
                id,
                e.fields().all,
            )?;
        }
        scope.del(key);

        let changes = scope.into_changes();
        changes.apply_to(&mut keyspace);
        debug!(type_name, id, "deleted");
        Ok(())
    }

    fn find_by_index(
        &self,
        type_name: &str,
        index: &EntIndex,
        key: &[u8],
        limit: usize,
        flags: LookupFlags,
    ) -> EntResult<Vec<u64>> {
        let keyspace = self.keyspace.read();
        let ids = lookup_ids(&keyspace, type_name, index, key)?;
        let mut ids = ids.into_vec();
        limit_ids(&mut ids, limit, flags);
        Ok(ids)
    }

    fn load_by_index(
        &self,
        e: Box<dyn Ent>,
        index: &EntIndex,
        key: &[u8],
        limit: usize,
        flags: LookupFlags,
    ) -> EntResult<Vec<Box<dyn Ent>>> {
        // One read lock for the lookup and every load.
        let keyspace = self.keyspace.read();
        let type_name = e.type_name();
        let mut ids = lookup_ids(&keyspace, type_name, index, key)?.into_vec();
        limit_ids(&mut ids, limit, flags);

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
            let data = keyspace
                .get(&ent_key(type_name, id))
                .ok_or(EntError::NotFound)?;
            let (_, version) = json_decode_ent(next.as_mut(), data)?;
            next.base_mut().set_identity(id, version);
            out.push(next);
        }
        Ok(out)
    }

    fn iterate_ids(&self, type_name: &str) -> IdIter {
        let prefix = format!("{type_name}:").into_bytes();
        let keyspace = self.keyspace.read();
        let ids: Vec<EntResult<u64>> = keyspace
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| {
                let suffix = std::str::from_utf8(&k[prefix.len()..]).ok()?;
                parse_base36(suffix).ok()
            })
            .map(Ok)
            .collect();
        trace!(type_name, count = ids.len(), "iterate ids");
        Box::new(ids.into_iter())
    }
}

/// Computes the index edits for a write and stages them in `scope`.
fn update_indexes(
    scope: &mut ScopedMap<'_>,
    type_name: &str,
    prev: Option<&dyn Ent>,
    next: Option<&dyn Ent>,
    id: u64,
    changed: FieldSet,
) -> EntResult<()> {
    let edits = {
        let view: &ScopedMap<'_> = scope;
        let mut lookup = |t: &str, index: &str, key: &[u8]| -> EntResult<IdSet> {
            read_postings(view.get(&index_key(t, index, key)))
        };
        compute_index_edits(&mut lookup, prev, next, id, changed)?
    };
    trace!(type_name, id, edits = edits.len(), "index edits");

    for StorageIndexEdit {
        index,
        key,
        value,
        is_cleanup,
    } in edits
    {
        let raw_key = index_key(type_name, index.name, &key);
        if value.is_empty() {
            trace!(type_name, index = index.name, "index del");
            scope.del(raw_key);
            continue;
        }
        if !is_cleanup && index.unique {
            let existing = read_postings(scope.get(&raw_key))?;
            if let Some(other) = existing.first() {
                if other == id {
                    continue;
                }
                debug!(type_name, index = index.name, id, other, "unique conflict");
                return Err(EntError::unique_conflict(type_name, index.name));
            }
        }
        scope.put(raw_key, value.encode());
    }
    Ok(())
}

fn lookup_ids(keyspace: &Keyspace, type_name: &str, index: &EntIndex, key: &[u8]) -> EntResult<IdSet> {
    let ids = read_postings(keyspace.get(&index_key(type_name, index.name, key)).map(Vec::as_slice))?;
    if ids.is_empty() && index.unique {
        return Err(EntError::NotFound);
    }
    Ok(ids)
}

fn read_postings(value: Option<&[u8]>) -> EntResult<IdSet> {
    match value {
        Some(data) if !data.is_empty() => IdSet::parse(data),
        _ => Ok(IdSet::new()),
    }
}

fn ent_key(type_name: &str, id: u64) -> Vec<u8> {
    format!("{type_name}:{}", format_base36(id)).into_bytes()
}

fn index_key(type_name: &str, index: &str, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(type_name.len() + index.len() + key.len() + 2);
    out.extend_from_slice(type_name.as_bytes());
    out.push(b'#');
    out.extend_from_slice(index.as_bytes());
    out.push(b':');
    out.extend_from_slice(key);
    out
}
