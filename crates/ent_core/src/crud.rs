//! Create, load, save and delete helpers, and index lookups for glue code.

use std::marker::PhantomData;

use ent_codec::Encoder;
use tracing::debug;

use crate::ent::{downcast_ent, Ent, EntIndex};
use crate::error::{EntError, EntResult};
use crate::index::encode_index_key;
use crate::storage::{IdIter, LookupFlags, Storage, StorageRef};

/// Stores `e` as a new entity in `storage` and attaches it.
///
/// Fails with [`EntError::DuplicateEnt`] if `e` already has an id.
pub fn create_ent(e: &mut dyn Ent, storage: &StorageRef) -> EntResult<()> {
    if e.id() != 0 {
        return Err(EntError::DuplicateEnt { id: e.id() });
    }
    let id = storage.create(e, e.fields().all)?;
    debug!(type_name = e.type_name(), id, "created ent");
    e.base_mut().mark_loaded(storage.clone(), id, 1);
    Ok(())
}

/// Loads entity `id` from `storage` into `e` and attaches it.
pub fn load_ent_by_id(e: &mut dyn Ent, storage: &StorageRef, id: u64) -> EntResult<()> {
    if id == 0 {
        return Err(EntError::NotFound);
    }
    let version = storage.load_by_id(e, id)?;
    e.base_mut().mark_loaded(storage.clone(), id, version);
    Ok(())
}

/// Loads entity `id` of type `T`.
pub fn load_by_id<T: Ent + Default>(storage: &StorageRef, id: u64) -> EntResult<T> {
    let mut e = T::default();
    load_ent_by_id(&mut e, storage, id)?;
    Ok(e)
}

/// Replaces the fields of `e` with their stored values, discarding unsaved
/// changes.
pub fn reload_ent(e: &mut dyn Ent) -> EntResult<()> {
    let storage = e.base().storage().cloned().ok_or(EntError::NoStorage)?;
    let id = e.id();
    load_ent_by_id(e, &storage, id)
}

/// Writes the unsaved changes of `e` to its storage.
///
/// Fails with [`EntError::NotChanged`] when there is nothing to save.
pub fn save_ent(e: &mut dyn Ent) -> EntResult<()> {
    let storage = e.base().storage().cloned().ok_or(EntError::NoStorage)?;
    let dirty = e.base().dirty();
    if dirty.is_empty() {
        return Err(EntError::NotChanged);
    }
    let version = storage.save(e, dirty)?;
    debug!(type_name = e.type_name(), id = e.id(), version, "saved ent");
    e.base_mut().mark_saved(version);
    Ok(())
}

/// Removes `e` from its storage and detaches it.
pub fn delete_ent(e: &mut dyn Ent) -> EntResult<()> {
    let storage = e.base().storage().cloned().ok_or(EntError::NoStorage)?;
    storage.delete(e, e.id())?;
    debug!(type_name = e.type_name(), id = e.id(), "deleted ent");
    e.base_mut().detach();
    Ok(())
}

/// Looks up ids by a key of `nfields` values written by `key`.
pub fn find_ids_by_index(
    storage: &dyn Storage,
    type_name: &str,
    index: &EntIndex,
    nfields: usize,
    key: impl FnOnce(&mut dyn Encoder),
) -> EntResult<Vec<u64>> {
    let key = encode_index_key(nfields, key)?;
    storage.find_by_index(type_name, index, &key, 0, LookupFlags::NONE)
}

/// Looks up the single id stored under a one-field key written by `key`.
pub fn find_id_by_index(
    storage: &dyn Storage,
    type_name: &str,
    index: &EntIndex,
    key: impl FnOnce(&mut dyn Encoder),
) -> EntResult<u64> {
    let ids = find_ids_by_index(storage, type_name, index, 1, key)?;
    ids.first().copied().ok_or(EntError::NotFound)
}

/// Looks up the single id stored under an already encoded `key`.
pub fn find_id_by_index_key(
    storage: &dyn Storage,
    type_name: &str,
    index: &EntIndex,
    key: &[u8],
) -> EntResult<u64> {
    let ids = storage.find_by_index(type_name, index, key, 0, LookupFlags::NONE)?;
    ids.first().copied().ok_or(EntError::NotFound)
}

/// Loads every `T` stored under an already encoded `key`.
pub fn load_ents_by_index_key<T: Ent + Default>(
    storage: &StorageRef,
    index: &EntIndex,
    key: &[u8],
    limit: usize,
    flags: LookupFlags,
) -> EntResult<Vec<T>> {
    let loaded = storage.load_by_index(Box::new(T::default()), index, key, limit, flags)?;
    let mut out = Vec::with_capacity(loaded.len());
    for e in loaded {
        let found = e.type_name();
        let mut typed = downcast_ent::<T>(e)
            .ok_or_else(|| EntError::type_mismatch(std::any::type_name::<T>(), found))?;
        let (id, version) = (typed.id(), typed.version());
        typed.base_mut().mark_loaded(storage.clone(), id, version);
        out.push(*typed);
    }
    Ok(out)
}

/// Loads every `T` stored under a key of `nfields` values written by `key`.
pub fn load_ents_by_index<T: Ent + Default>(
    storage: &StorageRef,
    index: &EntIndex,
    nfields: usize,
    key: impl FnOnce(&mut dyn Encoder),
) -> EntResult<Vec<T>> {
    let key = encode_index_key(nfields, key)?;
    load_ents_by_index_key(storage, index, &key, 0, LookupFlags::NONE)
}

/// Loads the single `T` stored under a one-field key written by `key`.
pub fn load_ent_by_index<T: Ent + Default>(
    storage: &StorageRef,
    index: &EntIndex,
    key: impl FnOnce(&mut dyn Encoder),
) -> EntResult<T> {
    let key = encode_index_key(1, key)?;
    load_ent_by_index_key(storage, index, &key)
}

/// Loads the single `T` stored under an already encoded `key`.
pub fn load_ent_by_index_key<T: Ent + Default>(
    storage: &StorageRef,
    index: &EntIndex,
    key: &[u8],
) -> EntResult<T> {
    load_ents_by_index_key(storage, index, key, 1, LookupFlags::NONE)?
        .into_iter()
        .next()
        .ok_or(EntError::NotFound)
}

/// Iterates every stored entity of type `T`.
///
/// Ids that vanish between listing and loading are skipped. Any other error
/// is yielded once and ends the iteration.
pub struct EntIterator<T> {
    ids: IdIter,
    storage: StorageRef,
    done: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for EntIterator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntIterator").field("done", &self.done).finish()
    }
}

/// Returns an iterator over every stored `T`.
pub fn iterate_ents<T: Ent + Default>(storage: &StorageRef) -> EntIterator<T> {
    let type_name = T::default().type_name();
    EntIterator {
        ids: storage.iterate_ids(type_name),
        storage: storage.clone(),
        done: false,
        _marker: PhantomData,
    }
}

impl<T: Ent + Default> Iterator for EntIterator<T> {
    type Item = EntResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            let id = match self.ids.next()? {
                Ok(id) => id,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            };
            match load_by_id::<T>(&self.storage, id) {
                Ok(e) => return Some(Ok(e)),
                Err(EntError::NotFound) => continue,
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
