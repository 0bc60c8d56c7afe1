//! The entity model.
//!
//! An entity type holds an [`EntBase`] as a named field and implements
//! [`Ent`], delegating identity queries to that field. The remaining trait
//! methods describe the type (name, fields, indexes) and drive the codec
//! protocol; they are normally emitted by a code generator.

use std::any::Any;
use std::fmt;

use ent_codec::{Decoder, Encoder};

use crate::crud;
use crate::error::EntResult;
use crate::fieldset::FieldSet;
use crate::storage::StorageRef;

/// Field names of an entity type, ordered by field index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fields {
    /// Storage names, indexed by field index.
    pub names: &'static [&'static str],
    /// Set holding every field of the type.
    pub all: FieldSet,
}

impl Fields {
    /// Describes a type whose fields are `names`.
    #[must_use]
    pub const fn new(names: &'static [&'static str]) -> Self {
        Self {
            names,
            all: FieldSet::all(names.len()),
        }
    }

    /// Returns the storage name of field `index`.
    #[must_use]
    pub fn name(&self, index: usize) -> Option<&'static str> {
        self.names.get(index).copied()
    }

    /// Returns the index of the field stored as `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| *n == name)
    }
}

/// A secondary index over one or more fields of an entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntIndex {
    /// Index name, unique within its type.
    pub name: &'static str,
    /// Fields the index key is built from.
    pub fields: FieldSet,
    /// Whether a key may map to at most one entity.
    pub unique: bool,
}

impl EntIndex {
    /// Describes an index.
    #[must_use]
    pub const fn new(name: &'static str, fields: FieldSet, unique: bool) -> Self {
        Self {
            name,
            fields,
            unique,
        }
    }
}

/// Returns the union of the fields of all `indexes`.
#[must_use]
pub fn index_fields(indexes: &[EntIndex]) -> FieldSet {
    indexes
        .iter()
        .fold(FieldSet::EMPTY, |acc, x| acc.union(x.fields))
}

/// Identity and change-tracking state shared by every entity.
#[derive(Clone, Default)]
pub struct EntBase {
    id: u64,
    version: u64,
    storage: Option<StorageRef>,
    dirty: FieldSet,
}

impl EntBase {
    /// Entity id; 0 until the entity is created.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stored version; 0 until the entity is created.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Storage the entity was created in or loaded from.
    #[must_use]
    pub fn storage(&self) -> Option<&StorageRef> {
        self.storage.as_ref()
    }

    /// Fields changed since the last load or save.
    #[must_use]
    pub fn dirty(&self) -> FieldSet {
        self.dirty
    }

    /// Marks `field` as changed. Called by field setters.
    pub fn set_field_changed(&mut self, field: usize) {
        self.dirty = self.dirty.with(field);
    }

    /// Clears the changed mark of `field`.
    pub fn clear_field_changed(&mut self, field: usize) {
        self.dirty = self.dirty.without(field);
    }

    /// Returns true if `field` has unsaved changes.
    #[must_use]
    pub fn is_field_changed(&self, field: usize) -> bool {
        self.dirty.has(field)
    }

    /// Records a successful load or create: sets identity, attaches the
    /// storage and clears all changed marks.
    pub fn mark_loaded(&mut self, storage: StorageRef, id: u64, version: u64) {
        self.id = id;
        self.version = version;
        self.storage = Some(storage);
        self.dirty = FieldSet::EMPTY;
    }

    /// Records a successful save.
    pub fn mark_saved(&mut self, version: u64) {
        self.version = version;
        self.dirty = FieldSet::EMPTY;
    }

    /// Sets id and version without touching storage or changed marks.
    pub fn set_identity(&mut self, id: u64, version: u64) {
        self.id = id;
        self.version = version;
    }

    /// Returns the state to that of a never-stored entity.
    pub fn detach(&mut self) {
        *self = Self::default();
    }
}

impl fmt::Debug for EntBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntBase")
            .field("id", &self.id)
            .field("version", &self.version)
            .field("attached", &self.storage.is_some())
            .field("dirty", &self.dirty)
            .finish()
    }
}

/// Upcasting to [`Any`] so boxed entities can be downcast to their type.
pub trait AsAny: Any {
    /// Returns `self` as `&dyn Any`.
    fn as_any(&self) -> &dyn Any;
    /// Converts a boxed value into `Box<dyn Any>`.
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A typed, identity-bearing, versioned persisted record.
pub trait Ent: AsAny + Send + Sync + fmt::Debug {
    /// Shared identity state.
    fn base(&self) -> &EntBase;

    /// Shared identity state, mutably.
    fn base_mut(&mut self) -> &mut EntBase;

    /// Storage partition name of the type.
    fn type_name(&self) -> &'static str;

    /// Returns a new, empty entity of the same type.
    fn new_empty(&self) -> Box<dyn Ent>;

    /// Writes the fields in `fields` to `c`, each as `key(name)` + value.
    fn encode(&self, c: &mut dyn Encoder, fields: FieldSet);

    /// Reads every field present in `c`, returning the `_id` and `_ver`
    /// values found.
    fn decode(&mut self, c: &mut dyn Decoder) -> (u64, u64);

    /// Reads only the fields in `fields`, discarding the rest. Returns the
    /// `_ver` value found.
    fn decode_partial(&mut self, c: &mut dyn Decoder, fields: FieldSet) -> u64;

    /// Secondary indexes of the type, in declaration order.
    fn indexes(&self) -> &'static [EntIndex];

    /// Field metadata of the type.
    fn fields(&self) -> &'static Fields;

    /// Returns true if field `field` holds its type's empty value.
    ///
    /// Numeric and boolean fields never count as empty, since zero and false
    /// are indistinguishable from "unset".
    fn is_field_empty(&self, _field: usize) -> bool {
        false
    }

    /// Entity id; 0 until created.
    fn id(&self) -> u64 {
        self.base().id()
    }

    /// Stored version; 0 until created.
    fn version(&self) -> u64 {
        self.base().version()
    }

    /// Returns true if any field changed since the last load or save.
    fn has_unsaved_changes(&self) -> bool {
        !self.base().dirty().is_empty()
    }

    /// Stores this entity as a new record in `storage`.
    fn create(&mut self, storage: &StorageRef) -> EntResult<()>
    where
        Self: Sized,
    {
        crud::create_ent(self, storage)
    }

    /// Writes pending changes to the storage the entity is attached to.
    fn save(&mut self) -> EntResult<()>
    where
        Self: Sized,
    {
        crud::save_ent(self)
    }

    /// Replaces all fields with their latest stored values.
    fn reload(&mut self) -> EntResult<()>
    where
        Self: Sized,
    {
        crud::reload_ent(self)
    }

    /// Permanently removes the entity from its storage.
    fn delete(&mut self) -> EntResult<()>
    where
        Self: Sized,
    {
        crud::delete_ent(self)
    }
}

/// Downcasts a boxed entity to its concrete type.
pub fn downcast_ent<T: Ent>(e: Box<dyn Ent>) -> Option<Box<T>> {
    e.into_any().downcast::<T>().ok()
}
