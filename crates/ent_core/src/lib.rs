//! # ent core
//!
//! Typed, versioned entities ("ents") with secondary indexes, and the
//! storage contract backends implement.
//!
//! This crate provides:
//! - [`Ent`] and [`EntBase`]: the entity capability trait and the identity
//!   state every entity embeds
//! - [`FieldSet`] and [`IdSet`]: changed-field bitsets and index posting lists
//! - [`index`]: order-preserving index keys and the index diff engine
//! - [`Storage`]: the optimistic-concurrency write protocol
//! - CRUD, lookup and iteration helpers used by per-type glue code
//!
//! Backends live in the `ent_storage` crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod crud;
mod ent;
mod error;
mod fieldset;
mod idset;
pub mod index;
mod json;
mod repr;
mod storage;

#[cfg(test)]
mod test_ent;

pub use crud::{
    create_ent, delete_ent, find_id_by_index, find_id_by_index_key, find_ids_by_index,
    iterate_ents, load_by_id, load_ent_by_id, load_ent_by_index, load_ent_by_index_key,
    load_ents_by_index, load_ents_by_index_key, reload_ent, save_ent, EntIterator,
};
pub use ent::{downcast_ent, index_fields, AsAny, Ent, EntBase, EntIndex, Fields};
pub use error::{EntError, EntResult};
pub use fieldset::{FieldSet, MAX_FIELDS};
pub use idset::IdSet;
pub use json::{
    json_decode, json_decode_ent, json_decode_ent_partial, json_encode, json_encode_ent,
    json_encode_unsaved,
};
pub use repr::{ent_string, fields_with_empty_value, repr, ReprFlags};
pub use storage::{limit_ids, IdIter, LookupFlags, Storage, StorageRef};
