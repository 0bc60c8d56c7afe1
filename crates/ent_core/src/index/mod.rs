//! Secondary index maintenance.
//!
//! - [`key`]: canonical, order-preserving index keys
//! - [`diff`]: computing index edits from an old/new entity pair

pub mod diff;
pub mod key;

pub use diff::{compute_index_edits, no_lookup, IndexLookup, StorageIndexEdit};
pub use key::{encode_index_key, IndexKeyEncoder, KEY_SEPARATOR};
