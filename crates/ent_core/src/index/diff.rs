//! Index diff engine.
//!
//! Given the stored and the new state of an entity, computes the index
//! mutations that move every affected index from reflecting the old values
//! to reflecting the new ones.

use tracing::trace;

use crate::ent::{Ent, EntIndex};
use crate::error::{EntError, EntResult};
use crate::fieldset::FieldSet;
use crate::idset::IdSet;
use crate::index::key::IndexKeyEncoder;

/// One mutation of one index entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageIndexEdit {
    /// The index being edited.
    pub index: &'static EntIndex,
    /// The index key.
    pub key: Vec<u8>,
    /// New postings for `key`. Empty means "delete the entry".
    pub value: IdSet,
    /// True when the edit removes this entity from `key`.
    pub is_cleanup: bool,
}

/// Fetches the current postings of one index key:
/// `(type name, index name, key) -> ids`.
pub type IndexLookup<'a> = dyn FnMut(&str, &str, &[u8]) -> EntResult<IdSet> + 'a;

/// Computes index edits for a create (`prev` is `None`), a delete (`next` is
/// `None`) or an update (both present).
///
/// For creates and deletes `changed` is ignored and every field counts as
/// changed. For updates only indexes over a changed field are considered, and
/// an index whose key is the same before and after is left alone.
///
/// Cleanup edits come first, followed by insert edits, so applying the list
/// in order against a single map is always correct. Unique inserts carry just
/// `{id}`; enforcing uniqueness is up to the backend. Empty keys are never
/// indexed.
///
/// `lookup` is only called for non-unique indexes and may return an empty set
/// when the backend maintains postings natively.
pub fn compute_index_edits(
    lookup: &mut IndexLookup<'_>,
    prev: Option<&dyn Ent>,
    next: Option<&dyn Ent>,
    id: u64,
    changed: FieldSet,
) -> EntResult<Vec<StorageIndexEdit>> {
    let (subject, changed) = match (prev, next) {
        (None, None) => return Ok(Vec::new()),
        (None, Some(n)) => (n, n.fields().all),
        (Some(p), None) => (p, p.fields().all),
        (Some(p), Some(n)) => {
            if p.type_name() != n.type_name() {
                return Err(EntError::type_mismatch(n.type_name(), p.type_name()));
            }
            (n, changed)
        }
    };
    let type_name = subject.type_name();

    let mut cleanups = Vec::new();
    let mut inserts = Vec::new();
    let mut encoder = IndexKeyEncoder::new();

    for x in subject.indexes() {
        if !changed.intersects(x.fields) {
            continue;
        }
        let prev_key = match prev {
            Some(p) => encoder.encode_key(p, x.fields)?,
            None => Vec::new(),
        };
        let next_key = match next {
            Some(n) => encoder.encode_key(n, x.fields)?,
            None => Vec::new(),
        };

        if !prev_key.is_empty() {
            if prev_key == next_key {
                trace!(index = x.name, "index key unchanged");
                continue;
            }
            let value = if x.unique {
                IdSet::new()
            } else {
                let mut ids = lookup(type_name, x.name, &prev_key)?;
                if ids.len() <= 1 {
                    IdSet::new()
                } else {
                    ids.remove(id);
                    ids
                }
            };
            cleanups.push(StorageIndexEdit {
                index: x,
                key: prev_key,
                value,
                is_cleanup: true,
            });
        }

        if !next_key.is_empty() {
            let value = if x.unique {
                IdSet::single(id)
            } else {
                let mut ids = lookup(type_name, x.name, &next_key)?;
                ids.add(id);
                ids
            };
            inserts.push(StorageIndexEdit {
                index: x,
                key: next_key,
                value,
                is_cleanup: false,
            });
        }
    }

    let mut edits = Vec::with_capacity(2 * changed.len());
    edits.append(&mut cleanups);
    edits.append(&mut inserts);
    trace!(type_name, id, edits = edits.len(), "computed index edits");
    Ok(edits)
}

/// A lookup for backends that edit postings natively and never need the
/// current set.
pub fn no_lookup(_type_name: &str, _index: &str, _key: &[u8]) -> EntResult<IdSet> {
    Ok(IdSet::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_ent::{Other, Sample, F_KIND, F_NAME};
    use std::collections::HashMap;

    /// Postings keyed by (index name, key).
    #[derive(Default)]
    struct Postings(HashMap<(String, Vec<u8>), IdSet>);

    impl Postings {
        fn with(mut self, index: &str, key: &[u8], ids: &[u64]) -> Self {
            self.0
                .insert((index.to_string(), key.to_vec()), ids.iter().copied().collect());
            self
        }

        fn lookup(&self) -> impl FnMut(&str, &str, &[u8]) -> EntResult<IdSet> + '_ {
            move |_ty, index, key| {
                Ok(self
                    .0
                    .get(&(index.to_string(), key.to_vec()))
                    .cloned()
                    .unwrap_or_default())
            }
        }
    }

    fn kind_key(kind: i32) -> Vec<u8> {
        (kind as u32).to_be_bytes().to_vec()
    }

    fn summary(edits: &[StorageIndexEdit]) -> Vec<(&'static str, bool, Vec<u64>)> {
        edits
            .iter()
            .map(|e| (e.index.name, e.is_cleanup, e.value.as_slice().to_vec()))
            .collect()
    }

    #[test]
    fn create_indexes_every_field() {
        let postings = Postings::default().with("kind", &kind_key(1), &[4]);
        let mut lookup = postings.lookup();
        let e = Sample::new("bob", "bob@x.com", 1);
        let edits = compute_index_edits(&mut lookup, None, Some(&e), 9, FieldSet::EMPTY).unwrap();
        assert_eq!(
            summary(&edits),
            vec![
                ("email", false, vec![9]),
                ("kind", false, vec![4, 9]),
                ("size", false, vec![9]),
            ]
        );
        assert_eq!(edits[0].key, b"bob@x.com");
        assert_eq!(edits[1].key, kind_key(1));
        assert_eq!(edits[2].key, b"h\xff0\xffw\xff0".to_vec());
    }

    #[test]
    fn create_ignores_changed_fields() {
        let postings = Postings::default();
        let e = Sample::new("bob", "bob@x.com", 1);
        let a = compute_index_edits(&mut postings.lookup(), None, Some(&e), 1, FieldSet::EMPTY).unwrap();
        let b = compute_index_edits(&mut postings.lookup(), None, Some(&e), 1, FieldSet::all(6)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unchanged_keys_produce_no_edits() {
        let postings = Postings::default();
        let prev = Sample::new("bob", "bob@x.com", 1);
        let mut next = prev.clone();
        next.set_email("bob@x.com");
        next.set_kind(1);
        let changed = next.base.dirty();
        let edits =
            compute_index_edits(&mut postings.lookup(), Some(&prev), Some(&next), 1, changed).unwrap();
        assert!(edits.is_empty());
    }

    #[test]
    fn untouched_indexes_are_skipped() {
        let mut calls = 0;
        let mut lookup = |_: &str, _: &str, _: &[u8]| {
            calls += 1;
            Ok(IdSet::new())
        };
        let prev = Sample::new("bob", "a@x.com", 1);
        let mut next = prev.clone();
        next.set_name("robert");
        next.kind = 2; // changed but not marked dirty
        let edits = compute_index_edits(
            &mut lookup,
            Some(&prev),
            Some(&next),
            1,
            FieldSet::EMPTY.with(F_NAME),
        )
        .unwrap();
        assert!(edits.is_empty());
        assert_eq!(calls, 0);
    }

    #[test]
    fn update_moves_unique_entry() {
        let postings = Postings::default();
        let prev = Sample::new("bob", "bob@x.com", 1);
        let mut next = prev.clone();
        next.set_email("bob2@x.com");
        let edits = compute_index_edits(
            &mut postings.lookup(),
            Some(&prev),
            Some(&next),
            1,
            next.base.dirty(),
        )
        .unwrap();
        assert_eq!(edits.len(), 2);
        assert!(edits[0].is_cleanup);
        assert_eq!(edits[0].key, b"bob@x.com");
        assert!(edits[0].value.is_empty());
        assert!(!edits[1].is_cleanup);
        assert_eq!(edits[1].key, b"bob2@x.com");
        assert_eq!(edits[1].value.as_slice(), &[1]);
    }

    #[test]
    fn update_shrinks_shared_posting_list() {
        let postings = Postings::default()
            .with("kind", &kind_key(1), &[1, 2, 3])
            .with("kind", &kind_key(2), &[7]);
        let prev = Sample::new("bob", "bob@x.com", 1);
        let mut next = prev.clone();
        next.set_kind(2);
        let edits = compute_index_edits(
            &mut postings.lookup(),
            Some(&prev),
            Some(&next),
            2,
            next.base.dirty(),
        )
        .unwrap();
        assert_eq!(
            summary(&edits),
            vec![("kind", true, vec![1, 3]), ("kind", false, vec![7, 2])]
        );
    }

    #[test]
    fn last_posting_cleanup_deletes_key() {
        let postings = Postings::default().with("kind", &kind_key(1), &[5]);
        let prev = Sample::new("bob", "bob@x.com", 1);
        let mut next = prev.clone();
        next.set_kind(3);
        let edits = compute_index_edits(
            &mut postings.lookup(),
            Some(&prev),
            Some(&next),
            5,
            FieldSet::EMPTY.with(F_KIND),
        )
        .unwrap();
        assert!(edits[0].is_cleanup);
        assert!(edits[0].value.is_empty());
    }

    #[test]
    fn cleanup_emitted_even_without_postings() {
        let postings = Postings::default();
        let prev = Sample::new("bob", "bob@x.com", 1);
        let mut next = prev.clone();
        next.set_kind(3);
        let edits = compute_index_edits(
            &mut postings.lookup(),
            Some(&prev),
            Some(&next),
            5,
            next.base.dirty(),
        )
        .unwrap();
        assert_eq!(summary(&edits), vec![("kind", true, vec![]), ("kind", false, vec![5])]);
    }

    #[test]
    fn delete_emits_only_cleanups() {
        let postings = Postings::default().with("kind", &kind_key(1), &[1, 2]);
        let prev = Sample::new("bob", "bob@x.com", 1);
        let edits =
            compute_index_edits(&mut postings.lookup(), Some(&prev), None, 2, FieldSet::EMPTY).unwrap();
        assert!(edits.iter().all(|e| e.is_cleanup));
        assert_eq!(
            summary(&edits),
            vec![("email", true, vec![]), ("kind", true, vec![1]), ("size", true, vec![])]
        );
    }

    #[test]
    fn empty_keys_are_not_indexed() {
        let postings = Postings::default();
        let e = Sample::new("anon", "", 1);
        let edits = compute_index_edits(&mut postings.lookup(), None, Some(&e), 1, FieldSet::EMPTY).unwrap();
        assert!(edits.iter().all(|ed| ed.index.name != "email"));
    }

    #[test]
    fn cleanups_precede_inserts_across_indexes() {
        let postings = Postings::default();
        let prev = Sample::new("bob", "bob@x.com", 1);
        let mut next = prev.clone();
        next.set_email("other@x.com");
        next.set_kind(2);
        next.set_size(3, 4);
        let edits = compute_index_edits(
            &mut postings.lookup(),
            Some(&prev),
            Some(&next),
            1,
            next.base.dirty(),
        )
        .unwrap();
        assert_eq!(edits.len(), 6);
        let first_insert = edits.iter().position(|e| !e.is_cleanup).unwrap();
        assert_eq!(first_insert, 3);
        assert!(edits[first_insert..].iter().all(|e| !e.is_cleanup));
    }

    #[test]
    fn mismatched_types_are_rejected() {
        let postings = Postings::default();
        let a = Sample::new("bob", "bob@x.com", 1);
        let b = Other::default();
        let err = compute_index_edits(&mut postings.lookup(), Some(&b), Some(&a), 1, FieldSet::all(6))
            .unwrap_err();
        assert!(matches!(err, EntError::TypeMismatch { .. }));
    }

    #[test]
    fn lookup_errors_propagate() {
        let mut failing = |_: &str, _: &str, _: &[u8]| Err(EntError::backend("down"));
        let e = Sample::new("bob", "bob@x.com", 1);
        let err = compute_index_edits(&mut failing, None, Some(&e), 1, FieldSet::EMPTY).unwrap_err();
        assert_eq!(err, EntError::backend("down"));
    }
}
