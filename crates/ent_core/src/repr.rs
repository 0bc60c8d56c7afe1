//! Human-readable entity dumps.

use ent_codec::{Encoder, JsonEncoder, FIELD_NAME_ID};

use crate::ent::Ent;
use crate::error::EntResult;
use crate::fieldset::FieldSet;

/// Options for [`repr`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReprFlags(u8);

impl ReprFlags {
    /// No options.
    pub const NONE: Self = Self(0);
    /// Leave out fields holding an empty, non-numeric value.
    pub const OMIT_EMPTY: Self = Self(1);

    /// Returns true if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Returns the fields of `e` that hold an empty value.
#[must_use]
pub fn fields_with_empty_value(e: &dyn Ent) -> FieldSet {
    e.fields()
        .all
        .iter()
        .filter(|&i| e.is_field_empty(i))
        .fold(FieldSet::EMPTY, FieldSet::with)
}

/// Formats `fields` of `e` as indented, bare-key JSON, led by its version
/// and id.
pub fn repr(e: &dyn Ent, fields: FieldSet, flags: ReprFlags) -> EntResult<String> {
    let fields = if flags.contains(ReprFlags::OMIT_EMPTY) {
        fields.difference(fields_with_empty_value(e))
    } else {
        fields
    };
    let mut c = JsonEncoder::pretty();
    c.begin_ent(e.version());
    c.key(FIELD_NAME_ID);
    c.uint(e.id(), 64);
    e.encode(&mut c, fields);
    c.end_ent();
    let bytes = c.finish()?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Formats every non-empty field of `e`. Used for `Display`.
#[must_use]
pub fn ent_string(e: &dyn Ent) -> String {
    repr(e, e.fields().all, ReprFlags::OMIT_EMPTY).unwrap_or_else(|err| format!("<{err}>"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_ent::{Sample, F_EMAIL, F_NAME, F_TAGS};

    #[test]
    fn empty_fields_detected() {
        let e = Sample::new("", "a@x.com", 0);
        let empty = fields_with_empty_value(&e);
        assert!(empty.has(F_NAME));
        assert!(empty.has(F_TAGS));
        assert!(!empty.has(F_EMAIL));
        assert_eq!(empty.len(), 2);
    }

    #[test]
    fn repr_omits_empty() {
        let mut e = Sample::new("", "a@x.com", 0);
        e.base.set_identity(3, 1);
        let out = ent_string(&e);
        assert_eq!(
            out,
            "{\n  _ver: 1,\n  _id: 3,\n  email: \"a@x.com\",\n  kind: 0,\n  w: 0,\n  h: 0\n}"
        );
    }

    #[test]
    fn repr_keeps_empty_without_flag() {
        let e = Sample::new("", "", 0);
        let out = repr(&e, FieldSet::of(&[F_NAME]), ReprFlags::NONE).unwrap();
        assert_eq!(out, "{\n  _ver: 0,\n  _id: 0,\n  name: \"\"\n}");
    }
}
