//! JSON encoding of whole entities.

use ent_codec::{encode_json_ent, Decoder, JsonDecoder};

use crate::ent::Ent;
use crate::error::EntResult;
use crate::fieldset::FieldSet;

/// Encodes `fields` of `e` as a payload stamped with `id` and `version`.
pub fn json_encode_ent(e: &dyn Ent, id: u64, version: u64, fields: FieldSet) -> EntResult<Vec<u8>> {
    Ok(encode_json_ent(id, version, |c| e.encode(c, fields))?)
}

/// Decodes a full payload into `e`, returning the `(id, version)` it holds.
pub fn json_decode_ent(e: &mut dyn Ent, data: &[u8]) -> EntResult<(u64, u64)> {
    let mut c = JsonDecoder::new(data);
    let mut found = (0, 0);
    if c.dict_header() != 0 {
        found = e.decode(&mut c);
    }
    c.finish()?;
    Ok(found)
}

/// Decodes only `fields` of a payload into `e`, returning its version.
pub fn json_decode_ent_partial(e: &mut dyn Ent, data: &[u8], fields: FieldSet) -> EntResult<u64> {
    let mut c = JsonDecoder::new(data);
    let mut version = 0;
    if c.dict_header() != 0 {
        version = e.decode_partial(&mut c, fields);
    }
    c.finish()?;
    Ok(version)
}

/// Encodes every field of `e` as JSON.
pub fn json_encode(e: &dyn Ent) -> EntResult<Vec<u8>> {
    json_encode_ent(e, e.id(), e.version(), e.fields().all)
}

/// Encodes only the fields of `e` with unsaved changes.
pub fn json_encode_unsaved(e: &dyn Ent) -> EntResult<Vec<u8>> {
    json_encode_ent(e, e.id(), e.version(), e.base().dirty())
}

/// Populates `e` from JSON, including its id and version.
pub fn json_decode(e: &mut dyn Ent, data: &[u8]) -> EntResult<()> {
    let (id, version) = json_decode_ent(e, data)?;
    e.base_mut().set_identity(id, version);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EntError;
    use crate::test_ent::{Sample, F_EMAIL, F_KIND};

    #[test]
    fn json_encode_layout() {
        let mut e = Sample::new("bob", "bob@x.com", 3);
        e.tags = vec!["a".into()];
        e.base.set_identity(7, 2);
        let out = String::from_utf8(json_encode(&e).unwrap()).unwrap();
        assert_eq!(
            out,
            r#"{"_ver":2,"_id":7,"name":"bob","email":"bob@x.com","kind":3,"w":0,"h":0,"tags":["a"]}"#
        );
    }

    #[test]
    fn json_encode_unsaved_only_dirty() {
        let mut e = Sample::new("bob", "bob@x.com", 3);
        e.set_kind(4);
        let out = String::from_utf8(json_encode_unsaved(&e).unwrap()).unwrap();
        assert_eq!(out, r#"{"_ver":0,"_id":0,"kind":4}"#);
    }

    #[test]
    fn json_decode_roundtrip() {
        let mut e = Sample::new("bob", "bob@x.com", -3);
        e.w = 640;
        e.h = 480;
        e.tags = vec!["x".into(), "y".into()];
        e.base.set_identity(12, 5);
        let data = json_encode(&e).unwrap();

        let mut back = Sample::default();
        json_decode(&mut back, &data).unwrap();
        assert_eq!(back.id(), 12);
        assert_eq!(back.version(), 5);
        assert_eq!(back.name, "bob");
        assert_eq!(back.kind, -3);
        assert_eq!((back.w, back.h), (640, 480));
        assert_eq!(back.tags, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn json_decode_partial_reads_selected_fields() {
        let e = Sample::new("bob", "bob@x.com", 9);
        let data = json_encode_ent(&e, 1, 4, e.fields().all).unwrap();
        let mut part = Sample::default();
        let version =
            json_decode_ent_partial(&mut part, &data, FieldSet::of(&[F_EMAIL, F_KIND])).unwrap();
        assert_eq!(version, 4);
        assert_eq!(part.email, "bob@x.com");
        assert_eq!(part.kind, 9);
        assert!(part.name.is_empty());
    }

    #[test]
    fn json_decode_reports_errors() {
        let mut e = Sample::default();
        let err = json_decode(&mut e, br#"{"_ver":1,"kind":"nine"}"#).unwrap_err();
        assert!(matches!(err, EntError::Encoding(_)));
        assert!(json_decode(&mut e, b"not json").is_err());
    }

    #[test]
    fn json_null_payload_is_empty() {
        let mut e = Sample::default();
        assert_eq!(json_decode_ent(&mut e, b"null").unwrap(), (0, 0));
    }
}
