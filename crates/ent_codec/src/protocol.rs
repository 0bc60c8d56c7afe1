//! The encoder/decoder capability traits.
//!
//! Per-type glue code drives these generically: encoding writes
//! `key(name)` followed by a scalar, list or dict for every enabled field;
//! decoding loops on [`Decoder::key`] until it returns the empty string,
//! dispatching on the name and calling [`Decoder::discard`] for anything it
//! does not recognize.
//!
//! # Sticky errors
//!
//! Neither trait returns `Result` from its per-value methods. The first error
//! an encoder or decoder hits is remembered, every later call becomes a no-op
//! (decoders return zero values), and the caller checks [`Encoder::err`] or
//! [`Decoder::err`] once after the whole sequence. A decoder in the error
//! state reports no further keys and no further list elements, so decode
//! loops always terminate.

use crate::error::CodecError;

/// Writes a stream of entity fields in some wire format.
pub trait Encoder {
    /// Starts an entity record stamped with `version`.
    fn begin_ent(&mut self, version: u64);
    /// Finishes the current entity record.
    fn end_ent(&mut self);
    /// Names the value that follows.
    fn key(&mut self, name: &str);
    /// Writes a string value.
    fn str(&mut self, v: &str);
    /// Writes a byte-string value.
    fn blob(&mut self, v: &[u8]);
    /// Writes a signed integer declared with `bitsize` bits.
    fn int(&mut self, v: i64, bitsize: u32);
    /// Writes an unsigned integer declared with `bitsize` bits.
    fn uint(&mut self, v: u64, bitsize: u32);
    /// Writes a float declared with `bitsize` (32 or 64) bits.
    fn float(&mut self, v: f64, bitsize: u32);
    /// Writes a boolean.
    fn bool(&mut self, v: bool);
    /// Starts a list of `len` elements.
    fn begin_list(&mut self, len: usize);
    /// Finishes the current list.
    fn end_list(&mut self);
    /// Starts a dict of `len` key/value pairs.
    fn begin_dict(&mut self, len: usize);
    /// Finishes the current dict.
    fn end_dict(&mut self);
    /// Returns the first error encountered, if any.
    fn err(&self) -> Option<&CodecError>;
}

/// Reads a stream of entity fields written by the matching [`Encoder`].
pub trait Decoder {
    /// Returns the next key in the current dict, or `""` when there are no
    /// more entries.
    fn key(&mut self) -> String;
    /// Reads a string value.
    fn str(&mut self) -> String;
    /// Reads a byte-string value.
    fn blob(&mut self) -> Vec<u8>;
    /// Reads a signed integer that must fit `bitsize` bits.
    fn int(&mut self, bitsize: u32) -> i64;
    /// Reads an unsigned integer that must fit `bitsize` bits.
    fn uint(&mut self, bitsize: u32) -> u64;
    /// Reads a float at `bitsize` precision.
    fn float(&mut self, bitsize: u32) -> f64;
    /// Reads a boolean.
    fn bool(&mut self) -> bool;
    /// Opens a list. Returns its length, `-1` when the length is not known
    /// up front (use [`Decoder::more`]), or `0` for a null/absent list.
    fn list_header(&mut self) -> i64;
    /// Opens a dict, with the same return convention as `list_header`.
    fn dict_header(&mut self) -> i64;
    /// After an unknown-length list header: returns true while another
    /// element follows.
    fn more(&mut self) -> bool;
    /// Skips the current value including any nested structure.
    fn discard(&mut self);
    /// Returns the first error encountered, if any.
    fn err(&self) -> Option<&CodecError>;
}

/// Writes `items` as a list, encoding each element with `each`.
pub fn encode_list<T>(c: &mut dyn Encoder, items: &[T], mut each: impl FnMut(&mut dyn Encoder, &T)) {
    c.begin_list(items.len());
    for item in items {
        each(c, item);
    }
    c.end_list();
}

/// Reads a list written by [`encode_list`], decoding each element with `each`.
pub fn decode_list<T>(c: &mut dyn Decoder, mut each: impl FnMut(&mut dyn Decoder) -> T) -> Vec<T> {
    let n = c.list_header();
    let mut out = Vec::with_capacity(n.max(0) as usize);
    if n >= 0 {
        for _ in 0..n {
            out.push(each(c));
        }
    } else {
        while c.more() {
            out.push(each(c));
        }
    }
    out
}

/// Writes string-keyed `entries` as a dict, encoding each value with `each`.
pub fn encode_dict<'a, V: 'a>(
    c: &mut dyn Encoder,
    entries: impl ExactSizeIterator<Item = (&'a String, &'a V)>,
    mut each: impl FnMut(&mut dyn Encoder, &V),
) {
    c.begin_dict(entries.len());
    for (k, v) in entries {
        c.key(k);
        each(c, v);
    }
    c.end_dict();
}

/// Reads a dict written by [`encode_dict`] into `(key, value)` pairs.
pub fn decode_dict<V>(
    c: &mut dyn Decoder,
    mut each: impl FnMut(&mut dyn Decoder) -> V,
) -> Vec<(String, V)> {
    let n = c.dict_header();
    let mut out = Vec::with_capacity(n.max(0) as usize);
    if n == 0 {
        return out;
    }
    loop {
        let k = c.key();
        if k.is_empty() {
            break;
        }
        let v = each(c);
        out.push((k, v));
    }
    out
}
