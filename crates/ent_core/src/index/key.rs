//! Canonical index key encoding.
//!
//! A single-field key is the raw value: numbers big-endian at their declared
//! width, strings and blobs as their bytes, booleans as one byte, floats in
//! JavaScript number text. Same-width unsigned keys therefore sort
//! numerically. Signed values are written as their two's-complement bits,
//! so negative numbers sort after positive ones.
//!
//! A multi-field key turns every value into a text token (base-36 integers,
//! JavaScript float text, `0`/`1` booleans, raw strings), sorts the
//! `(field name, token)` pairs by name and joins everything with `0xFF`:
//! `name1 FF value1 FF name2 FF value2`. Sorting makes the key independent
//! of the order fields were written in.
//!
//! Lists and dicts can not be indexed, and neither can blobs inside
//! multi-field keys.

use ent_codec::number::{format_base36, format_float};
use ent_codec::{Buffer, CodecError, Encoder};

use crate::ent::Ent;
use crate::error::EntResult;
use crate::fieldset::FieldSet;

/// Separator between names and values in multi-field keys.
pub const KEY_SEPARATOR: u8 = 0xFF;

/// An [`Encoder`] producing index keys.
#[derive(Debug, Default)]
pub struct IndexKeyEncoder {
    buf: Buffer,
    err: Option<CodecError>,
    nest: usize,
    nfields: usize,
    keys: Vec<String>,
    values: Vec<String>,
}

impl IndexKeyEncoder {
    /// Creates an encoder for single-field keys.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nfields: 1,
            ..Self::default()
        }
    }

    /// Prepares the encoder for a key built from `nfields` values.
    pub fn reset(&mut self, nfields: usize) {
        self.nfields = nfields;
        self.buf.reset();
        self.err = None;
        self.nest = 0;
        self.keys.clear();
        self.values.clear();
    }

    /// Builds the key of `e` from the fields in `fields`.
    pub fn encode_key(&mut self, e: &dyn Ent, fields: FieldSet) -> Result<Vec<u8>, CodecError> {
        self.reset(fields.len());
        e.encode(self, fields);
        self.finish()
    }

    /// Completes the key written since the last reset.
    pub fn finish(&mut self) -> Result<Vec<u8>, CodecError> {
        self.end_ent();
        match &self.err {
            Some(err) => Err(err.clone()),
            None => Ok(self.buf.as_bytes().to_vec()),
        }
    }

    fn set_err(&mut self, err: CodecError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    fn direct(&self) -> bool {
        self.nfields == 1 && self.nest == 0
    }

    fn flush(&mut self) {
        match self.values.len() {
            0 => {}
            1 => self.buf.write_str(&self.values[0]),
            _ => {
                if self.keys.len() != self.values.len() {
                    self.set_err(CodecError::UnbalancedKeyValues {
                        keys: self.keys.len(),
                        values: self.values.len(),
                    });
                    return;
                }
                let mut pairs: Vec<(&String, &String)> =
                    self.keys.iter().zip(self.values.iter()).collect();
                pairs.sort_by(|a, b| a.0.cmp(b.0));
                let mut out = Buffer::with_capacity(self.values.iter().map(|v| v.len() + 8).sum());
                for (i, (k, v)) in pairs.into_iter().enumerate() {
                    if i > 0 {
                        out.write_byte(KEY_SEPARATOR);
                    }
                    out.write_str(k);
                    out.write_byte(KEY_SEPARATOR);
                    out.write_str(v);
                }
                self.buf.write(out.as_bytes());
            }
        }
    }
}

impl Encoder for IndexKeyEncoder {
    fn begin_ent(&mut self, _version: u64) {}

    fn end_ent(&mut self) {
        if self.nfields > 1 && self.err.is_none() {
            self.flush();
            self.values.clear();
            self.keys.clear();
        }
    }

    fn key(&mut self, name: &str) {
        if self.nest == 0 && self.nfields > 1 {
            self.keys.push(name.to_string());
        }
    }

    fn str(&mut self, v: &str) {
        // &str is UTF-8, which never contains the separator byte.
        if self.direct() {
            self.buf.write_str(v);
        } else {
            self.values.push(v.to_string());
        }
    }

    fn blob(&mut self, v: &[u8]) {
        if self.direct() {
            self.buf.write(v);
        } else {
            self.set_err(CodecError::Unindexable {
                kind: "nested blobs",
            });
        }
    }

    fn int(&mut self, v: i64, bitsize: u32) {
        self.uint(v as u64, bitsize);
    }

    fn uint(&mut self, v: u64, bitsize: u32) {
        if !self.direct() {
            self.values.push(format_base36(v));
            return;
        }
        match bitsize {
            8 => self.buf.write_byte(v as u8),
            16 => {
                let at = self.buf.grow(2);
                self.buf[at..].copy_from_slice(&(v as u16).to_be_bytes());
            }
            32 => {
                let at = self.buf.grow(4);
                self.buf[at..].copy_from_slice(&(v as u32).to_be_bytes());
            }
            _ => {
                let at = self.buf.grow(8);
                self.buf[at..].copy_from_slice(&v.to_be_bytes());
            }
        }
    }

    fn float(&mut self, v: f64, bitsize: u32) {
        match format_float(v, bitsize) {
            Ok(text) if self.direct() => self.buf.write_str(&text),
            Ok(text) => self.values.push(text),
            Err(err) => self.set_err(err),
        }
    }

    fn bool(&mut self, v: bool) {
        if self.direct() {
            self.buf.write_byte(u8::from(v));
        } else {
            self.values.push(if v { "1" } else { "0" }.to_string());
        }
    }

    fn begin_list(&mut self, _len: usize) {
        self.set_err(CodecError::Unindexable { kind: "lists" });
        self.nest += 1;
    }

    fn end_list(&mut self) {
        self.nest = self.nest.saturating_sub(1);
    }

    fn begin_dict(&mut self, _len: usize) {
        self.set_err(CodecError::Unindexable { kind: "dicts" });
        self.nest += 1;
    }

    fn end_dict(&mut self) {
        self.nest = self.nest.saturating_sub(1);
    }

    fn err(&self) -> Option<&CodecError> {
        self.err.as_ref()
    }
}

/// Builds a key from `nfields` values written by `write`.
///
/// Used by lookup helpers, which write the key values directly instead of
/// encoding an entity. Multi-field keys must name each value with
/// [`Encoder::key`] using the field's storage name.
pub fn encode_index_key(nfields: usize, write: impl FnOnce(&mut dyn Encoder)) -> EntResult<Vec<u8>> {
    let mut c = IndexKeyEncoder::new();
    c.reset(nfields);
    write(&mut c);
    Ok(c.finish()?)
}
