//! JSON payload encoder.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::buffer::Buffer;
use crate::error::CodecError;
use crate::number::format_float;
use crate::protocol::Encoder;
use crate::{FIELD_NAME_ID, FIELD_NAME_VERSION};

/// Container nesting state.
#[derive(Debug, Clone, Copy)]
struct Frame {
    has_items: bool,
}

/// Encodes entities as JSON objects.
///
/// Layout: `{"_ver":V,"_id":I,"field":value,...}`. Blobs are written as
/// standard base64 strings and floats in JavaScript number form.
///
/// [`JsonEncoder::pretty`] produces the indented, bare-key form used for
/// human-readable entity dumps.
#[derive(Debug, Default)]
pub struct JsonEncoder {
    buf: Buffer,
    err: Option<CodecError>,
    frames: Vec<Frame>,
    after_key: bool,
    indent: Option<&'static str>,
    bare_keys: bool,
}

impl JsonEncoder {
    /// Creates a compact encoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an encoder that indents nested values by two spaces and
    /// writes object keys without quotes.
    #[must_use]
    pub fn pretty() -> Self {
        Self {
            indent: Some("  "),
            bare_keys: true,
            ..Self::default()
        }
    }

    /// Returns the bytes written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.buf.as_bytes()
    }

    /// Consumes the encoder, returning its output or the first error.
    pub fn finish(self) -> Result<Vec<u8>, CodecError> {
        match self.err {
            Some(err) => Err(err),
            None => Ok(self.buf.into_vec()),
        }
    }

    fn set_err(&mut self, err: CodecError) {
        if self.err.is_none() {
            self.err = Some(err);
        }
    }

    fn newline(&mut self) {
        if let Some(indent) = self.indent {
            self.buf.write_byte(b'\n');
            for _ in 0..self.frames.len() {
                self.buf.write_str(indent);
            }
        }
    }

    /// Writes the separator owed before a value or key.
    fn begin_item(&mut self) {
        if self.after_key {
            self.after_key = false;
            return;
        }
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        let first = !frame.has_items;
        frame.has_items = true;
        if !first {
            self.buf.write_byte(b',');
        }
        self.newline();
    }

    fn open(&mut self, bracket: u8) {
        self.begin_item();
        self.buf.write_byte(bracket);
        self.frames.push(Frame { has_items: false });
    }

    fn close(&mut self, bracket: u8) {
        if let Some(frame) = self.frames.pop() {
            if frame.has_items {
                self.newline();
            }
        }
        self.buf.write_byte(bracket);
    }

    fn write_json_str(&mut self, v: &str) {
        if let Err(err) = serde_json::to_writer(&mut self.buf, v) {
            self.set_err(err.into());
        }
    }

    fn scalar(&mut self, text: &str) {
        if self.err.is_some() {
            return;
        }
        self.begin_item();
        self.buf.write_str(text);
    }
}

impl Encoder for JsonEncoder {
    fn begin_ent(&mut self, version: u64) {
        self.open(b'{');
        self.key(FIELD_NAME_VERSION);
        self.uint(version, 64);
    }

    fn end_ent(&mut self) {
        self.close(b'}');
    }

    fn key(&mut self, name: &str) {
        if self.err.is_some() {
            return;
        }
        self.begin_item();
        if self.bare_keys {
            self.buf.write_str(name);
        } else {
            self.write_json_str(name);
        }
        self.buf.write_byte(b':');
        if self.indent.is_some() {
            self.buf.write_byte(b' ');
        }
        self.after_key = true;
    }

    fn str(&mut self, v: &str) {
        if self.err.is_some() {
            return;
        }
        self.begin_item();
        self.write_json_str(v);
    }

    fn blob(&mut self, v: &[u8]) {
        if self.err.is_some() {
            return;
        }
        self.begin_item();
        let encoded = BASE64.encode(v);
        self.buf.write_byte(b'"');
        self.buf.write_str(&encoded);
        self.buf.write_byte(b'"');
    }

    fn int(&mut self, v: i64, _bitsize: u32) {
        self.scalar(&v.to_string());
    }

    fn uint(&mut self, v: u64, _bitsize: u32) {
        self.scalar(&v.to_string());
    }

    fn float(&mut self, v: f64, bitsize: u32) {
        match format_float(v, bitsize) {
            Ok(text) => self.scalar(&text),
            Err(err) => self.set_err(err),
        }
    }

    fn bool(&mut self, v: bool) {
        self.scalar(if v { "true" } else { "false" });
    }

    fn begin_list(&mut self, _len: usize) {
        self.open(b'[');
    }

    fn end_list(&mut self) {
        self.close(b']');
    }

    fn begin_dict(&mut self, _len: usize) {
        self.open(b'{');
    }

    fn end_dict(&mut self) {
        self.close(b'}');
    }

    fn err(&self) -> Option<&CodecError> {
        self.err.as_ref()
    }
}

/// Encodes one entity payload: `_ver`, then `_id`, then whatever
/// `fields` writes.
pub fn encode_json_ent(
    id: u64,
    version: u64,
    fields: impl FnOnce(&mut dyn Encoder),
) -> Result<Vec<u8>, CodecError> {
    let mut c = JsonEncoder::new();
    c.begin_ent(version);
    c.key(FIELD_NAME_ID);
    c.uint(id, 64);
    fields(&mut c);
    c.end_ent();
    c.finish()
}
